//! Elasticsearch `_bulk` client.
//!
//! Items are appended to an NDJSON buffer (one action line plus one body line
//! each). Once the buffer crosses `flush_bytes` it is handed to a fixed pool of
//! flush workers over a bounded channel, so a saturated pool blocks `submit`.
//! Whole requests are retried with exponential backoff on transport errors,
//! 429 and 5xx; per-item rejections are reported and counted, never retried.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use chess_types::{default_parallelism, OpType};

use crate::error::BulkError;
use crate::{BulkIndexer, BulkItem, BulkStats};

/// Flush threshold used when none is configured.
pub const DEFAULT_FLUSH_BYTES: usize = 5_000_000;

/// Callback invoked for every request or item failure.
pub type ErrorCallback = Arc<dyn Fn(&BulkError) + Send + Sync>;

/// Configuration for [`ElasticBulkIndexer`].
pub struct ElasticConfig {
    /// Cluster base URL (e.g. "http://localhost:9200")
    pub endpoint: String,

    /// Index used for items that do not name one
    pub index: String,

    pub username: String,

    /// Basic-auth password; requests are unauthenticated when absent
    pub password: Option<SecretString>,

    /// Concurrent bulk requests
    pub num_workers: usize,

    /// Buffered bytes that trigger a bulk request
    pub flush_bytes: usize,

    /// Per-request timeout
    pub timeout: Duration,

    /// Retries per request after the first attempt; 0 sends each request once
    pub max_retries: u32,

    /// First retry delay; grows exponentially
    pub initial_backoff: Duration,

    /// Failure hook; failures are logged at warn level when unset
    pub on_error: Option<ErrorCallback>,
}

impl ElasticConfig {
    /// Create a config for a cluster URL.
    pub fn new(endpoint: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            index: index.into(),
            username: "elastic".to_string(),
            password: None,
            num_workers: default_parallelism(),
            flush_bytes: DEFAULT_FLUSH_BYTES,
            timeout: Duration::from_secs(60),
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            on_error: None,
        }
    }

    /// Create a config for an Elastic Cloud deployment.
    pub fn from_cloud_id(cloud_id: &str, index: impl Into<String>) -> Result<Self, BulkError> {
        Ok(Self::new(decode_cloud_id(cloud_id)?, index))
    }

    /// Authenticate requests with basic auth.
    pub fn with_credentials(mut self, username: impl Into<String>, password: SecretString) -> Self {
        self.username = username.into();
        self.password = Some(password);
        self
    }

    /// Set the number of concurrent flush workers.
    pub fn with_num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    /// Set the buffered size that triggers a bulk request.
    pub fn with_flush_bytes(mut self, flush_bytes: usize) -> Self {
        self.flush_bytes = flush_bytes;
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retries allowed after a request's first attempt.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the delay before the first retry.
    pub fn with_initial_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    /// Install a failure hook.
    pub fn with_on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&BulkError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), BulkError> {
        if self.endpoint.trim().is_empty() {
            return Err(BulkError::Config("endpoint must not be empty".to_string()));
        }
        if self.num_workers == 0 {
            return Err(BulkError::Config("num_workers must be > 0".to_string()));
        }
        if self.flush_bytes == 0 {
            return Err(BulkError::Config("flush_bytes must be > 0".to_string()));
        }
        Ok(())
    }

    /// Full `_bulk` endpoint URL.
    pub fn bulk_url(&self) -> String {
        format!("{}/_bulk", self.endpoint.trim_end_matches('/'))
    }
}

impl std::fmt::Debug for ElasticConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticConfig")
            .field("endpoint", &self.endpoint)
            .field("index", &self.index)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("num_workers", &self.num_workers)
            .field("flush_bytes", &self.flush_bytes)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

/// Resolve an Elastic Cloud id (`name:base64(host$es_id$kibana_id)`) to the
/// Elasticsearch endpoint URL.
pub fn decode_cloud_id(cloud_id: &str) -> Result<String, BulkError> {
    let encoded = cloud_id
        .rsplit_once(':')
        .map(|(_, encoded)| encoded)
        .unwrap_or(cloud_id)
        .trim();

    let decoded = STANDARD
        .decode(encoded)
        .map_err(|e| BulkError::Config(format!("invalid cloud id: {}", e)))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|e| BulkError::Config(format!("invalid cloud id: {}", e)))?;

    let mut parts = decoded.split('$');
    let host = parts
        .next()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| BulkError::Config("cloud id has no host".to_string()))?;
    let es_id = parts
        .next()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| BulkError::Config("cloud id has no elasticsearch id".to_string()))?;

    Ok(format!("https://{}.{}", es_id, host))
}

/// Serialize the metadata line preceding a document body.
fn action_line(op_type: OpType, index: &str, id: Option<&str>) -> Result<Vec<u8>, BulkError> {
    let mut meta = Map::new();
    meta.insert("_index".to_string(), Value::String(index.to_string()));
    if let Some(id) = id {
        meta.insert("_id".to_string(), Value::String(id.to_string()));
    }
    let mut action = Map::new();
    action.insert(op_type.as_str().to_string(), Value::Object(meta));
    Ok(serde_json::to_vec(&Value::Object(action))?)
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkItemResult>>,
}

#[derive(Debug, Deserialize)]
struct BulkItemResult {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

impl BulkItemResult {
    fn reason(&self) -> String {
        match &self.error {
            Some(Value::Object(err)) => err
                .get("reason")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| Value::Object(err.clone()).to_string()),
            Some(other) => other.to_string(),
            None => "unknown".to_string(),
        }
    }
}

/// A filled buffer waiting for a flush worker.
struct PendingFlush {
    body: Vec<u8>,
    items: u64,
}

/// State shared read-only by the flush workers.
struct FlushContext {
    client: Client,
    bulk_url: String,
    username: String,
    password: Option<SecretString>,
    max_retries: u32,
    initial_backoff: Duration,
    on_error: Option<ErrorCallback>,
}

impl FlushContext {
    fn report(&self, err: &BulkError) {
        match &self.on_error {
            Some(callback) => callback(err),
            None => warn!(error = %err, "Bulk indexer error"),
        }
    }

    async fn send_once(&self, body: &[u8]) -> Result<BulkResponse, BulkError> {
        let mut request = self
            .client
            .post(&self.bulk_url)
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body.to_vec());
        if let Some(password) = &self.password {
            request = request.basic_auth(&self.username, Some(password.expose_secret()));
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BulkError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<BulkResponse>()
            .await
            .map_err(|e| BulkError::Parse(e.to_string()))
    }

    /// Send one bulk request, retrying transient failures.
    async fn send_with_retry(&self, body: &[u8]) -> Result<BulkResponse, BulkError> {
        let mut backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_backoff)
            .with_max_elapsed_time(Some(Duration::from_secs(120)))
            .build();

        let mut retries = 0;

        loop {
            debug!(attempt = retries + 1, bytes = body.len(), "Sending bulk request");

            match self.send_once(body).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if !e.is_retryable() || retries >= self.max_retries {
                        return Err(e);
                    }
                    retries += 1;

                    match backoff.next_backoff() {
                        Some(duration) => {
                            warn!(
                                error = %e,
                                retry_in_ms = duration.as_millis() as u64,
                                "Bulk request failed, retrying"
                            );
                            tokio::time::sleep(duration).await;
                        }
                        None => {
                            error!(error = %e, "Backoff exhausted");
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    fn record_response(&self, response: &BulkResponse, items: u64, stats: &mut BulkStats) {
        if response.items.is_empty() {
            if response.errors {
                stats.failed += items;
            } else {
                stats.flushed += items;
            }
            return;
        }

        for entry in &response.items {
            for result in entry.values() {
                match result.status {
                    200..=299 => stats.flushed += 1,
                    409 => {
                        stats.duplicates += 1;
                        debug!(id = ?result.id, "Document already indexed");
                    }
                    status => {
                        stats.failed += 1;
                        self.report(&BulkError::Item {
                            status,
                            reason: result.reason(),
                        });
                    }
                }
            }
        }
    }
}

async fn run_flush_worker(
    worker_id: usize,
    context: Arc<FlushContext>,
    rx: async_channel::Receiver<PendingFlush>,
) -> BulkStats {
    let mut stats = BulkStats::default();

    while let Ok(pending) = rx.recv().await {
        stats.requests += 1;
        match context.send_with_retry(&pending.body).await {
            Ok(response) => {
                stats.flushed_bytes += pending.body.len() as u64;
                context.record_response(&response, pending.items, &mut stats);
            }
            Err(e) => {
                stats.failed_requests += 1;
                stats.failed += pending.items;
                error!(worker_id, items = pending.items, error = %e, "Bulk request failed");
                context.report(&e);
            }
        }
    }

    debug!(worker_id, requests = stats.requests, "Bulk flush worker finished");
    stats
}

/// Elasticsearch implementation of [`BulkIndexer`].
pub struct ElasticBulkIndexer {
    index: String,
    flush_bytes: usize,
    buffer: Vec<u8>,
    buffered_items: u64,
    added: u64,
    flush_tx: Option<async_channel::Sender<PendingFlush>>,
    workers: Vec<JoinHandle<BulkStats>>,
}

impl ElasticBulkIndexer {
    /// Validate the config, build the HTTP client and start the flush workers.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(config: ElasticConfig) -> Result<Self, BulkError> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BulkError::Config(e.to_string()))?;
        let bulk_url = config.bulk_url();

        info!(
            endpoint = %config.endpoint,
            index = %config.index,
            workers = config.num_workers,
            flush_bytes = config.flush_bytes,
            "Opening Elasticsearch bulk indexer"
        );

        let ElasticConfig {
            index,
            username,
            password,
            num_workers,
            flush_bytes,
            max_retries,
            initial_backoff,
            on_error,
            ..
        } = config;

        let context = Arc::new(FlushContext {
            client,
            bulk_url,
            username,
            password,
            max_retries,
            initial_backoff,
            on_error,
        });

        let (flush_tx, flush_rx) = async_channel::bounded(num_workers);
        let workers = (0..num_workers)
            .map(|worker_id| {
                tokio::spawn(run_flush_worker(
                    worker_id,
                    context.clone(),
                    flush_rx.clone(),
                ))
            })
            .collect();

        Ok(Self {
            index,
            flush_bytes,
            buffer: Vec::with_capacity(flush_bytes),
            buffered_items: 0,
            added: 0,
            flush_tx: Some(flush_tx),
            workers,
        })
    }

    /// Bytes currently buffered.
    pub fn buffered_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Hand the current buffer to the flush pool.
    async fn dispatch(&mut self) -> Result<(), BulkError> {
        if self.buffered_items == 0 {
            return Ok(());
        }

        let tx = self.flush_tx.as_ref().ok_or(BulkError::Closed)?;
        let pending = PendingFlush {
            body: std::mem::replace(&mut self.buffer, Vec::with_capacity(self.flush_bytes)),
            items: std::mem::take(&mut self.buffered_items),
        };

        debug!(
            items = pending.items,
            bytes = pending.body.len(),
            "Dispatching bulk request"
        );
        tx.send(pending).await.map_err(|_| BulkError::Closed)
    }
}

#[async_trait]
impl BulkIndexer for ElasticBulkIndexer {
    async fn submit(&mut self, item: BulkItem) -> Result<(), BulkError> {
        if self.flush_tx.is_none() {
            return Err(BulkError::Closed);
        }
        if item.body.contains(&b'\n') {
            return Err(BulkError::Parse(
                "document body must be single-line JSON".to_string(),
            ));
        }

        let index = if item.index.is_empty() {
            self.index.as_str()
        } else {
            item.index.as_str()
        };
        let action = action_line(item.op_type, index, item.id.as_deref())?;

        self.buffer.extend_from_slice(&action);
        self.buffer.push(b'\n');
        self.buffer.extend_from_slice(&item.body);
        self.buffer.push(b'\n');
        self.buffered_items += 1;
        self.added += 1;

        if self.buffer.len() >= self.flush_bytes {
            self.dispatch().await?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<BulkStats, BulkError> {
        if self.flush_tx.is_none() {
            return Err(BulkError::Closed);
        }

        self.dispatch().await?;
        // Workers exit once the queue is drained and the sender is gone
        drop(self.flush_tx.take());

        let mut stats = BulkStats {
            added: self.added,
            ..Default::default()
        };
        for handle in self.workers.drain(..) {
            match handle.await {
                Ok(worker_stats) => stats.merge(&worker_stats),
                Err(e) => {
                    error!(error = %e, "Bulk flush worker aborted");
                    stats.failed_requests += 1;
                }
            }
        }

        info!(
            added = stats.added,
            flushed = stats.flushed,
            failed = stats.failed,
            duplicates = stats.duplicates,
            requests = stats.requests,
            "Closed Elasticsearch bulk indexer"
        );

        if stats.failed_requests > 0 {
            return Err(BulkError::Flush {
                failed_requests: stats.failed_requests as usize,
                stats,
            });
        }
        Ok(stats)
    }

    fn name(&self) -> &str {
        "elasticsearch"
    }
}

impl Drop for ElasticBulkIndexer {
    fn drop(&mut self) {
        if self.flush_tx.is_some() && self.buffered_items > 0 {
            warn!(
                items = self.buffered_items,
                "Bulk indexer dropped without close, buffered items discarded"
            );
        }
    }
}
