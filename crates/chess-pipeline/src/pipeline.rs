//! Pipeline orchestration.
//!
//! ```text
//! scanner --(raw batches, MPMC)--> N transformers --(doc batches, MPSC)--> writer
//! ```
//!
//! Both channels are bounded, so a slow indexer throttles the whole run.
//! Shutdown is ordered: the scanner closes the raw channel, the worker pool
//! drains it and exits, and the writer sees the end of the document stream
//! only after every worker has dropped its sender. Once the pool has exited
//! the writer is also told that no further input is coming.

use std::path::Path;
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use chess_bulk::BulkIndexer;
use chess_types::{default_parallelism, GameDocument};

use crate::error::IngestError;
use crate::record::RawRecord;
use crate::scanner::RecordScanner;
use crate::transformer::RecordTransformer;
use crate::writer::{BulkWriter, WriterStats};

/// Records per batch when nothing else is configured.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Tuning knobs for a run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Records per scanner batch
    pub batch_size: usize,
    /// Transformer workers
    pub workers: usize,
    /// Batches buffered between stages
    pub channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            workers: default_parallelism(),
            channel_capacity: 1,
        }
    }
}

impl PipelineConfig {
    /// Create a new config with the given batch size (at least 1).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Create a new config with the given transformer pool size (at least 1).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Create a new config with the given per-stage buffer (at least 1).
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}

/// Totals for a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub records_scanned: u64,
    pub batches_dispatched: u64,
    pub documents_transformed: u64,
    pub writer: WriterStats,
}

/// Runs scanner, transformer pool, and writer for one archive.
pub struct IngestPipeline {
    config: PipelineConfig,
    transformer: Arc<RecordTransformer>,
}

impl IngestPipeline {
    /// Create a pipeline that shares `transformer` across its workers.
    pub fn new(config: PipelineConfig, transformer: RecordTransformer) -> Self {
        Self {
            config,
            transformer: Arc::new(transformer),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Ingest the archive at `path`.
    pub async fn run_file(
        &self,
        path: impl AsRef<Path>,
        indexer: Box<dyn BulkIndexer>,
    ) -> Result<IngestStats, IngestError> {
        let path = path.as_ref();
        let file = File::open(path).await?;
        info!(path = %path.display(), "Opened archive");
        self.run(BufReader::new(file), indexer).await
    }

    /// Ingest everything `reader` yields, then close `indexer`.
    ///
    /// Returns once the indexer has been closed. When a stage fails, the
    /// error from the furthest-downstream failing stage is returned, since
    /// upstream stages only fail because it stopped receiving.
    pub async fn run<R>(
        &self,
        reader: R,
        indexer: Box<dyn BulkIndexer>,
    ) -> Result<IngestStats, IngestError>
    where
        R: AsyncBufRead + Unpin,
    {
        let capacity = self.config.channel_capacity.max(1);
        let (raw_tx, raw_rx) = async_channel::bounded::<Vec<RawRecord>>(capacity);
        let (doc_tx, doc_rx) = mpsc::channel::<Vec<GameDocument>>(capacity);
        let input_done = CancellationToken::new();

        let mut workers = JoinSet::new();
        for worker_id in 0..self.config.workers.max(1) {
            workers.spawn(transform_worker(
                worker_id,
                self.transformer.clone(),
                raw_rx.clone(),
                doc_tx.clone(),
            ));
        }
        drop(raw_rx);
        drop(doc_tx);

        let writer = tokio::spawn(BulkWriter::new(indexer, input_done.clone()).run(doc_rx));

        info!(
            workers = self.config.workers,
            batch_size = self.config.batch_size,
            "Starting ingestion"
        );

        let mut scanner = RecordScanner::new(reader, self.config.batch_size);
        let (batches_dispatched, scan_completed) =
            match dispatch_batches(&mut scanner, &raw_tx).await {
                Ok(dispatched) => (dispatched, true),
                // A downstream stage stopped; its own error is reported below
                Err(IngestError::ChannelClosed(_)) => (0, false),
                Err(e) => {
                    workers.abort_all();
                    while workers.join_next().await.is_some() {}
                    writer.abort();
                    let _ = writer.await;
                    return Err(e);
                }
            };
        drop(raw_tx);

        let mut documents_transformed = 0u64;
        let mut worker_error = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(count)) => documents_transformed += count,
                Ok(Err(e)) => {
                    worker_error.get_or_insert(e);
                }
                Err(e) => {
                    worker_error.get_or_insert(IngestError::Task(e.to_string()));
                }
            }
        }

        // Every raw batch has been transformed and queued for the writer
        if scan_completed && worker_error.is_none() {
            input_done.cancel();
        }

        let writer_stats = writer
            .await
            .map_err(|e| IngestError::Task(e.to_string()))??;

        if let Some(e) = worker_error {
            return Err(e);
        }
        if !scan_completed {
            return Err(IngestError::ChannelClosed(
                "transformer pool stopped early".to_string(),
            ));
        }

        let stats = IngestStats {
            records_scanned: scanner.records_scanned(),
            batches_dispatched,
            documents_transformed,
            writer: writer_stats,
        };
        info!(
            records = stats.records_scanned,
            batches = stats.batches_dispatched,
            submitted = stats.writer.submitted,
            submit_errors = stats.writer.submit_errors,
            "Ingestion complete"
        );
        Ok(stats)
    }
}

async fn dispatch_batches<R>(
    scanner: &mut RecordScanner<R>,
    tx: &async_channel::Sender<Vec<RawRecord>>,
) -> Result<u64, IngestError>
where
    R: AsyncBufRead + Unpin,
{
    let mut dispatched = 0u64;
    while let Some(batch) = scanner.next_batch().await? {
        let count = batch.len();
        tx.send(batch)
            .await
            .map_err(|_| IngestError::ChannelClosed("transformer pool".to_string()))?;
        dispatched += 1;
        info!(
            count,
            total = scanner.records_scanned(),
            "Processing more games"
        );
    }
    info!(
        records = scanner.records_scanned(),
        lines = scanner.line_number(),
        "Completed scanning archive"
    );
    Ok(dispatched)
}

async fn transform_worker(
    worker_id: usize,
    transformer: Arc<RecordTransformer>,
    rx: async_channel::Receiver<Vec<RawRecord>>,
    tx: mpsc::Sender<Vec<GameDocument>>,
) -> Result<u64, IngestError> {
    let mut transformed = 0u64;

    while let Ok(records) = rx.recv().await {
        let transformer = transformer.clone();
        let docs = tokio::task::spawn_blocking(move || transformer.transform_batch(records))
            .await
            .map_err(|e| IngestError::Task(e.to_string()))?;

        let count = docs.len() as u64;
        info!(worker_id, count, "Sending docs to bulk indexer");
        tx.send(docs)
            .await
            .map_err(|_| IngestError::ChannelClosed("bulk writer".to_string()))?;
        transformed += count;
    }

    debug!(worker_id, transformed, "Transformer worker finished");
    Ok(transformed)
}
