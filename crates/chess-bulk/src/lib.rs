//! Bulk submission of serialized documents to a search backend.
//!
//! ## Key Components
//!
//! - [`BulkIndexer`]: queue items and flush them in size-bounded requests
//! - [`ElasticBulkIndexer`]: Elasticsearch `_bulk` implementation
//! - [`MockBulkIndexer`]: in-memory recorder for tests
//!
//! The indexer owns its buffer exclusively; callers hand over each item by
//! value and call [`BulkIndexer::close`] once to flush whatever remains.

pub mod elastic;
pub mod error;
pub mod mock;

pub use elastic::{decode_cloud_id, ElasticBulkIndexer, ElasticConfig, ErrorCallback};
pub use error::BulkError;
pub use mock::MockBulkIndexer;

use async_trait::async_trait;

use chess_types::OpType;

/// One queued write operation.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItem {
    /// Target index
    pub index: String,
    /// Bulk action
    pub op_type: OpType,
    /// External document id, if any
    pub id: Option<String>,
    /// Serialized document body (single-line JSON)
    pub body: Vec<u8>,
}

impl BulkItem {
    pub fn new(index: impl Into<String>, op_type: OpType, body: Vec<u8>) -> Self {
        Self {
            index: index.into(),
            op_type,
            id: None,
            body,
        }
    }

    /// Attach an external document id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Counters reported by an indexer when it is closed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BulkStats {
    /// Items accepted by `submit`
    pub added: u64,
    /// Items the backend stored
    pub flushed: u64,
    /// Items rejected by the backend or lost with a failed request
    pub failed: u64,
    /// Items rejected because the id already exists (`create` conflicts)
    pub duplicates: u64,
    /// Bulk requests sent
    pub requests: u64,
    /// Bulk requests that failed after all retries
    pub failed_requests: u64,
    /// Payload bytes sent in successful requests
    pub flushed_bytes: u64,
}

impl BulkStats {
    /// Merge another stats into this one
    pub fn merge(&mut self, other: &BulkStats) {
        self.added += other.added;
        self.flushed += other.flushed;
        self.failed += other.failed;
        self.duplicates += other.duplicates;
        self.requests += other.requests;
        self.failed_requests += other.failed_requests;
        self.flushed_bytes += other.flushed_bytes;
    }
}

/// Write-batching client for a search backend.
///
/// `submit` only queues; physical writes happen when the implementation's
/// flush threshold is crossed or on `close`.
#[async_trait]
pub trait BulkIndexer: Send {
    /// Queue an item. Errors are per-item and do not poison the indexer.
    async fn submit(&mut self, item: BulkItem) -> Result<(), BulkError>;

    /// Flush remaining items and release resources. Call once.
    async fn close(&mut self) -> Result<BulkStats, BulkError>;

    /// Name of this indexer for logging.
    fn name(&self) -> &str;
}
