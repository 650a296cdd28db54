//! In-memory bulk indexer for tests and local runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use crate::error::BulkError;
use crate::{BulkIndexer, BulkItem, BulkStats};

/// Records every submitted item instead of sending it anywhere.
///
/// Clones share the same recording, so a test can keep one handle while the
/// pipeline owns another.
#[derive(Debug, Clone, Default)]
pub struct MockBulkIndexer {
    items: Arc<Mutex<Vec<BulkItem>>>,
    closed: Arc<AtomicBool>,
    fail_submit: bool,
    fail_close: bool,
}

impl MockBulkIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// An indexer that rejects every submission.
    pub fn failing() -> Self {
        Self {
            fail_submit: true,
            ..Self::default()
        }
    }

    /// An indexer whose close reports a flush failure.
    pub fn failing_close() -> Self {
        Self {
            fail_close: true,
            ..Self::default()
        }
    }

    /// Snapshot of the recorded items.
    pub fn items(&self) -> Vec<BulkItem> {
        self.items.lock().map(|items| items.clone()).unwrap_or_default()
    }

    /// Number of recorded items.
    pub fn submitted(&self) -> usize {
        self.items.lock().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BulkIndexer for MockBulkIndexer {
    async fn submit(&mut self, item: BulkItem) -> Result<(), BulkError> {
        if self.is_closed() {
            return Err(BulkError::Closed);
        }
        if self.fail_submit {
            return Err(BulkError::Item {
                status: 400,
                reason: "mock rejection".to_string(),
            });
        }

        let mut items = self
            .items
            .lock()
            .map_err(|e| BulkError::Config(format!("mock lock poisoned: {}", e)))?;
        items.push(item);
        Ok(())
    }

    async fn close(&mut self) -> Result<BulkStats, BulkError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(BulkError::Closed);
        }
        let count = self.submitted() as u64;
        if self.fail_close {
            return Err(BulkError::Flush {
                failed_requests: 1,
                stats: BulkStats {
                    added: count,
                    failed: count,
                    requests: 1,
                    failed_requests: 1,
                    ..Default::default()
                },
            });
        }

        debug!(count, "Mock bulk indexer closed");
        Ok(BulkStats {
            added: count,
            flushed: count,
            requests: u64::from(count > 0),
            ..Default::default()
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}
