//! Single consumer that feeds documents into a bulk indexer.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use chess_bulk::{BulkError, BulkIndexer, BulkItem, BulkStats};
use chess_types::GameDocument;

use crate::error::IngestError;

/// Counters collected by the writer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Document batches received
    pub batches: u64,
    /// Documents received
    pub documents: u64,
    /// Documents accepted by the indexer
    pub submitted: u64,
    /// Documents the indexer refused at submit time
    pub submit_errors: u64,
    /// Final indexer counters, also kept when some requests failed; `None`
    /// only if the indexer could not report them
    pub indexer: Option<BulkStats>,
}

/// Owns the bulk indexer for the duration of a run.
///
/// Exactly one writer exists per run, so the indexer is never shared.
pub struct BulkWriter {
    indexer: Box<dyn BulkIndexer>,
    input_done: CancellationToken,
}

impl BulkWriter {
    /// `input_done` is cancelled by the orchestrator once every raw batch
    /// has been transformed. It only switches the writer into a logged drain
    /// phase; the writer stops when all document senders are dropped,
    /// whether or not the token was ever cancelled.
    pub fn new(indexer: Box<dyn BulkIndexer>, input_done: CancellationToken) -> Self {
        Self {
            indexer,
            input_done,
        }
    }

    /// Consume document batches until every sender is gone, then close the
    /// indexer.
    ///
    /// Submit and close failures are logged and counted. Only an encoding
    /// failure aborts the run.
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<Vec<GameDocument>>,
    ) -> Result<WriterStats, IngestError> {
        let mut stats = WriterStats::default();
        let mut draining = false;

        loop {
            let batch = tokio::select! {
                biased;
                batch = rx.recv() => batch,
                _ = self.input_done.cancelled(), if !draining => {
                    draining = true;
                    info!("Input exhausted, draining remaining documents");
                    continue;
                }
            };

            let Some(docs) = batch else {
                break;
            };
            self.write_batch(docs, &mut stats).await?;
        }

        self.close(&mut stats).await;
        Ok(stats)
    }

    async fn write_batch(
        &mut self,
        docs: Vec<GameDocument>,
        stats: &mut WriterStats,
    ) -> Result<(), IngestError> {
        let count = docs.len();

        for doc in docs {
            let body = serde_json::to_vec(&doc.source)?;
            let item = BulkItem::new(doc.index, doc.op_type, body).with_id(doc.source.game_id);

            match self.indexer.submit(item).await {
                Ok(()) => stats.submitted += 1,
                Err(e) => {
                    stats.submit_errors += 1;
                    warn!(
                        indexer = self.indexer.name(),
                        error = %e,
                        "Error adding document to bulk indexer"
                    );
                }
            }
        }

        stats.batches += 1;
        stats.documents += count as u64;
        info!(
            count,
            total = stats.submitted,
            "Done adding batch to bulk indexer"
        );
        Ok(())
    }

    async fn close(&mut self, stats: &mut WriterStats) {
        match self.indexer.close().await {
            Ok(indexer_stats) => {
                info!(
                    indexer = self.indexer.name(),
                    flushed = indexer_stats.flushed,
                    failed = indexer_stats.failed,
                    duplicates = indexer_stats.duplicates,
                    requests = indexer_stats.requests,
                    "Bulk indexer closed"
                );
                stats.indexer = Some(indexer_stats);
            }
            Err(BulkError::Flush {
                failed_requests,
                stats: indexer_stats,
            }) => {
                error!(
                    indexer = self.indexer.name(),
                    failed_requests,
                    flushed = indexer_stats.flushed,
                    failed = indexer_stats.failed,
                    duplicates = indexer_stats.duplicates,
                    requests = indexer_stats.requests,
                    "Bulk indexer closed with failed requests"
                );
                stats.indexer = Some(indexer_stats);
            }
            Err(e) => {
                error!(
                    indexer = self.indexer.name(),
                    error = %e,
                    "Error closing the bulk indexer"
                );
            }
        }
    }
}
