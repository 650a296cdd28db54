//! Streaming record scanner.
//!
//! Reads an archive line by line and groups lines into [`RawRecord`]s:
//! blank and tag lines accumulate, and the move list (or a bare result for
//! games without moves) seals the record. Any other line is skipped. Sealed
//! records are handed out in batches.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tracing::{debug, warn};

use crate::error::IngestError;
use crate::record::RawRecord;

/// Game termination markers accepted as a sealing line on their own.
const RESULT_TOKENS: [&str; 4] = ["1-0", "0-1", "1/2-1/2", "*"];

/// How a single archive line affects record grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Blank,
    Tag,
    /// Starts with `1.`; completes the current record
    Moves,
    /// Exactly a result token; completes a record that has no moves
    Result,
    /// Escape lines, wrapped move text, stray text; ignored
    Other,
}

impl LineKind {
    pub fn classify(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            LineKind::Blank
        } else if trimmed.starts_with('[') {
            LineKind::Tag
        } else if trimmed.starts_with("1.") {
            LineKind::Moves
        } else if RESULT_TOKENS.contains(&trimmed) {
            LineKind::Result
        } else {
            LineKind::Other
        }
    }

    /// Whether this line completes the record being accumulated.
    pub fn seals_record(self) -> bool {
        matches!(self, LineKind::Moves | LineKind::Result)
    }
}

/// Splits an archive into batches of at most `batch_size` records.
///
/// Only the final batch may be short. An archive with no complete record
/// still yields one empty batch so downstream stages see a normal run.
pub struct RecordScanner<R> {
    lines: Lines<R>,
    batch_size: usize,
    pending: String,
    batch: Vec<RawRecord>,
    line_number: u64,
    records_scanned: u64,
    batches_emitted: u64,
    finished: bool,
}

impl<R: AsyncBufRead + Unpin> RecordScanner<R> {
    /// Create a scanner; a zero `batch_size` is treated as 1.
    pub fn new(reader: R, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            lines: reader.lines(),
            batch_size,
            pending: String::new(),
            batch: Vec::with_capacity(batch_size),
            line_number: 0,
            records_scanned: 0,
            batches_emitted: 0,
            finished: false,
        }
    }

    /// Next batch of records, or `None` once the archive is exhausted.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<RawRecord>>, IngestError> {
        if self.finished {
            return Ok(None);
        }

        loop {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|source| IngestError::Read {
                    line: self.line_number + 1,
                    source,
                })?;

            let Some(line) = line else {
                break;
            };
            self.line_number += 1;

            let kind = LineKind::classify(&line);
            if kind == LineKind::Other {
                debug!(line = self.line_number, "Skipping line outside any record");
                continue;
            }

            self.pending.push_str(&line);
            self.pending.push('\n');

            if kind.seals_record() {
                let text = std::mem::take(&mut self.pending);
                self.batch.push(RawRecord::new(text));
                self.records_scanned += 1;

                if self.batch.len() >= self.batch_size {
                    return Ok(Some(self.take_batch()));
                }
            }
        }

        self.finished = true;

        if !self.pending.trim().is_empty() {
            warn!(
                line = self.line_number,
                bytes = self.pending.len(),
                "Discarding incomplete record at end of archive"
            );
        }
        self.pending.clear();

        if !self.batch.is_empty() || self.batches_emitted == 0 {
            let batch = self.take_batch();
            debug!(
                count = batch.len(),
                records = self.records_scanned,
                "Emitting final batch"
            );
            return Ok(Some(batch));
        }

        Ok(None)
    }

    fn take_batch(&mut self) -> Vec<RawRecord> {
        self.batches_emitted += 1;
        std::mem::replace(&mut self.batch, Vec::with_capacity(self.batch_size))
    }

    /// Complete records read so far.
    pub fn records_scanned(&self) -> u64 {
        self.records_scanned
    }

    pub fn batches_emitted(&self) -> u64 {
        self.batches_emitted
    }

    /// Lines read so far.
    pub fn line_number(&self) -> u64 {
        self.line_number
    }
}
