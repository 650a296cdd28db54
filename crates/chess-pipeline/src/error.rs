//! Error types for the ingestion pipeline.

use thiserror::Error;

/// Errors that abort an ingestion run.
///
/// Malformed game metadata never shows up here; parsing degrades to default
/// field values instead.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The archive could not be opened
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reading the archive failed part-way through
    #[error("Failed to read archive at line {line}: {source}")]
    Read {
        line: u64,
        #[source]
        source: std::io::Error,
    },

    /// A document could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A move-text pattern failed to compile
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// A downstream stage stopped receiving
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// A pipeline task panicked or was cancelled
    #[error("Task failed: {0}")]
    Task(String),
}
