//! Error types for bulk submission.

use thiserror::Error;

use crate::BulkStats;

/// Errors raised by a [`BulkIndexer`](crate::BulkIndexer).
#[derive(Debug, Error)]
pub enum BulkError {
    /// Transport-level failure (connect, timeout, body read)
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The bulk endpoint answered with a non-success status
    #[error("Bulk request rejected with status {status}: {body}")]
    Status { status: u16, body: String },

    /// The bulk response body could not be decoded
    #[error("Failed to parse bulk response: {0}")]
    Parse(String),

    /// A single item inside an accepted bulk request was rejected
    #[error("Item rejected with status {status}: {reason}")]
    Item { status: u16, reason: String },

    /// Submit or close after the indexer was closed
    #[error("Bulk indexer is closed")]
    Closed,

    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Bulk requests that failed permanently, reported on close along with
    /// the counters for everything that was sent
    #[error("{failed_requests} bulk request(s) failed permanently")]
    Flush {
        failed_requests: usize,
        stats: BulkStats,
    },
}

impl BulkError {
    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            BulkError::Http(_) => true,
            BulkError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for BulkError {
    fn from(err: reqwest::Error) -> Self {
        BulkError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for BulkError {
    fn from(err: serde_json::Error) -> Self {
        BulkError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BulkError::Status {
            status: 503,
            body: "unavailable".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Bulk request rejected with status 503: unavailable"
        );
        assert_eq!(BulkError::Closed.to_string(), "Bulk indexer is closed");
        assert_eq!(
            BulkError::Flush {
                failed_requests: 2,
                stats: BulkStats::default(),
            }
            .to_string(),
            "2 bulk request(s) failed permanently"
        );
    }

    #[test]
    fn test_retryable() {
        assert!(BulkError::Http("reset".to_string()).is_retryable());
        assert!(BulkError::Status { status: 429, body: String::new() }.is_retryable());
        assert!(BulkError::Status { status: 502, body: String::new() }.is_retryable());
        assert!(!BulkError::Status { status: 400, body: String::new() }.is_retryable());
        assert!(!BulkError::Parse("eof".to_string()).is_retryable());
        assert!(!BulkError::Closed.is_retryable());
    }

    #[test]
    fn test_flush_error_carries_stats() {
        let err = BulkError::Flush {
            failed_requests: 1,
            stats: BulkStats {
                flushed: 9,
                failed: 1,
                failed_requests: 1,
                ..Default::default()
            },
        };
        assert!(!err.is_retryable());
        assert!(matches!(err, BulkError::Flush { stats, .. } if stats.flushed == 9));
    }
}
