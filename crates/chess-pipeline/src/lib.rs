//! # chess-pipeline
//!
//! Streams a PGN archive into a bulk indexer:
//!
//! - [`RecordScanner`]: groups archive lines into [`RawRecord`]s, in batches
//! - [`RecordTransformer`]: turns a record into a [`GameDocument`](chess_types::GameDocument)
//! - [`BulkWriter`]: the single consumer that owns the indexer
//! - [`IngestPipeline`]: wires them together with a parallel transformer pool

pub mod error;
pub mod moves;
pub mod pipeline;
pub mod record;
pub mod scanner;
pub mod transformer;
pub mod writer;

pub use error::IngestError;
pub use moves::MoveCleaner;
pub use pipeline::{IngestPipeline, IngestStats, PipelineConfig, DEFAULT_BATCH_SIZE};
pub use record::{parse_tag_line, ParsedRecord, RawRecord, TagMap};
pub use scanner::{LineKind, RecordScanner};
pub use transformer::{
    classify_result, ingestion_timestamp, normalize_timestamp, parse_elo, RecordTransformer,
    TransformerConfig, SENTINEL_TIMESTAMP,
};
pub use writer::{BulkWriter, WriterStats};
