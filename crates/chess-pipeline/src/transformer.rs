//! Record-to-document transformation.
//!
//! Pure CPU work: no I/O, no shared mutable state. One [`RecordTransformer`]
//! is shared by every worker in the pool.

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::debug;

use chess_types::{
    DataStream, EventInfo, GameDocument, GameResult, GameSource, Moves, OpType, Opening,
    PlayerDetails, Players, DEFAULT_INDEX_NAME, DEFAULT_SOURCE_LABEL,
};

use crate::error::IngestError;
use crate::moves::MoveCleaner;
use crate::record::RawRecord;

/// Timestamp used when a game's date or time is missing or unparsable.
pub const SENTINEL_TIMESTAMP: &str = "2030-01-01T12:00:00.000+00:00";

/// Constant metadata stamped onto every document.
#[derive(Debug, Clone)]
pub struct TransformerConfig {
    pub index_name: String,
    pub source_label: String,
    pub data_stream: DataStream,
    pub op_type: OpType,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            index_name: DEFAULT_INDEX_NAME.to_string(),
            source_label: DEFAULT_SOURCE_LABEL.to_string(),
            data_stream: DataStream::default(),
            op_type: OpType::Create,
        }
    }
}

impl TransformerConfig {
    /// Create a new config with the given target index.
    pub fn with_index_name(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = index_name.into();
        self
    }

    /// Create a new config with the given `db` label.
    pub fn with_source_label(mut self, source_label: impl Into<String>) -> Self {
        self.source_label = source_label.into();
        self
    }

    /// Create a new config with the given data stream fields.
    pub fn with_data_stream(mut self, data_stream: DataStream) -> Self {
        self.data_stream = data_stream;
        self
    }
}

/// Turns raw game records into search documents.
#[derive(Debug, Clone)]
pub struct RecordTransformer {
    config: TransformerConfig,
    cleaner: MoveCleaner,
}

impl RecordTransformer {
    /// Compile the move patterns and take ownership of `config`.
    pub fn new(config: TransformerConfig) -> Result<Self, IngestError> {
        Ok(Self {
            config,
            cleaner: MoveCleaner::new()?,
        })
    }

    pub fn config(&self) -> &TransformerConfig {
        &self.config
    }

    /// Transform a whole batch, preserving order.
    ///
    /// The ingestion time is taken once, so every document in the batch
    /// carries the same `event.ingested`.
    pub fn transform_batch(&self, records: Vec<RawRecord>) -> Vec<GameDocument> {
        let ingested = ingestion_timestamp(Utc::now());
        records
            .iter()
            .map(|record| self.transform_record(record, &ingested))
            .collect()
    }

    /// Build the document for a single record.
    pub fn transform_record(&self, record: &RawRecord, ingested: &str) -> GameDocument {
        let mut parsed = record.parse();
        let original = std::mem::take(&mut parsed.moves);

        let (cleaned, total_moves) = if MoveCleaner::needs_cleaning(&original) {
            let cleaned = self.cleaner.clean(&original);
            let total = self.cleaner.count_moves(&cleaned);
            (Some(cleaned), Some(total))
        } else {
            (None, None)
        };

        let player = |color: &str| PlayerDetails {
            name: parsed.tag(color).to_string(),
            elo: parse_elo(parsed.tag(&format!("{}Elo", color))),
            diff: parse_elo(parsed.tag(&format!("{}RatingDiff", color))),
        };

        let source = GameSource {
            timestamp: normalize_timestamp(
                parsed.tags.get("UTCDate").map(String::as_str),
                parsed.tags.get("UTCTime").map(String::as_str),
            ),
            db: self.config.source_label.clone(),
            event: EventInfo {
                ingested: ingested.to_string(),
            },
            name: parsed.tag("Event").to_string(),
            game_id: record.game_id(),
            url: parsed.tag("Site").to_string(),
            data_stream: self.config.data_stream.clone(),
            moves: Moves {
                original,
                cleaned,
                total_moves,
            },
            user: Players {
                white: player("White"),
                black: player("Black"),
            },
            result: classify_result(parsed.tag("Result")),
            opening: Opening {
                eco: parsed.tag("ECO").to_string(),
                name: parsed.tag("Opening").to_string(),
            },
            termination: parsed.tag("Termination").to_lowercase(),
            timecontrol: parsed.tag("TimeControl").to_string(),
        };

        GameDocument {
            index: self.config.index_name.clone(),
            op_type: self.config.op_type,
            source,
        }
    }
}

/// Combine `UTCDate` (`YYYY.MM.DD`) and `UTCTime` (`HH:MM:SS`) into an
/// RFC 3339 timestamp with millisecond precision.
///
/// Missing or unparsable input yields [`SENTINEL_TIMESTAMP`].
pub fn normalize_timestamp(date: Option<&str>, time: Option<&str>) -> String {
    let (Some(date), Some(time)) = (date, time) else {
        return SENTINEL_TIMESTAMP.to_string();
    };

    let candidate = format!("{}T{}Z", date, time).replace('.', "-");
    match DateTime::parse_from_rfc3339(&candidate) {
        Ok(parsed) => parsed
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Millis, false),
        Err(e) => {
            debug!(date, time, error = %e, "Unparsable game timestamp, using sentinel");
            SENTINEL_TIMESTAMP.to_string()
        }
    }
}

/// Parse a rating or rating difference. `"?"`, empty, and garbage map to 0.
pub fn parse_elo(value: &str) -> i32 {
    let value = value.trim();
    if value.is_empty() || value == "?" {
        return 0;
    }

    match value.parse::<i32>() {
        Ok(elo) => elo,
        Err(e) => {
            debug!(value, error = %e, "Unparsable rating, using 0");
            0
        }
    }
}

/// Map a `Result` tag to outcome flags. At most one flag is set.
pub fn classify_result(outcome: &str) -> GameResult {
    let mut result = GameResult {
        outcome: outcome.to_string(),
        ..Default::default()
    };
    match outcome {
        "1-0" => result.white = true,
        "0-1" => result.black = true,
        "1/2-1/2" => result.draw = true,
        _ => {}
    }
    result
}

/// Format an ingestion time as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
pub fn ingestion_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}
