//! Search document produced for every ingested game.
//!
//! The JSON shape mirrors the `chess-summaries` index mapping: bulk metadata
//! (`_index`, `_op_type`) wraps the `_source` body that is actually sent.

use serde::{Deserialize, Serialize};

/// Default target index for game summaries.
pub const DEFAULT_INDEX_NAME: &str = "chess-summaries";

/// Default value of the `db` field (origin of the archive).
pub const DEFAULT_SOURCE_LABEL: &str = "lichess";

/// Bulk operation applied to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpType {
    /// Fail when a document with the same id exists
    #[default]
    Create,
    /// Insert or overwrite
    Index,
}

impl OpType {
    /// Action name used in bulk request metadata lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            OpType::Create => "create",
            OpType::Index => "index",
        }
    }
}

impl std::fmt::Display for OpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transformed game ready for submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameDocument {
    #[serde(rename = "_index")]
    pub index: String,

    #[serde(rename = "_op_type")]
    pub op_type: OpType,

    #[serde(rename = "_source")]
    pub source: GameSource,
}

/// Document body stored in the index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameSource {
    /// When the game was played, or the sentinel future date
    #[serde(rename = "@timestamp")]
    pub timestamp: String,

    /// Source system label
    pub db: String,

    pub event: EventInfo,

    /// `Event` tag
    pub name: String,

    /// SHA-256 of the raw game text
    pub game_id: String,

    /// `Site` tag
    pub url: String,

    pub data_stream: DataStream,

    pub moves: Moves,

    pub user: Players,

    pub result: GameResult,

    pub opening: Opening,

    /// Lower-cased `Termination` tag
    pub termination: String,

    /// `TimeControl` tag
    pub timecontrol: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventInfo {
    /// Processing time of the batch the game belonged to
    pub ingested: String,
}

/// Data stream naming attached to every document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataStream {
    pub namespace: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub dataset: String,
}

impl DataStream {
    pub fn new(
        namespace: impl Into<String>,
        kind: impl Into<String>,
        dataset: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            kind: kind.into(),
            dataset: dataset.into(),
        }
    }
}

impl Default for DataStream {
    fn default() -> Self {
        Self::new("default", "summary", "chess-games")
    }
}

/// Move text as recorded and, for annotated games, stripped of commentary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Moves {
    pub original: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleaned: Option<String>,

    /// Number of full moves in the cleaned text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_moves: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Players {
    pub white: PlayerDetails,
    pub black: PlayerDetails,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerDetails {
    pub name: String,
    pub elo: i32,
    pub diff: i32,
}

/// Game outcome. At most one of the flags is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameResult {
    /// Raw `Result` tag, empty when absent
    pub outcome: String,

    #[serde(default, skip_serializing_if = "is_false")]
    pub white: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub black: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub draw: bool,
}

impl GameResult {
    /// True when none of the outcome flags is set.
    pub fn is_unknown(&self) -> bool {
        !(self.white || self.black || self.draw)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opening {
    pub eco: String,
    pub name: String,
}

fn is_false(value: &bool) -> bool {
    !*value
}
