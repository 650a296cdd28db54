//! # chess-types
//!
//! Shared types for the chess-ingest workspace:
//! - [`GameDocument`]: the search document built for every game
//! - [`Settings`]: layered configuration for a run
//! - [`ConfigError`]: configuration failures

pub mod config;
pub mod document;
pub mod error;

pub use config::{default_parallelism, ElasticSettings, Settings, PASSWORD_ENV_VAR};
pub use document::{
    DataStream, EventInfo, GameDocument, GameResult, GameSource, Moves, OpType, Opening,
    PlayerDetails, Players, DEFAULT_INDEX_NAME, DEFAULT_SOURCE_LABEL,
};
pub use error::ConfigError;
