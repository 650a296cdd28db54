//! chess-ingest library exports.
//!
//! - `cli`: command-line parsing with clap
//! - `commands`: settings resolution, logging setup, and the ingestion run

pub mod cli;
pub mod commands;

pub use cli::Cli;
pub use commands::{
    apply_overrides, build_elastic_config, build_pipeline, ingest, init_logging, run_ingest,
    DEFAULT_ELASTIC_URL,
};
