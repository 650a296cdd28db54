//! chess-ingest
//!
//! Bulk-loads a PGN game archive into Elasticsearch.
//!
//! # Usage
//!
//! ```bash
//! ELASTIC_PASSWORD=... chess-ingest lichess_db_standard_rated_2013-01.pgn \
//!     [--config PATH] [--batch-size N] [--workers N] [--index NAME] [--es-url URL]
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/chess-ingest/config.toml)
//! 3. `--config` file
//! 4. Environment variables (CHESS_*)
//! 5. CLI flags

use anyhow::Result;
use clap::Parser;

use chess_ingest::{run_ingest, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    run_ingest(cli).await
}
