//! CLI argument parsing for chess-ingest.
//!
//! Flags override every other configuration source.

use std::path::PathBuf;

use clap::Parser;

/// Bulk-load a PGN game archive into Elasticsearch
#[derive(Parser, Debug)]
#[command(name = "chess-ingest")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// PGN archive to ingest
    pub file: PathBuf,

    /// Path to config file (overrides default ~/.config/chess-ingest/config.toml)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Games per batch handed to the transformer pool
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Transformer workers (default: available parallelism)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Target index
    #[arg(short, long)]
    pub index: Option<String>,

    /// Elasticsearch URL (takes precedence over a configured Cloud ID)
    #[arg(long)]
    pub es_url: Option<String>,
}
