//! Ingestion command implementation.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use secrecy::SecretString;
use tracing::info;

use chess_bulk::{ElasticBulkIndexer, ElasticConfig};
use chess_pipeline::{
    IngestPipeline, IngestStats, PipelineConfig, RecordTransformer, TransformerConfig,
};
use chess_types::Settings;

use crate::cli::Cli;

/// Cluster used when neither a URL nor a Cloud ID is configured.
pub const DEFAULT_ELASTIC_URL: &str = "http://localhost:9200";

/// Apply CLI flags on top of loaded settings (highest precedence).
pub fn apply_overrides(settings: &mut Settings, cli: &Cli) {
    if let Some(log_level) = &cli.log_level {
        settings.log_level = log_level.clone();
    }
    if let Some(batch_size) = cli.batch_size {
        settings.batch_size = batch_size;
    }
    if let Some(workers) = cli.workers {
        settings.workers = Some(workers);
    }
    if let Some(index) = &cli.index {
        settings.index_name = index.clone();
    }
    if let Some(url) = &cli.es_url {
        settings.elastic.url = Some(url.clone());
    }
}

/// Install the global tracing subscriber. `RUST_LOG` wins over `log_level`.
pub fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Bulk client configuration derived from settings.
///
/// An explicit URL wins over a Cloud ID; with neither, the local default
/// cluster is used. Credentials are attached only when a password resolves.
pub fn build_elastic_config(settings: &Settings) -> Result<ElasticConfig> {
    let elastic = &settings.elastic;

    let config = match (&elastic.url, &elastic.cloud_id) {
        (Some(url), _) => ElasticConfig::new(url.as_str(), settings.index_name.as_str()),
        (None, Some(cloud_id)) => {
            ElasticConfig::from_cloud_id(cloud_id, settings.index_name.as_str())
                .context("Invalid Elastic Cloud ID")?
        }
        (None, None) => ElasticConfig::new(DEFAULT_ELASTIC_URL, settings.index_name.as_str()),
    };

    let mut config = config
        .with_num_workers(elastic.worker_count())
        .with_flush_bytes(elastic.flush_bytes)
        .with_timeout(Duration::from_secs(elastic.timeout_secs))
        .with_max_retries(elastic.max_retries);

    if let Some(password) = elastic.resolved_password() {
        config = config.with_credentials(elastic.username.as_str(), SecretString::from(password));
    }

    config.validate().context("Invalid Elasticsearch configuration")?;
    Ok(config)
}

/// Pipeline and transformer derived from settings.
pub fn build_pipeline(settings: &Settings) -> Result<IngestPipeline> {
    let transformer = RecordTransformer::new(
        TransformerConfig::default()
            .with_index_name(settings.index_name.as_str())
            .with_source_label(settings.source_label.as_str()),
    )
    .context("Failed to build record transformer")?;

    let config = PipelineConfig::default()
        .with_batch_size(settings.batch_size)
        .with_workers(settings.worker_count());

    Ok(IngestPipeline::new(config, transformer))
}

/// Ingest `file` into the cluster described by `settings`.
pub async fn ingest(settings: &Settings, file: &Path) -> Result<IngestStats> {
    let pipeline = build_pipeline(settings)?;
    let indexer = ElasticBulkIndexer::open(build_elastic_config(settings)?)
        .context("Failed to create bulk indexer")?;

    pipeline
        .run_file(file, Box::new(indexer))
        .await
        .with_context(|| format!("Failed to ingest {}", file.display()))
}

/// Run the `chess-ingest` command.
///
/// 1. Load configuration (defaults -> files -> env -> CLI)
/// 2. Initialize logging
/// 3. Stream the archive through the pipeline into Elasticsearch
pub async fn run_ingest(cli: Cli) -> Result<()> {
    let mut settings =
        Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    apply_overrides(&mut settings, &cli);
    settings.validate().context("Invalid configuration")?;

    init_logging(&settings.log_level)?;

    info!("chess-ingest starting...");
    info!("Configuration:");
    info!("  Archive: {}", cli.file.display());
    info!("  Index: {}", settings.index_name);
    info!("  Batch size: {}", settings.batch_size);
    info!("  Workers: {}", settings.worker_count());

    let started = Instant::now();
    let stats = ingest(&settings, &cli.file).await?;

    let indexer = stats.writer.indexer.clone().unwrap_or_default();
    info!(
        records = stats.records_scanned,
        submitted = stats.writer.submitted,
        submit_errors = stats.writer.submit_errors,
        flushed = indexer.flushed,
        failed = indexer.failed,
        duplicates = indexer.duplicates,
        failed_requests = indexer.failed_requests,
        elapsed_secs = started.elapsed().as_secs_f64(),
        "Ingestion finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_apply_overrides() {
        let cli = Cli::parse_from([
            "chess-ingest",
            "-b",
            "250",
            "-w",
            "3",
            "-i",
            "games",
            "--es-url",
            "http://es:9200",
            "-l",
            "warn",
            "games.pgn",
        ]);
        let mut settings = Settings::default();
        apply_overrides(&mut settings, &cli);

        assert_eq!(settings.batch_size, 250);
        assert_eq!(settings.workers, Some(3));
        assert_eq!(settings.index_name, "games");
        assert_eq!(settings.elastic.url.as_deref(), Some("http://es:9200"));
        assert_eq!(settings.log_level, "warn");
    }

    #[test]
    fn test_overrides_leave_unset_values() {
        let cli = Cli::parse_from(["chess-ingest", "games.pgn"]);
        let mut settings = Settings::default();
        settings.batch_size = 42;
        apply_overrides(&mut settings, &cli);

        assert_eq!(settings.batch_size, 42);
        assert_eq!(settings.workers, None);
    }

    #[test]
    fn test_elastic_config_from_url() {
        let mut settings = Settings::default();
        settings.elastic.url = Some("http://es:9200/".to_string());
        settings.elastic.cloud_id = Some("ignored:Zm9v".to_string());
        settings.elastic.num_workers = Some(2);
        settings.elastic.password = Some("changeme".to_string());

        let config = build_elastic_config(&settings).unwrap();
        assert_eq!(config.endpoint, "http://es:9200/");
        assert_eq!(config.bulk_url(), "http://es:9200/_bulk");
        assert_eq!(config.index, "chess-summaries");
        assert_eq!(config.num_workers, 2);
        assert!(config.password.is_some());
    }

    #[test]
    fn test_elastic_config_from_cloud_id() {
        let mut settings = Settings::default();
        // base64("us-east-1.aws.found.io$abc123$kib456")
        settings.elastic.cloud_id =
            Some("deploy:dXMtZWFzdC0xLmF3cy5mb3VuZC5pbyRhYmMxMjMka2liNDU2".to_string());

        let config = build_elastic_config(&settings).unwrap();
        assert_eq!(config.endpoint, "https://abc123.us-east-1.aws.found.io");
    }

    #[test]
    fn test_elastic_config_defaults_to_localhost() {
        let config = build_elastic_config(&Settings::default()).unwrap();
        assert_eq!(config.endpoint, DEFAULT_ELASTIC_URL);
    }

    #[test]
    fn test_invalid_cloud_id() {
        let mut settings = Settings::default();
        settings.elastic.cloud_id = Some("deploy:!!!not-base64".to_string());
        assert!(build_elastic_config(&settings).is_err());
    }

    #[test]
    fn test_build_pipeline() {
        let mut settings = Settings::default();
        settings.batch_size = 7;
        settings.workers = Some(5);

        let pipeline = build_pipeline(&settings).unwrap();
        assert_eq!(pipeline.config().batch_size, 7);
        assert_eq!(pipeline.config().workers, 5);
    }
}
