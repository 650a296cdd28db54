//! Configuration loading for chess-ingest.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at `~/.config/chess-ingest/config.toml`
//! (platform equivalent via `directories`).

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::document::{DEFAULT_INDEX_NAME, DEFAULT_SOURCE_LABEL};
use crate::error::ConfigError;

/// Environment variable holding the backend password when it is not set in
/// any config source.
pub const PASSWORD_ENV_VAR: &str = "ELASTIC_PASSWORD";

/// Connection and flushing settings for the Elasticsearch bulk client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticSettings {
    /// Cluster URL (e.g. "http://localhost:9200"); takes precedence over `cloud_id`
    #[serde(default)]
    pub url: Option<String>,

    /// Elastic Cloud deployment id
    #[serde(default)]
    pub cloud_id: Option<String>,

    #[serde(default = "default_username")]
    pub username: String,

    /// Never written back out; normally supplied via `ELASTIC_PASSWORD`
    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    /// Buffered bytes that trigger a bulk request
    #[serde(default = "default_flush_bytes")]
    pub flush_bytes: usize,

    /// Concurrent bulk requests (defaults to available parallelism)
    #[serde(default)]
    pub num_workers: Option<usize>,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries per bulk request after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_username() -> String {
    "elastic".to_string()
}

fn default_flush_bytes() -> usize {
    10 << 10
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_max_retries() -> u32 {
    3
}

impl Default for ElasticSettings {
    fn default() -> Self {
        Self {
            url: None,
            cloud_id: None,
            username: default_username(),
            password: None,
            flush_bytes: default_flush_bytes(),
            num_workers: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl ElasticSettings {
    /// Password from config, falling back to the `ELASTIC_PASSWORD` variable.
    pub fn resolved_password(&self) -> Option<String> {
        self.password
            .clone()
            .or_else(|| std::env::var(PASSWORD_ENV_VAR).ok())
    }

    /// Number of concurrent bulk requests.
    pub fn worker_count(&self) -> usize {
        self.num_workers.unwrap_or_else(default_parallelism)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Games per raw batch handed to the transformer pool
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Transformer pool size (defaults to available parallelism)
    #[serde(default)]
    pub workers: Option<usize>,

    /// Target index for game documents
    #[serde(default = "default_index_name")]
    pub index_name: String,

    /// Value of the `db` field
    #[serde(default = "default_source_label")]
    pub source_label: String,

    #[serde(default)]
    pub elastic: ElasticSettings,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_batch_size() -> usize {
    10_000
}

fn default_index_name() -> String {
    DEFAULT_INDEX_NAME.to_string()
}

fn default_source_label() -> String {
    DEFAULT_SOURCE_LABEL.to_string()
}

/// Available parallelism of the host, 1 when it cannot be determined.
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1)
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            batch_size: default_batch_size(),
            workers: None,
            index_name: default_index_name(),
            source_label: default_source_label(),
            elastic: ElasticSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/chess-ingest/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (`CHESS_BATCH_SIZE`, `CHESS_ELASTIC__URL`, ...)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, ConfigError> {
        let config_dir = ProjectDirs::from("", "", "chess-ingest")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("log_level", default_log_level())?
            .set_default("batch_size", default_batch_size() as i64)?
            .set_default("index_name", default_index_name())?
            .set_default("source_label", default_source_label())?
            .set_default("elastic.username", default_username())?
            .set_default("elastic.flush_bytes", default_flush_bytes() as i64)?
            .set_default("elastic.timeout_secs", default_timeout_secs() as i64)?
            .set_default("elastic.max_retries", default_max_retries() as i64)?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("CHESS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be > 0".to_string()));
        }
        if self.workers == Some(0) {
            return Err(ConfigError::Invalid("workers must be > 0".to_string()));
        }
        if self.elastic.flush_bytes == 0 {
            return Err(ConfigError::Invalid(
                "elastic.flush_bytes must be > 0".to_string(),
            ));
        }
        if self.elastic.num_workers == Some(0) {
            return Err(ConfigError::Invalid(
                "elastic.num_workers must be > 0".to_string(),
            ));
        }
        if self.index_name.trim().is_empty() {
            return Err(ConfigError::Invalid("index_name must not be empty".to_string()));
        }
        Ok(())
    }

    /// Transformer pool size.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(default_parallelism)
    }
}
