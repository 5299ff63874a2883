//! # Pipeline Configuration
//!
//! One explicit [`PipelineConfig`] value is built once per process and handed to
//! the orchestrator and step executors. Nothing reads the environment after
//! that point.
//!
//! Layers, lowest priority first:
//! 1. Built-in defaults (with the legacy deployment variables `GCP_PROJECT_ID`,
//!    `GCP_GCS_BUCKET`, `BIGQUERY_DATASET`, `AIRFLOW_HOME` and
//!    `GOOGLE_OAUTH_ACCESS_TOKEN` folded in)
//! 2. An optional config file (`PIPELINE_CONFIG`, any format the `config` crate reads)
//! 3. `PIPELINE_*` environment variables, nested with `__`
//!
//! ```rust,no_run
//! use partition_loader::config::PipelineConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // e.g. PIPELINE_STORAGE__BUCKET=my-bucket PIPELINE_SCHEDULER__MAX_CONCURRENT_PARTITIONS=8
//! let config = PipelineConfig::load()?;
//! println!("{} partitions", config.source.partitions.len());
//! # Ok(())
//! # }
//! ```

use crate::error::{PipelineError, Result};
use crate::state_machine::StepKind;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str =
    "https://github.com/chrisdamba/adaptive-ads/raw/main/dbt/seeds/imdb_movie_dataset";

pub const DEFAULT_PARTITIONS: [&str; 24] = [
    "action",
    "adventure",
    "animation",
    "biography",
    "comedy",
    "crime",
    "documentary",
    "drama",
    "family",
    "fantasy",
    "film-noir",
    "history",
    "horror",
    "music",
    "musical",
    "mystery",
    "news",
    "romance",
    "scifi",
    "short",
    "sports",
    "thriller",
    "war",
    "western",
];

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Where partitions come from
    pub source: SourceConfig,

    /// Scratch directory for downloaded and converted files
    pub work_dir: PathBuf,

    /// Object storage destination
    pub storage: StorageConfig,

    /// Warehouse destination
    pub warehouse: WarehouseConfig,

    /// Timeouts and size limits for HTTP calls
    pub http: HttpConfig,

    pub scheduler: SchedulerConfig,

    /// Per-step retry settings (only retryable steps are configurable)
    pub retry: RetryConfig,

    /// OAuth bearer token for the cloud storage and warehouse APIs
    #[serde(default)]
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    pub base_url: String,
    pub file_extension: String,
    pub partitions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackendKind {
    Gcs,
    /// Objects are written below `local_root/<bucket>/`
    Local,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub backend: StorageBackendKind,
    pub bucket: String,
    pub endpoint: String,
    pub local_root: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarehouseBackendKind {
    Bigquery,
    /// Table definitions are written as JSON files below `local_root`
    Local,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WarehouseConfig {
    pub backend: WarehouseBackendKind,
    pub project_id: String,
    pub dataset: String,
    pub endpoint: String,
    pub local_root: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    pub connect_timeout_ms: u64,
    pub head_timeout_ms: u64,
    pub download_timeout_ms: u64,
    /// Timeout for storage and warehouse API calls
    pub request_timeout_ms: u64,
    pub max_download_bytes: u64,
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn head_timeout(&self) -> Duration {
        Duration::from_millis(self.head_timeout_ms)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_millis(self.download_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    pub max_concurrent_partitions: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    pub gate: StepRetryConfig,
    pub download: StepRetryConfig,
    pub upload: StepRetryConfig,
    pub register: StepRetryConfig,
}

impl RetryConfig {
    /// Settings for a retryable step; `None` for steps that always run once
    pub fn for_step(&self, kind: StepKind) -> Option<&StepRetryConfig> {
        match kind {
            StepKind::Gate => Some(&self.gate),
            StepKind::Download => Some(&self.download),
            StepKind::Upload => Some(&self.upload),
            StepKind::Register => Some(&self.register),
            StepKind::Convert | StepKind::Cleanup => None,
        }
    }
}

/// Attempt and backoff settings for one step kind
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StepRetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_enabled: bool,
    /// Maximum jitter as a fraction of the delay (0.0 to 1.0)
    pub max_jitter: f64,
}

impl Default for StepRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter_enabled: true,
            max_jitter: 0.1,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig {
                base_url: DEFAULT_BASE_URL.to_string(),
                file_extension: "csv".to_string(),
                partitions: DEFAULT_PARTITIONS.iter().map(|p| p.to_string()).collect(),
            },
            work_dir: PathBuf::from("work"),
            storage: StorageConfig {
                backend: StorageBackendKind::Gcs,
                bucket: String::new(),
                endpoint: "https://storage.googleapis.com".to_string(),
                local_root: PathBuf::from("work/object-store"),
            },
            warehouse: WarehouseConfig {
                backend: WarehouseBackendKind::Bigquery,
                project_id: String::new(),
                dataset: "imdb_dataset".to_string(),
                endpoint: "https://bigquery.googleapis.com".to_string(),
                local_root: PathBuf::from("work/warehouse"),
            },
            http: HttpConfig {
                connect_timeout_ms: 5_000,
                head_timeout_ms: 10_000,
                download_timeout_ms: 300_000,
                request_timeout_ms: 120_000,
                max_download_bytes: 512 * 1024 * 1024,
            },
            scheduler: SchedulerConfig {
                max_concurrent_partitions: 4,
            },
            retry: RetryConfig {
                gate: StepRetryConfig {
                    base_delay_ms: 500,
                    max_delay_ms: 5_000,
                    ..StepRetryConfig::default()
                },
                download: StepRetryConfig::default(),
                upload: StepRetryConfig::default(),
                register: StepRetryConfig::default(),
            },
            access_token: None,
        }
    }
}

impl PipelineConfig {
    /// Load configuration, reading the optional file named by `PIPELINE_CONFIG`
    pub fn load() -> Result<Self> {
        let path = std::env::var("PIPELINE_CONFIG").ok().map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    /// Load configuration with an explicit optional config file
    pub fn load_from(config_file: Option<&Path>) -> Result<Self> {
        let mut defaults = Self::default();
        defaults.apply_legacy_environment();

        let mut builder = Config::builder().add_source(Config::try_from(&defaults)?);

        if let Some(path) = config_file {
            debug!(path = %path.display(), "Loading pipeline configuration file");
            builder = builder.add_source(File::from(path).required(true));
        }

        let config: PipelineConfig = builder
            .add_source(
                Environment::with_prefix("PIPELINE")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("source.partitions")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;

        debug!(config = %config.sanitized(), "Pipeline configuration loaded");

        Ok(config)
    }

    /// Fold the variables the original deployment used into the defaults
    fn apply_legacy_environment(&mut self) {
        if let Ok(project) = std::env::var("GCP_PROJECT_ID") {
            self.warehouse.project_id = project;
        }
        if let Ok(bucket) = std::env::var("GCP_GCS_BUCKET") {
            self.storage.bucket = bucket;
        }
        if let Ok(dataset) = std::env::var("BIGQUERY_DATASET") {
            self.warehouse.dataset = dataset;
        }
        if let Ok(home) = std::env::var("AIRFLOW_HOME") {
            self.work_dir = PathBuf::from(home);
        }
        if let Ok(token) = std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN") {
            self.access_token = Some(token);
        }
    }

    /// Validate the configuration, rejecting values that would fail every partition
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(PipelineError::ConfigurationError(reason));

        if self.source.base_url.trim().is_empty() {
            return invalid("source.base_url must not be empty".to_string());
        }
        if reqwest::Url::parse(&self.source.base_url).is_err() {
            return invalid(format!(
                "source.base_url is not a valid URL: {}",
                self.source.base_url
            ));
        }
        if self.source.file_extension.trim().is_empty() {
            return invalid("source.file_extension must not be empty".to_string());
        }
        if self.storage.bucket.trim().is_empty() {
            return invalid("storage.bucket must be set (or GCP_GCS_BUCKET)".to_string());
        }
        if self.warehouse.dataset.trim().is_empty() {
            return invalid("warehouse.dataset must not be empty".to_string());
        }
        if self.warehouse.backend == WarehouseBackendKind::Bigquery
            && self.warehouse.project_id.trim().is_empty()
        {
            return invalid(
                "warehouse.project_id must be set for the bigquery backend (or GCP_PROJECT_ID)"
                    .to_string(),
            );
        }
        if self.scheduler.max_concurrent_partitions == 0 {
            return invalid("scheduler.max_concurrent_partitions must be at least 1".to_string());
        }
        if self.http.max_download_bytes == 0 {
            return invalid("http.max_download_bytes must be greater than zero".to_string());
        }

        for kind in StepKind::CHAIN {
            let Some(retry) = self.retry.for_step(kind) else {
                continue;
            };
            if retry.max_attempts == 0 {
                return invalid(format!("retry.{kind}.max_attempts must be at least 1"));
            }
            if retry.backoff_multiplier < 1.0 {
                return invalid(format!("retry.{kind}.backoff_multiplier must be >= 1.0"));
            }
            if !(0.0..=1.0).contains(&retry.max_jitter) {
                return invalid(format!("retry.{kind}.max_jitter must be within 0.0..=1.0"));
            }
            if retry.max_delay_ms < retry.base_delay_ms {
                return invalid(format!(
                    "retry.{kind}.max_delay_ms must not be below base_delay_ms"
                ));
            }
        }

        Ok(())
    }

    /// Configuration rendered for logs with the access token masked
    pub fn sanitized(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let Some(token) = value.get_mut("access_token") {
            if !token.is_null() {
                *token = serde_json::Value::String("***REDACTED***".to_string());
            }
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.storage.bucket = "movies-bucket".to_string();
        config.warehouse.project_id = "movies-project".to_string();
        config
    }

    #[test]
    fn test_default_partitions_match_deployment() {
        let config = PipelineConfig::default();
        assert_eq!(config.source.partitions.len(), 24);
        assert!(config.source.partitions.contains(&"film-noir".to_string()));
        assert_eq!(config.warehouse.dataset, "imdb_dataset");
    }

    #[test]
    fn test_validate_requires_bucket() {
        let mut config = valid_config();
        assert!(config.validate().is_ok());

        config.storage.bucket.clear();
        let error = config.validate().unwrap_err();
        assert!(error.to_string().contains("storage.bucket"));
    }

    #[test]
    fn test_validate_project_only_for_bigquery() {
        let mut config = valid_config();
        config.warehouse.project_id.clear();
        assert!(config.validate().is_err());

        config.warehouse.backend = WarehouseBackendKind::Local;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency_and_attempts() {
        let mut config = valid_config();
        config.scheduler.max_concurrent_partitions = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.retry.upload.max_attempts = 0;
        let error = config.validate().unwrap_err();
        assert!(error.to_string().contains("retry.upload.max_attempts"));
    }

    #[test]
    fn test_retry_settings_only_for_retryable_steps() {
        let config = valid_config();
        assert!(config.retry.for_step(StepKind::Gate).is_some());
        assert!(config.retry.for_step(StepKind::Register).is_some());
        assert!(config.retry.for_step(StepKind::Convert).is_none());
        assert!(config.retry.for_step(StepKind::Cleanup).is_none());
    }

    #[test]
    fn test_sanitized_masks_token() {
        let mut config = valid_config();
        config.access_token = Some("ya29.secret".to_string());
        let rendered = config.sanitized().to_string();
        assert!(!rendered.contains("ya29.secret"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(
            &path,
            r#"{
                "storage": { "bucket": "file-bucket", "backend": "local" },
                "warehouse": { "backend": "local" },
                "scheduler": { "max_concurrent_partitions": 2 },
                "source": { "partitions": ["comedy", "noir"] }
            }"#,
        )
        .unwrap();

        let config = PipelineConfig::load_from(Some(&path)).unwrap();
        assert_eq!(config.storage.bucket, "file-bucket");
        assert_eq!(config.storage.backend, StorageBackendKind::Local);
        assert_eq!(config.scheduler.max_concurrent_partitions, 2);
        assert_eq!(config.source.partitions, vec!["comedy", "noir"]);
        // untouched keys keep their defaults
        assert_eq!(config.source.file_extension, "csv");
        assert_eq!(config.retry.download.max_attempts, 3);
    }
}
