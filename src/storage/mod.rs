//! Object storage backends for uploaded columnar files.
//!
//! Uploads overwrite unconditionally: the same partition always lands on the
//! same key, so retries and re-runs replace the previous object instead of
//! leaving duplicates behind.

mod gcs;
mod local;

pub use gcs::GcsObjectStore;
pub use local::LocalObjectStore;

use crate::config::{PipelineConfig, StorageBackendKind};
use crate::error::{PipelineError, Result, StepResult};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Storage contract the upload step relies on.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Upload `local_path` to `bucket/key`, replacing any existing object.
    ///
    /// Returns the remote URI of the stored object. Auth failures must be
    /// reported as `StorageAuth`, retryable failures as `StorageTransient`.
    async fn put(&self, bucket: &str, key: &str, local_path: &Path) -> StepResult<String>;

    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;
}

/// URI form the warehouse understands for an object in a bucket
pub fn gcs_uri(bucket: &str, key: &str) -> String {
    format!("gs://{bucket}/{key}")
}

/// Build the configured object store
pub fn from_config(
    config: &PipelineConfig,
    client: reqwest::Client,
) -> Result<Arc<dyn ObjectStore>> {
    match config.storage.backend {
        StorageBackendKind::Gcs => {
            let token = config.access_token.clone().ok_or_else(|| {
                PipelineError::ConfigurationError(
                    "access_token is required for the gcs storage backend".to_string(),
                )
            })?;
            Ok(Arc::new(GcsObjectStore::new(
                client,
                config.storage.endpoint.clone(),
                token,
                config.http.request_timeout(),
            )))
        }
        StorageBackendKind::Local => Ok(Arc::new(LocalObjectStore::new(
            config.storage.local_root.clone(),
        ))),
    }
}
