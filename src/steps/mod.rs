//! Production step executors, one per chain step.

pub mod cleanup;
pub mod convert;
pub mod download;
pub mod existence_check;
pub mod register;
pub mod upload;

pub use cleanup::CleanupExecutor;
pub use convert::{convert, ConvertExecutor};
pub use download::DownloadExecutor;
pub use existence_check::ExistenceCheckExecutor;
pub use register::RegisterExecutor;
pub use upload::UploadExecutor;

use crate::config::PipelineConfig;
use crate::orchestration::StepExecutorRegistry;
use crate::storage::ObjectStore;
use crate::warehouse::Warehouse;
use std::sync::Arc;

/// Registry with every chain step backed by its production executor
pub fn standard_registry(
    config: &PipelineConfig,
    client: reqwest::Client,
    store: Arc<dyn ObjectStore>,
    warehouse: Arc<dyn Warehouse>,
) -> StepExecutorRegistry {
    let mut registry = StepExecutorRegistry::new();
    registry
        .register(Arc::new(ExistenceCheckExecutor::new(
            client.clone(),
            config.http.head_timeout(),
        )))
        .register(Arc::new(DownloadExecutor::new(
            client,
            config.http.download_timeout(),
            config.http.max_download_bytes,
        )))
        .register(Arc::new(ConvertExecutor::new()))
        .register(Arc::new(UploadExecutor::new(
            store,
            config.storage.bucket.clone(),
        )))
        .register(Arc::new(CleanupExecutor::new()))
        .register(Arc::new(RegisterExecutor::new(
            warehouse,
            config.warehouse.project_id.clone(),
            config.warehouse.dataset.clone(),
            config.storage.bucket.clone(),
        )));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalObjectStore;
    use crate::warehouse::LocalWarehouse;

    #[test]
    fn test_standard_registry_covers_the_chain() {
        let config = PipelineConfig::default();
        let registry = standard_registry(
            &config,
            reqwest::Client::new(),
            Arc::new(LocalObjectStore::new("objects")),
            Arc::new(LocalWarehouse::new("warehouse")),
        );
        assert!(registry.validate_complete().is_ok());
    }
}
