//! Warehouse metadata backends for external table registration.
//!
//! Registration is idempotent: an identical definition is a no-op, a
//! compatible one (same table kind and source format) is updated in place, and
//! anything else is a `MetadataConflict`.

mod bigquery;
mod local;

pub use bigquery::BigQueryWarehouse;
pub use local::LocalWarehouse;

use crate::config::{PipelineConfig, WarehouseBackendKind};
use crate::error::{PipelineError, Result, StepResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// File format of the objects an external table reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceFormat {
    Parquet,
    Csv,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parquet => "PARQUET",
            Self::Csv => "CSV",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to create or update one external table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalTableDefinition {
    pub project_id: String,
    pub dataset: String,
    pub table: String,
    pub source_format: SourceFormat,
    pub source_uris: Vec<String>,
}

impl ExternalTableDefinition {
    /// Fully qualified `project.dataset.table`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}.{}", self.project_id, self.dataset, self.table)
    }

    /// Source URIs compared as a set
    pub fn same_sources(&self, other_uris: &[String]) -> bool {
        let mut ours = self.source_uris.clone();
        let mut theirs = other_uris.to_vec();
        ours.sort();
        ours.dedup();
        theirs.sort();
        theirs.dedup();
        ours == theirs
    }
}

/// What a registration call did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationOutcome {
    Created,
    Updated,
    /// Existing definition already matched
    Unchanged,
}

impl fmt::Display for RegistrationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
            Self::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Warehouse metadata contract the register step relies on.
#[async_trait]
pub trait Warehouse: Send + Sync + 'static {
    /// Create the external table or bring an existing compatible one in line.
    ///
    /// Incompatible existing tables are `MetadataConflict`, permission problems
    /// `MetadataAuth`, retryable failures `MetadataTransient`.
    async fn create_or_update_external_table(
        &self,
        definition: &ExternalTableDefinition,
    ) -> StepResult<RegistrationOutcome>;

    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;
}

/// Build the configured warehouse backend
pub fn from_config(config: &PipelineConfig, client: reqwest::Client) -> Result<Arc<dyn Warehouse>> {
    match config.warehouse.backend {
        WarehouseBackendKind::Bigquery => {
            let token = config.access_token.clone().ok_or_else(|| {
                PipelineError::ConfigurationError(
                    "access_token is required for the bigquery warehouse backend".to_string(),
                )
            })?;
            Ok(Arc::new(BigQueryWarehouse::new(
                client,
                config.warehouse.endpoint.clone(),
                token,
                config.http.request_timeout(),
            )))
        }
        WarehouseBackendKind::Local => Ok(Arc::new(LocalWarehouse::new(
            config.warehouse.local_root.clone(),
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(uris: &[&str]) -> ExternalTableDefinition {
        ExternalTableDefinition {
            project_id: "movies-project".to_string(),
            dataset: "imdb_dataset".to_string(),
            table: "comedy".to_string(),
            source_format: SourceFormat::Parquet,
            source_uris: uris.iter().map(|u| u.to_string()).collect(),
        }
    }

    #[test]
    fn test_qualified_name() {
        assert_eq!(
            definition(&[]).qualified_name(),
            "movies-project.imdb_dataset.comedy"
        );
    }

    #[test]
    fn test_same_sources_ignores_order_and_duplicates() {
        let def = definition(&["gs://b/a/*.parquet", "gs://b/c/*.parquet"]);
        assert!(def.same_sources(&[
            "gs://b/c/*.parquet".to_string(),
            "gs://b/a/*.parquet".to_string(),
            "gs://b/a/*.parquet".to_string(),
        ]));
        assert!(!def.same_sources(&["gs://b/a/*.parquet".to_string()]));
    }

    #[test]
    fn test_source_format_wire_name() {
        assert_eq!(
            serde_json::to_string(&SourceFormat::Parquet).unwrap(),
            "\"PARQUET\""
        );
    }
}
