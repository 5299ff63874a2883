use super::{ExternalTableDefinition, RegistrationOutcome, Warehouse};
use crate::error::{ErrorKind, StepError, StepResult};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

/// Warehouse that keeps table definitions as JSON documents on disk.
///
/// Layout is `root/<project>/<dataset>/<table>.json`.
#[derive(Debug, Clone)]
pub struct LocalWarehouse {
    root: PathBuf,
}

impl LocalWarehouse {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn definition_path(&self, project_id: &str, dataset: &str, table: &str) -> PathBuf {
        self.root
            .join(project_id)
            .join(dataset)
            .join(format!("{table}.json"))
    }

    /// Read back a stored definition, `None` if the table was never registered
    pub async fn get(
        &self,
        project_id: &str,
        dataset: &str,
        table: &str,
    ) -> StepResult<Option<ExternalTableDefinition>> {
        let path = self.definition_path(project_id, dataset, table);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StepError::local_io(&format!("read {}", path.display()), e)),
        };
        serde_json::from_slice(&raw).map(Some).map_err(|e| {
            StepError::new(
                ErrorKind::MetadataConflict,
                format!("{} is not a table definition: {e}", path.display()),
            )
        })
    }

    async fn write(&self, definition: &ExternalTableDefinition) -> StepResult<()> {
        let path = self.definition_path(&definition.project_id, &definition.dataset, &definition.table);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StepError::local_io(&format!("create {}", parent.display()), e))?;
        }

        let body = serde_json::to_vec_pretty(definition)
            .map_err(|e| StepError::new(ErrorKind::Internal, e.to_string()))?;
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, body)
            .await
            .map_err(|e| StepError::local_io(&format!("write {}", staging.display()), e))?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|e| StepError::local_io(&format!("publish {}", path.display()), e))
    }
}

#[async_trait]
impl Warehouse for LocalWarehouse {
    async fn create_or_update_external_table(
        &self,
        definition: &ExternalTableDefinition,
    ) -> StepResult<RegistrationOutcome> {
        let existing = self
            .get(&definition.project_id, &definition.dataset, &definition.table)
            .await?;

        let outcome = match existing {
            None => RegistrationOutcome::Created,
            Some(current) if current.source_format != definition.source_format => {
                return Err(StepError::new(
                    ErrorKind::MetadataConflict,
                    format!(
                        "{} reads {} files, expected {}",
                        definition.qualified_name(),
                        current.source_format,
                        definition.source_format
                    ),
                ));
            }
            Some(current) if current.same_sources(&definition.source_uris) => {
                return Ok(RegistrationOutcome::Unchanged);
            }
            Some(_) => RegistrationOutcome::Updated,
        };

        self.write(definition).await?;
        debug!(table = %definition.qualified_name(), %outcome, "Local table definition stored");
        Ok(outcome)
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}
