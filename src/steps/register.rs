use crate::error::{StepError, StepResult};
use crate::orchestration::{StepContext, StepExecutor, StepOutput};
use crate::state_machine::StepKind;
use crate::storage::gcs_uri;
use crate::warehouse::{ExternalTableDefinition, SourceFormat, Warehouse};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument};

/// Creates or updates the partition's external table over its uploaded files
pub struct RegisterExecutor {
    warehouse: Arc<dyn Warehouse>,
    project_id: String,
    dataset: String,
    bucket: String,
}

impl RegisterExecutor {
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        project_id: impl Into<String>,
        dataset: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            warehouse,
            project_id: project_id.into(),
            dataset: dataset.into(),
            bucket: bucket.into(),
        }
    }

    /// Table definition for a partition: every Parquet object under its prefix
    pub fn definition_for(&self, ctx: &StepContext) -> ExternalTableDefinition {
        let pattern = format!("{}/*.parquet", ctx.partition.key_prefix());
        ExternalTableDefinition {
            project_id: self.project_id.clone(),
            dataset: self.dataset.clone(),
            table: ctx.partition.table_name().to_string(),
            source_format: SourceFormat::Parquet,
            source_uris: vec![gcs_uri(&self.bucket, &pattern)],
        }
    }
}

#[async_trait]
impl StepExecutor for RegisterExecutor {
    fn step_kind(&self) -> StepKind {
        StepKind::Register
    }

    #[instrument(
        skip(self, ctx),
        fields(partition = %ctx.partition.name(), attempt = ctx.attempt, backend = self.warehouse.backend_name())
    )]
    async fn execute(&self, ctx: &StepContext) -> StepResult<StepOutput> {
        if ctx.is_cancelled() {
            return Err(StepError::cancelled());
        }

        let definition = self.definition_for(ctx);
        let outcome = self
            .warehouse
            .create_or_update_external_table(&definition)
            .await?;

        let table = definition.qualified_name();
        info!(%table, %outcome, "External table registered");
        Ok(StepOutput::Registered { table, outcome })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Partition;
    use crate::warehouse::{LocalWarehouse, RegistrationOutcome};
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_registers_wildcard_uri_under_partition_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let warehouse = Arc::new(LocalWarehouse::new(dir.path()));
        let executor = RegisterExecutor::new(warehouse.clone(), "movies-project", "imdb_dataset", "movies");
        let partition = Partition::derive("comedy", "https://example.test", "csv", dir.path());
        let ctx = StepContext::new(partition, 1, CancellationToken::new());

        let definition = executor.definition_for(&ctx);
        assert_eq!(definition.source_uris, vec!["gs://movies/comedy/*.parquet"]);

        let first = executor.execute(&ctx).await.unwrap();
        assert_eq!(
            first,
            StepOutput::Registered {
                table: "movies-project.imdb_dataset.comedy".to_string(),
                outcome: RegistrationOutcome::Created,
            }
        );

        let second = executor.execute(&ctx).await.unwrap();
        assert!(matches!(
            second,
            StepOutput::Registered { outcome: RegistrationOutcome::Unchanged, .. }
        ));

        let stored = warehouse
            .get("movies-project", "imdb_dataset", "comedy")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, definition);
    }
}
