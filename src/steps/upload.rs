use crate::error::{StepError, StepResult};
use crate::orchestration::{StepContext, StepExecutor, StepOutput};
use crate::state_machine::StepKind;
use crate::storage::ObjectStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Puts the converted file at the partition's object key.
///
/// Same partition, same key: a retry or a re-run overwrites the object.
pub struct UploadExecutor {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl UploadExecutor {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl StepExecutor for UploadExecutor {
    fn step_kind(&self) -> StepKind {
        StepKind::Upload
    }

    #[instrument(
        skip(self, ctx),
        fields(partition = %ctx.partition.name(), attempt = ctx.attempt, backend = self.store.backend_name())
    )]
    async fn execute(&self, ctx: &StepContext) -> StepResult<StepOutput> {
        if ctx.is_cancelled() {
            return Err(StepError::cancelled());
        }

        let key = ctx.partition.object_key();
        let remote_uri = self
            .store
            .put(&self.bucket, key, ctx.partition.local_output())
            .await?;

        debug!(%remote_uri, "Columnar file uploaded");
        Ok(StepOutput::Uploaded { remote_uri })
    }
}
