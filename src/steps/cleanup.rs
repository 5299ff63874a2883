use crate::error::StepResult;
use crate::orchestration::{StepContext, StepExecutor, StepOutput};
use crate::state_machine::StepKind;
use async_trait::async_trait;
use std::io::ErrorKind as IoErrorKind;
use tracing::warn;

/// Best-effort removal of a partition's local input and output files.
///
/// Never fails: a missing file is fine, any other deletion error is logged and
/// handed back as a warning.
#[derive(Debug, Default, Clone, Copy)]
pub struct CleanupExecutor;

impl CleanupExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StepExecutor for CleanupExecutor {
    fn step_kind(&self) -> StepKind {
        StepKind::Cleanup
    }

    async fn execute(&self, ctx: &StepContext) -> StepResult<StepOutput> {
        let mut removed = Vec::new();
        let mut warnings = Vec::new();

        for path in [ctx.partition.local_input(), ctx.partition.local_output()] {
            match tokio::fs::remove_file(path).await {
                Ok(()) => removed.push(path.to_path_buf()),
                Err(e) if e.kind() == IoErrorKind::NotFound => {}
                Err(e) => {
                    warn!(
                        partition = %ctx.partition.name(),
                        path = %path.display(),
                        error = %e,
                        "Could not remove local file"
                    );
                    warnings.push(format!("remove {}: {e}", path.display()));
                }
            }
        }

        Ok(StepOutput::CleanedUp { removed, warnings })
    }
}
