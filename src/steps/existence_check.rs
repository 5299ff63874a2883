use crate::error::{ErrorKind, StepError, StepResult};
use crate::http::{is_transient_status, transport_error};
use crate::orchestration::{StepContext, StepExecutor, StepOutput};
use crate::state_machine::StepKind;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};

/// Gate step: HEAD request against the partition's source URL.
///
/// 2xx means the source exists. 408, 429 and 5xx are transient and go back to
/// the retry policy. Anything else means the source is absent.
pub struct ExistenceCheckExecutor {
    client: reqwest::Client,
    timeout: Duration,
}

impl ExistenceCheckExecutor {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl StepExecutor for ExistenceCheckExecutor {
    fn step_kind(&self) -> StepKind {
        StepKind::Gate
    }

    #[instrument(skip(self, ctx), fields(partition = %ctx.partition.name(), attempt = ctx.attempt))]
    async fn execute(&self, ctx: &StepContext) -> StepResult<StepOutput> {
        if ctx.is_cancelled() {
            return Err(StepError::cancelled());
        }

        let url = ctx.partition.source_url();
        let operation = format!("HEAD {url}");
        let response = self
            .client
            .head(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| transport_error(&operation, &e, ErrorKind::TransientNetwork))?;

        let status = response.status();
        if is_transient_status(status) {
            return Err(StepError::transient_network(format!(
                "{operation} returned {status}"
            )));
        }

        let exists = status.is_success();
        debug!(%status, exists, "Existence check answered");
        Ok(StepOutput::Gate { exists })
    }
}
