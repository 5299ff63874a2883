//! # Chain Runner
//!
//! Executes one partition's chain strictly in order on the worker that owns
//! it. Each node is started through the transition guards, executed through
//! the registry, retried according to the [`RetryPolicy`], and its outcome
//! folded back into the [`PartitionRun`].
//!
//! Outcome handling per node:
//! - Gate answering "absent" skips the rest of the chain (`GateNegative`).
//! - Gate failing transiently until retries run out is treated as absent
//!   (`GateUnreachable`).
//! - Cleanup errors become warnings; the node still succeeds.
//! - Cancellation skips the in-flight node and everything after it, except
//!   that Cleanup still runs once Upload has succeeded.
//! - Any other error fails the partition at that node.

use super::retry_policy::{RetryDecision, RetryPolicy};
use super::step_executor::{StepContext, StepExecutor, StepExecutorRegistry, StepOutput};
use super::task_graph::PartitionRun;
use crate::error::{ErrorCategory, ErrorKind, Result, StepError, StepResult};
use crate::logging::{log_error, log_partition_operation, log_step_operation};
use crate::state_machine::{PartitionStatus, SkipReason, StepKind};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

pub struct ChainRunner {
    registry: Arc<StepExecutorRegistry>,
    retry_policy: RetryPolicy,
    cancellation: CancellationToken,
}

impl ChainRunner {
    pub fn new(
        registry: Arc<StepExecutorRegistry>,
        retry_policy: RetryPolicy,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            registry,
            retry_policy,
            cancellation,
        }
    }

    /// Drive the chain to a terminal status.
    ///
    /// Never returns an error: bookkeeping failures are recorded on the run
    /// as an `Internal` failure so the partition still gets reported.
    #[instrument(skip(self, run), fields(partition = %run.name()))]
    pub async fn run(&self, run: &mut PartitionRun) {
        log_partition_operation("run", run.name(), "started", None);

        if let Err(error) = self.drive(run).await {
            log_error(
                "chain_runner",
                "drive",
                &error.to_string(),
                Some(run.name()),
            );
            run.fail_interrupted(ErrorKind::Internal, error.to_string());
        }
        run.finish(PartitionStatus::Completed);

        let status = run
            .status()
            .map(|status| status.to_string())
            .unwrap_or_default();
        let details = match (run.skip_reason(), run.failure()) {
            (Some(reason), _) => Some(reason.to_string()),
            (None, Some(failure)) => Some(format!("{} failed: {}", failure.step, failure.kind)),
            (None, None) => None,
        };
        log_partition_operation("run", run.name(), &status, details.as_deref());
    }

    async fn drive(&self, run: &mut PartitionRun) -> Result<()> {
        for kind in StepKind::CHAIN {
            // Cleanup is only reached after Upload succeeded and must still
            // remove the local files of a cancelled run
            if self.cancellation.is_cancelled() && kind != StepKind::Cleanup {
                debug!(step = %kind, "Run cancelled before step");
                return run.skip_remaining(None, SkipReason::Cancelled);
            }

            let executor = self.registry.get(kind)?;
            run.start_node(kind)?;

            match self.execute_with_retry(run, kind, executor.as_ref()).await? {
                Ok(output) => {
                    run.record_output(&output);
                    run.complete_node(kind)?;
                    if output == (StepOutput::Gate { exists: false }) {
                        return run.skip_remaining(None, SkipReason::GateNegative);
                    }
                }
                Err(error) if error.category() == ErrorCategory::Cancelled => {
                    return run.skip_remaining(Some(kind), SkipReason::Cancelled);
                }
                Err(error)
                    if kind == StepKind::Gate && error.category() == ErrorCategory::Transient =>
                {
                    warn!(error = %error, "Existence check kept failing, assuming source is absent");
                    return run.skip_remaining(Some(kind), SkipReason::GateUnreachable);
                }
                Err(error) if kind == StepKind::Cleanup => {
                    warn!(error = %error, "Cleanup failed, continuing");
                    run.add_cleanup_warning(error.to_string());
                    run.complete_node(kind)?;
                }
                Err(error) => {
                    log_error("chain_runner", kind.as_str(), &error.to_string(), Some(run.name()));
                    return run.fail_node(kind, &error);
                }
            }
        }
        Ok(())
    }

    /// Attempt a node until it succeeds, the retry policy gives up, or the
    /// run is cancelled during a backoff
    async fn execute_with_retry(
        &self,
        run: &mut PartitionRun,
        kind: StepKind,
        executor: &dyn StepExecutor,
    ) -> Result<StepResult<StepOutput>> {
        loop {
            let attempt = run.record_attempt(kind)?;
            let ctx = StepContext::new(run.partition().clone(), attempt, self.cancellation.clone());
            log_step_operation("execute", run.name(), kind.as_str(), attempt, "started", None);

            let started = Instant::now();
            let error = match executor.execute(&ctx).await {
                Ok(output) => {
                    debug!(
                        step = %kind,
                        attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Step succeeded"
                    );
                    log_step_operation("execute", run.name(), kind.as_str(), attempt, "succeeded", None);
                    return Ok(Ok(output));
                }
                Err(error) => error,
            };

            run.note_error(kind, &error);
            log_step_operation(
                "execute",
                run.name(),
                kind.as_str(),
                attempt,
                "failed",
                Some(&error.to_string()),
            );

            match self.retry_policy.decide(kind, &error, attempt) {
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        step = %kind,
                        attempt,
                        max_attempts = self.retry_policy.max_attempts(kind),
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient step failure, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = self.cancellation.cancelled() => return Ok(Err(StepError::cancelled())),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::GiveUp(reason) => {
                    debug!(step = %kind, attempt, ?reason, "Giving up on step");
                    return Ok(Err(error));
                }
            }
        }
    }
}
