//! # Scheduler
//!
//! Bounded worker pool over partition chains. A [`Semaphore`] caps the number
//! of chains in flight; each dispatched chain runs on its own task, which owns
//! the [`PartitionRun`] until it publishes it to the collector.
//!
//! Dispatch stops when the run is cancelled or a run-fatal error has been
//! published. Partitions that never reached a worker are still reported, as
//! Skipped with the matching reason.

use super::chain_runner::ChainRunner;
use super::run_report::RunReportCollector;
use super::task_graph::PartitionRun;
use crate::error::ErrorKind;
use crate::logging::log_error;
use crate::state_machine::SkipReason;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct Scheduler {
    runner: Arc<ChainRunner>,
    max_concurrent: usize,
    cancellation: CancellationToken,
}

impl Scheduler {
    pub fn new(runner: Arc<ChainRunner>, max_concurrent: usize, cancellation: CancellationToken) -> Self {
        Self {
            runner,
            max_concurrent: max_concurrent.max(1),
            cancellation,
        }
    }

    /// Run every chain and publish each one, dispatched or not, to `collector`
    pub async fn run(&self, runs: Vec<PartitionRun>, collector: Arc<RunReportCollector>) {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut workers = JoinSet::new();

        info!(
            partitions = runs.len(),
            max_concurrent = self.max_concurrent,
            "Dispatching partitions"
        );

        for mut run in runs {
            if let Some(reason) = self.stop_reason(&collector) {
                run.mark_not_dispatched(reason);
                collector.publish(run);
                continue;
            }

            let permit = tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };

            // Re-check: the abort flag may have flipped while waiting for a slot
            let reason = self.stop_reason(&collector);
            let (Some(permit), None) = (permit, reason) else {
                run.mark_not_dispatched(reason.unwrap_or(SkipReason::Cancelled));
                collector.publish(run);
                continue;
            };

            debug!(partition = %run.name(), "Partition dispatched");
            let runner = self.runner.clone();
            let collector = collector.clone();
            workers.spawn(async move {
                let outcome = AssertUnwindSafe(runner.run(&mut run)).catch_unwind().await;
                if let Err(panic) = outcome {
                    let message = panic_message(panic.as_ref());
                    log_error("scheduler", "worker", &message, Some(run.name()));
                    run.fail_interrupted(ErrorKind::WorkerPanic, message);
                }
                collector.publish(run);
                drop(permit);
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(error) = joined {
                // Panics are caught inside the task, so this is a runtime shutdown
                warn!(error = %error, "Worker task did not complete");
            }
        }
    }

    fn stop_reason(&self, collector: &RunReportCollector) -> Option<SkipReason> {
        if collector.is_aborted() {
            Some(SkipReason::RunAborted)
        } else if self.cancellation.is_cancelled() {
            Some(SkipReason::Cancelled)
        } else {
            None
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("worker panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("worker panicked: {message}")
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_extracts_payload() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("index out of bounds");
        assert_eq!(
            panic_message(payload.as_ref()),
            "worker panicked: index out of bounds"
        );

        let payload: Box<dyn std::any::Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "worker panicked");
    }
}
