//! # Run Report
//!
//! Workers publish finished [`PartitionRun`]s into a shared
//! [`RunReportCollector`]; the collector is the only mutable state shared
//! between workers. When the scheduler drains, the collector is folded into an
//! immutable [`RunReport`] keyed by partition name.

use super::task_graph::{PartitionRun, StepFailure};
use crate::error::ErrorCategory;
use crate::state_machine::PartitionStatus;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info};
use uuid::Uuid;

/// A run-fatal failure and the partition that hit it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FatalError {
    pub partition: String,
    #[serde(flatten)]
    pub failure: StepFailure,
}

#[derive(Debug, Default)]
struct CollectorState {
    runs: Vec<PartitionRun>,
    fatal_error: Option<FatalError>,
}

/// Append-only sink for finished partition runs
#[derive(Debug)]
pub struct RunReportCollector {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    aborted: AtomicBool,
    state: Mutex<CollectorState>,
}

impl RunReportCollector {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            aborted: AtomicBool::new(false),
            state: Mutex::new(CollectorState::default()),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Record a finished run. A run-fatal failure flips the abort flag so no
    /// further partitions get dispatched.
    pub fn publish(&self, run: PartitionRun) {
        let fatal = run
            .failure()
            .filter(|failure| failure.kind.category() == ErrorCategory::RunFatal)
            .cloned();

        let mut state = self.state.lock();
        if let Some(failure) = fatal {
            error!(
                partition = %run.name(),
                step = %failure.step,
                kind = %failure.kind,
                "Run-fatal error, no further partitions will be dispatched"
            );
            self.aborted.store(true, Ordering::SeqCst);
            if state.fatal_error.is_none() {
                state.fatal_error = Some(FatalError {
                    partition: run.name().to_string(),
                    failure,
                });
            }
        }
        state.runs.push(run);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Fold everything published so far into the final report
    pub fn finish(&self, cancelled: bool) -> RunReport {
        let state = std::mem::take(&mut *self.state.lock());
        let partitions = state
            .runs
            .into_iter()
            .map(|run| (run.name().to_string(), run))
            .collect();

        let report = RunReport {
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            partitions,
            fatal_error: state.fatal_error,
            cancelled,
        };

        let summary = report.summary();
        info!(
            run_id = %report.run_id,
            completed = summary.completed,
            partially_failed = summary.partially_failed,
            skipped = summary.skipped,
            cancelled = report.cancelled,
            "Run finished"
        );
        report
    }
}

impl Default for RunReportCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Count of partitions per terminal status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub completed: usize,
    pub partially_failed: usize,
    pub skipped: usize,
}

/// Outcome of one run, one entry per partition
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub partitions: BTreeMap<String, PartitionRun>,
    pub fatal_error: Option<FatalError>,
    pub cancelled: bool,
}

impl RunReport {
    pub fn get(&self, partition: &str) -> Option<&PartitionRun> {
        self.partitions.get(partition)
    }

    pub fn status_of(&self, partition: &str) -> Option<PartitionStatus> {
        self.get(partition).and_then(PartitionRun::status)
    }

    pub fn summary(&self) -> RunSummary {
        self.partitions
            .values()
            .fold(RunSummary::default(), |mut summary, run| {
                match run.status() {
                    Some(PartitionStatus::Completed) => summary.completed += 1,
                    Some(PartitionStatus::PartiallyFailed) => summary.partially_failed += 1,
                    Some(PartitionStatus::Skipped) | None => summary.skipped += 1,
                }
                summary
            })
    }

    /// Skipped partitions do not count as failures
    pub fn is_success(&self) -> bool {
        !self.cancelled
            && self.fatal_error.is_none()
            && !self
                .partitions
                .values()
                .any(|run| run.status().is_some_and(|status| status.is_failure()))
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, run) in &self.partitions {
            let status = run
                .status()
                .map(|status| status.to_string())
                .unwrap_or_else(|| "Unfinished".to_string());
            write!(f, "{name}: {status}")?;
            if let Some(failure) = run.failure() {
                write!(f, " ({} failed: {})", failure.step, failure.kind)?;
            } else if let Some(reason) = run.skip_reason() {
                write!(f, " ({reason})")?;
            }
            writeln!(f)?;
        }

        let summary = self.summary();
        write!(
            f,
            "run {}: {} completed, {} partially failed, {} skipped",
            self.run_id, summary.completed, summary.partially_failed, summary.skipped
        )?;
        if self.cancelled {
            write!(f, ", cancelled")?;
        }
        if let Some(fatal) = &self.fatal_error {
            write!(f, ", aborted by {} on {}", fatal.failure.kind, fatal.partition)?;
        }
        Ok(())
    }
}
