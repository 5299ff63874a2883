//! # Step Executors
//!
//! Uniform contract for the six chain steps and the registry that dispatches
//! them by [`StepKind`].
//!
//! Executors are stateless between calls: everything partition specific comes
//! in through [`StepContext`]. Retries are the chain runner's business, an
//! executor only reports what went wrong through the [`ErrorKind`] of its
//! [`StepError`](crate::error::StepError).
//!
//! [`ErrorKind`]: crate::error::ErrorKind

use crate::catalog::Partition;
use crate::error::{PipelineError, Result, StepResult};
use crate::state_machine::StepKind;
use crate::warehouse::RegistrationOutcome;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Inputs for one attempt of one step
#[derive(Debug, Clone)]
pub struct StepContext {
    pub partition: Partition,
    /// 1-based attempt number
    pub attempt: u32,
    /// Run-level cancellation, checked at I/O boundaries
    pub cancellation: CancellationToken,
}

impl StepContext {
    pub fn new(partition: Partition, attempt: u32, cancellation: CancellationToken) -> Self {
        Self {
            partition,
            attempt,
            cancellation,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Rows and bytes produced by a conversion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConversionStats {
    pub rows: u64,
    pub bytes_written: u64,
}

/// Typed result of a successful step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutput {
    Gate {
        exists: bool,
    },
    Downloaded {
        path: PathBuf,
        bytes: u64,
    },
    Converted(ConversionStats),
    Uploaded {
        remote_uri: String,
    },
    CleanedUp {
        removed: Vec<PathBuf>,
        warnings: Vec<String>,
    },
    Registered {
        table: String,
        outcome: RegistrationOutcome,
    },
}

#[async_trait]
pub trait StepExecutor: Send + Sync + 'static {
    /// The chain step this executor implements
    fn step_kind(&self) -> StepKind;

    /// Run one attempt of the step for the partition in `ctx`
    async fn execute(&self, ctx: &StepContext) -> StepResult<StepOutput>;
}

/// Executors keyed by the step they implement
#[derive(Default, Clone)]
pub struct StepExecutorRegistry {
    executors: HashMap<StepKind, Arc<dyn StepExecutor>>,
}

impl StepExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor under its own step kind, replacing any previous one
    pub fn register(&mut self, executor: Arc<dyn StepExecutor>) -> &mut Self {
        let kind = executor.step_kind();
        if self.executors.insert(kind, executor).is_some() {
            warn!(step = %kind, "Step executor already registered, replacing");
        }
        self
    }

    pub fn get(&self, kind: StepKind) -> Result<Arc<dyn StepExecutor>> {
        self.executors
            .get(&kind)
            .cloned()
            .ok_or(PipelineError::ExecutorNotRegistered(kind))
    }

    pub fn contains(&self, kind: StepKind) -> bool {
        self.executors.contains_key(&kind)
    }

    /// Every chain step must have an executor before a run starts
    pub fn validate_complete(&self) -> Result<()> {
        match StepKind::CHAIN.iter().find(|kind| !self.contains(**kind)) {
            Some(missing) => Err(PipelineError::ExecutorNotRegistered(*missing)),
            None => {
                info!(
                    executors = self.executors.len(),
                    "Step executor registry complete"
                );
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for StepExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.executors.keys().collect();
        kinds.sort();
        f.debug_struct("StepExecutorRegistry")
            .field("executors", &kinds)
            .finish()
    }
}
