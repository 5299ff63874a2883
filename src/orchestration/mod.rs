//! # Orchestration Engine
//!
//! Turns a catalog of partitions into executed chains and a run report.
//!
//! ## Core Components
//!
//! - **TaskGraphBuilder**: builds one linear chain per partition, all nodes Pending
//! - **StepExecutorRegistry**: dispatches each chain step to its executor by kind
//! - **RetryPolicy**: per-step attempt limits and jittered exponential backoff
//! - **ChainRunner**: executes a single chain sequentially on its worker
//! - **Scheduler**: bounded worker pool over chains, with abort and cancellation
//! - **RunReportCollector**: the only shared mutable state, fed by workers
//! - **Orchestrator**: wires all of the above from a [`PipelineConfig`]
//!
//! [`PipelineConfig`]: crate::config::PipelineConfig

pub mod chain_runner;
pub mod orchestrator;
pub mod retry_policy;
pub mod run_report;
pub mod scheduler;
pub mod step_executor;
pub mod task_graph;

pub use chain_runner::ChainRunner;
pub use orchestrator::Orchestrator;
pub use retry_policy::{GiveUpReason, RetryDecision, RetryPolicy};
pub use run_report::{FatalError, RunReport, RunReportCollector, RunSummary};
pub use scheduler::Scheduler;
pub use step_executor::{
    ConversionStats, StepContext, StepExecutor, StepExecutorRegistry, StepOutput,
};
pub use task_graph::{PartitionArtifacts, PartitionRun, StepFailure, TaskGraphBuilder, TaskNode};
