//! # Orchestrator
//!
//! Top-level entry point for a run: catalog → task graphs → scheduler →
//! report. Everything that can be checked without I/O (executor coverage,
//! partition descriptors) is checked before the first partition is
//! dispatched.

use super::chain_runner::ChainRunner;
use super::retry_policy::RetryPolicy;
use super::run_report::{RunReport, RunReportCollector};
use super::scheduler::Scheduler;
use super::step_executor::StepExecutorRegistry;
use super::task_graph::TaskGraphBuilder;
use crate::catalog::PartitionCatalog;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::{http, steps, storage, warehouse};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

pub struct Orchestrator {
    catalog: PartitionCatalog,
    registry: Arc<StepExecutorRegistry>,
    retry_policy: RetryPolicy,
    max_concurrent: usize,
    cancellation: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        catalog: PartitionCatalog,
        registry: StepExecutorRegistry,
        retry_policy: RetryPolicy,
        max_concurrent: usize,
    ) -> Self {
        Self {
            catalog,
            registry: Arc::new(registry),
            retry_policy,
            max_concurrent,
            cancellation: CancellationToken::new(),
        }
    }

    /// Wire the production executors and backends from configuration
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let client = http::build_client(&config.http)?;
        let store = storage::from_config(config, client.clone())?;
        let warehouse = warehouse::from_config(config, client.clone())?;

        info!(
            storage = store.backend_name(),
            warehouse = warehouse.backend_name(),
            partitions = config.source.partitions.len(),
            "Orchestrator configured"
        );

        let registry = steps::standard_registry(config, client, store, warehouse);
        Ok(Self::new(
            PartitionCatalog::from_config(config),
            registry,
            RetryPolicy::new(config.retry.clone()),
            config.scheduler.max_concurrent_partitions,
        ))
    }

    /// Token that cancels this orchestrator's runs when triggered
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    #[instrument(skip(self), fields(partitions = self.catalog.len()))]
    pub async fn run(&self) -> Result<RunReport> {
        self.registry.validate_complete()?;
        if self.catalog.is_empty() {
            warn!("Catalog has no partitions, nothing to load");
        }
        let runs = TaskGraphBuilder::build_all(self.catalog.partitions())?;

        let collector = Arc::new(RunReportCollector::new());
        info!(run_id = %collector.run_id(), "🚀 Starting partition run");

        let runner = Arc::new(ChainRunner::new(
            self.registry.clone(),
            self.retry_policy.clone(),
            self.cancellation.clone(),
        ));
        Scheduler::new(runner, self.max_concurrent, self.cancellation.clone())
            .run(runs, collector.clone())
            .await;

        Ok(collector.finish(self.cancellation.is_cancelled()))
    }
}
