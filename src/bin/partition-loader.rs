//! Partition Loader Binary
//!
//! Loads configuration, runs every configured partition through its chain and
//! prints the run report. Ctrl-C cancels the run: in-flight steps finish
//! their current I/O and everything after them is reported as Skipped.
//!
//! Exit status is 0 only when no partition failed, no run-fatal error
//! occurred and the run was not cancelled.

use anyhow::Context;
use partition_loader::config::PipelineConfig;
use partition_loader::logging;
use partition_loader::orchestration::Orchestrator;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_structured_logging();

    let config = PipelineConfig::load().context("loading pipeline configuration")?;
    let orchestrator =
        Orchestrator::from_config(&config).context("building the orchestrator")?;

    let cancellation = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Shutdown signal received, cancelling run");
            cancellation.cancel();
        }
    });

    let report = orchestrator.run().await.context("running partitions")?;

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("serializing run report")?
    );
    eprintln!("{report}");
    info!(exit_code = report.exit_code(), "Partition loader finished");

    std::process::exit(report.exit_code());
}
