#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Partition Loader
//!
//! Batch orchestration core that moves a static set of CSV partitions into
//! queryable external tables.
//!
//! ## Overview
//!
//! Every partition runs the same linear chain:
//!
//! ```text
//! Gate → Download → Convert → Upload → Cleanup → Register
//! ```
//!
//! The gate checks the source with a HEAD request; a missing source skips the
//! partition rather than failing it. Download streams the CSV to a
//! partition-scoped path, Convert rewrites it as Parquet, Upload puts it in
//! object storage, Cleanup removes the local files, and Register creates or
//! updates an external table over the uploaded objects.
//!
//! Partitions run concurrently on a bounded worker pool; within a partition the
//! chain is strictly sequential. Transient failures retry with jittered
//! exponential backoff, auth failures against storage or the warehouse stop
//! the whole run.
//!
//! ## Module Organization
//!
//! - [`catalog`] - Partition descriptors and the static catalog
//! - [`config`] - Layered configuration (defaults, file, environment)
//! - [`error`] - Pipeline and step error types
//! - [`orchestration`] - Task graphs, retry policy, scheduler and run report
//! - [`state_machine`] - Node states, partition statuses and transition guards
//! - [`steps`] - Production executors for each chain step
//! - [`storage`] - Object storage backends
//! - [`warehouse`] - External table registration backends
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use partition_loader::config::PipelineConfig;
//! use partition_loader::orchestration::Orchestrator;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::load()?;
//! let orchestrator = Orchestrator::from_config(&config)?;
//! let report = orchestrator.run().await?;
//!
//! println!("{report}");
//! std::process::exit(report.exit_code());
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod orchestration;
pub mod state_machine;
pub mod steps;
pub mod storage;
pub mod warehouse;

pub use catalog::{Partition, PartitionCatalog};
pub use config::PipelineConfig;
pub use error::{ErrorCategory, ErrorKind, PipelineError, Result, StepError, StepResult};
pub use orchestration::{Orchestrator, PartitionRun, RunReport};
pub use state_machine::{PartitionStatus, SkipReason, StepKind, TaskNodeState};
