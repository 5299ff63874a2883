//! Error types for the partition loader.
//!
//! Two layers:
//! - [`PipelineError`] covers construction, configuration and orchestration
//!   failures that abort a run before or outside step execution.
//! - [`StepError`] is what a step executor returns. Its [`ErrorKind`] maps to an
//!   [`ErrorCategory`] which drives retry and propagation decisions.

use crate::state_machine::StepKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Invalid partition '{name}': {reason}")]
    InvalidPartition { name: String, reason: String },
    #[error("No executor registered for step '{0}'")]
    ExecutorNotRegistered(StepKind),
    #[error("State transition error: {0}")]
    StateTransitionError(String),
    #[error("Client initialization error: {0}")]
    ClientInitialization(String),
}

impl From<config::ConfigError> for PipelineError {
    fn from(error: config::ConfigError) -> Self {
        PipelineError::ConfigurationError(error.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(error: serde_json::Error) -> Self {
        PipelineError::ConfigurationError(format!("JSON serialization error: {error}"))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
pub type StepResult<T> = std::result::Result<T, StepError>;

/// Concrete failure kinds a step can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Timeout, connection reset, truncated body, 408/429/5xx from the source
    TransientNetwork,
    /// Non-retryable HTTP status
    PermanentHttp,
    /// Input is not the expected row-oriented text format
    Format,
    /// Download exceeded the configured byte limit
    ResourceLimit,
    /// Local filesystem failure
    LocalIo,
    StorageAuth,
    StorageTransient,
    MetadataConflict,
    MetadataAuth,
    MetadataTransient,
    /// Run-level cancellation observed at an I/O boundary
    Cancelled,
    /// The worker running the partition panicked
    WorkerPanic,
    /// Chain bookkeeping rejected a transition
    Internal,
}

/// How an error kind is handled by the retry policy and the run controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// May succeed on retry
    Transient,
    /// Fails the partition immediately
    Permanent,
    /// Fails the partition and stops dispatching new partitions
    RunFatal,
    /// Not a failure of the step itself
    Cancelled,
}

impl ErrorKind {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::TransientNetwork | Self::StorageTransient | Self::MetadataTransient => {
                ErrorCategory::Transient
            }
            Self::PermanentHttp
            | Self::Format
            | Self::ResourceLimit
            | Self::LocalIo
            | Self::MetadataConflict
            | Self::WorkerPanic
            | Self::Internal => ErrorCategory::Permanent,
            Self::StorageAuth | Self::MetadataAuth => ErrorCategory::RunFatal,
            Self::Cancelled => ErrorCategory::Cancelled,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransientNetwork => "transient_network",
            Self::PermanentHttp => "permanent_http",
            Self::Format => "format",
            Self::ResourceLimit => "resource_limit",
            Self::LocalIo => "local_io",
            Self::StorageAuth => "storage_auth",
            Self::StorageTransient => "storage_transient",
            Self::MetadataConflict => "metadata_conflict",
            Self::MetadataAuth => "metadata_auth",
            Self::MetadataTransient => "metadata_transient",
            Self::Cancelled => "cancelled",
            Self::WorkerPanic => "worker_panic",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure returned by a step executor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct StepError {
    pub kind: ErrorKind,
    pub message: String,
}

impl StepError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient_network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransientNetwork, message)
    }

    pub fn permanent_http(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermanentHttp, message)
    }

    pub fn format(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Format, message)
    }

    pub fn local_io(context: &str, error: std::io::Error) -> Self {
        Self::new(ErrorKind::LocalIo, format!("{context}: {error}"))
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "run cancelled")
    }

    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    pub fn is_run_fatal(&self) -> bool {
        self.category() == ErrorCategory::RunFatal
    }
}
