use serde::{Deserialize, Serialize};
use std::fmt;

/// The kinds of step that make up a partition chain, in chain order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Existence check that can short-circuit the chain
    Gate,
    Download,
    Convert,
    Upload,
    /// Best-effort local artifact removal
    Cleanup,
    /// External table registration
    Register,
}

impl StepKind {
    /// Declared chain order
    pub const CHAIN: [StepKind; 6] = [
        StepKind::Gate,
        StepKind::Download,
        StepKind::Convert,
        StepKind::Upload,
        StepKind::Cleanup,
        StepKind::Register,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gate => "gate",
            Self::Download => "download",
            Self::Convert => "convert",
            Self::Upload => "upload",
            Self::Cleanup => "cleanup",
            Self::Register => "register",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}


/// Task node state within a partition chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskNodeState {
    /// Initial state when the chain is built
    #[default]
    Pending,
    /// Node is currently being executed by its worker
    Running,
    Succeeded,
    Failed,
    /// Node will never run (gate negative, upstream failure, cancellation)
    Skipped,
}

impl TaskNodeState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    /// Check if this node satisfies the dependency of the next node in the chain
    pub fn satisfies_dependencies(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl fmt::Display for TaskNodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}


/// Terminal status of a partition run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartitionStatus {
    Completed,
    PartiallyFailed,
    Skipped,
}

impl PartitionStatus {
    /// Whether this status makes the run exit with failure
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::PartiallyFailed)
    }
}

impl fmt::Display for PartitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "Completed"),
            Self::PartiallyFailed => write!(f, "PartiallyFailed"),
            Self::Skipped => write!(f, "Skipped"),
        }
    }
}

/// Why a partition ended up Skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Existence check answered "absent"
    GateNegative,
    /// Existence check kept failing; the source is assumed absent
    GateUnreachable,
    Cancelled,
    /// Never dispatched because a run-fatal error stopped the run
    RunAborted,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GateNegative => write!(f, "gate_negative"),
            Self::GateUnreachable => write!(f, "gate_unreachable"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::RunAborted => write!(f, "run_aborted"),
        }
    }
}
