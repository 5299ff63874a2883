//! State definitions for partition chains.
//!
//! Nodes are owned by a single worker, so transitions are plain synchronous
//! checks against the guards below.

pub mod guards;
pub mod states;

pub use guards::{check_dependencies_met, check_transition};
pub use states::{PartitionStatus, SkipReason, StepKind, TaskNodeState};
