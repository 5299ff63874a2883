//! Transition guards for task nodes.
//!
//! Nodes move `Pending → Running → Succeeded | Failed` or `Pending → Skipped`.
//! A node may only start once every earlier node in its chain has succeeded.

use super::states::TaskNodeState;
use crate::error::{PipelineError, Result};

/// Check that a single node may move from `from` to `to`
pub fn check_transition(from: TaskNodeState, to: TaskNodeState) -> Result<()> {
    let allowed = matches!(
        (from, to),
        (TaskNodeState::Pending, TaskNodeState::Running)
            | (TaskNodeState::Pending, TaskNodeState::Skipped)
            | (TaskNodeState::Running, TaskNodeState::Succeeded)
            | (TaskNodeState::Running, TaskNodeState::Failed)
            | (TaskNodeState::Running, TaskNodeState::Skipped)
    );

    if allowed {
        Ok(())
    } else {
        Err(PipelineError::StateTransitionError(format!(
            "cannot move task node from {from} to {to}"
        )))
    }
}

/// Check that all predecessors of a node have succeeded
pub fn check_dependencies_met<'a>(
    predecessors: impl IntoIterator<Item = &'a TaskNodeState>,
) -> Result<()> {
    match predecessors
        .into_iter()
        .find(|state| !state.satisfies_dependencies())
    {
        Some(state) => Err(PipelineError::StateTransitionError(format!(
            "predecessor is {state}, expected succeeded"
        ))),
        None => Ok(()),
    }
}
