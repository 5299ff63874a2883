//! # Task Graph
//!
//! Per-partition task chains. Every partition gets the same linear chain
//! `Gate → Download → Convert → Upload → Cleanup → Register`, built up front so
//! a malformed descriptor fails the run before any I/O happens.
//!
//! A [`PartitionRun`] is owned by exactly one worker while it executes. All
//! node mutations go through the transition guards in
//! [`crate::state_machine::guards`].

use super::step_executor::StepOutput;
use crate::catalog::Partition;
use crate::error::{ErrorKind, PipelineError, Result, StepError};
use crate::state_machine::{
    check_dependencies_met, check_transition, PartitionStatus, SkipReason, StepKind,
    TaskNodeState,
};
use crate::warehouse::RegistrationOutcome;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;

/// One step of a partition chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskNode {
    pub kind: StepKind,
    pub position: usize,
    pub state: TaskNodeState,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl TaskNode {
    fn new(kind: StepKind, position: usize) -> Self {
        Self {
            kind,
            position,
            state: TaskNodeState::Pending,
            attempts: 0,
            last_error: None,
        }
    }
}

/// Where and why a partition failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepFailure {
    pub step: StepKind,
    pub kind: ErrorKind,
    pub message: String,
    pub attempts: u32,
}

/// What the chain produced on the way
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PartitionArtifacts {
    pub downloaded_bytes: Option<u64>,
    pub rows: Option<u64>,
    pub columnar_bytes: Option<u64>,
    pub remote_uri: Option<String>,
    pub table: Option<String>,
    pub registration: Option<RegistrationOutcome>,
}

/// A partition plus its chain and, once finished, its terminal status
#[derive(Debug, Clone, Serialize)]
pub struct PartitionRun {
    partition: Partition,
    nodes: Vec<TaskNode>,
    status: Option<PartitionStatus>,
    skip_reason: Option<SkipReason>,
    failure: Option<StepFailure>,
    cleanup_warnings: Vec<String>,
    artifacts: PartitionArtifacts,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl PartitionRun {
    fn new(partition: Partition) -> Self {
        let nodes = StepKind::CHAIN
            .iter()
            .enumerate()
            .map(|(position, kind)| TaskNode::new(*kind, position))
            .collect();

        Self {
            partition,
            nodes,
            status: None,
            skip_reason: None,
            failure: None,
            cleanup_warnings: Vec::new(),
            artifacts: PartitionArtifacts::default(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn name(&self) -> &str {
        self.partition.name()
    }

    pub fn nodes(&self) -> &[TaskNode] {
        &self.nodes
    }

    pub fn node(&self, kind: StepKind) -> Option<&TaskNode> {
        self.nodes.iter().find(|node| node.kind == kind)
    }

    /// Terminal status, `None` while the chain is still executing
    pub fn status(&self) -> Option<PartitionStatus> {
        self.status
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        self.skip_reason
    }

    pub fn failure(&self) -> Option<&StepFailure> {
        self.failure.as_ref()
    }

    pub fn cleanup_warnings(&self) -> &[String] {
        &self.cleanup_warnings
    }

    pub fn artifacts(&self) -> &PartitionArtifacts {
        &self.artifacts
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_some()
    }

    fn position_of(&self, kind: StepKind) -> Result<usize> {
        self.nodes
            .iter()
            .position(|node| node.kind == kind)
            .ok_or_else(|| {
                PipelineError::StateTransitionError(format!(
                    "partition '{}' has no {kind} node",
                    self.name()
                ))
            })
    }

    fn transition(&mut self, kind: StepKind, to: TaskNodeState) -> Result<&mut TaskNode> {
        let position = self.position_of(kind)?;
        let node = &mut self.nodes[position];
        check_transition(node.state, to)?;
        node.state = to;
        Ok(node)
    }

    /// Move a node to Running.
    ///
    /// Refused unless every earlier node has succeeded.
    pub fn start_node(&mut self, kind: StepKind) -> Result<()> {
        let position = self.position_of(kind)?;
        check_dependencies_met(self.nodes[..position].iter().map(|node| &node.state))?;
        self.transition(kind, TaskNodeState::Running)?;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Count one more attempt against a running node
    pub fn record_attempt(&mut self, kind: StepKind) -> Result<u32> {
        let position = self.position_of(kind)?;
        let node = &mut self.nodes[position];
        node.attempts += 1;
        Ok(node.attempts)
    }

    pub fn note_error(&mut self, kind: StepKind, error: &StepError) {
        if let Ok(position) = self.position_of(kind) {
            self.nodes[position].last_error = Some(error.to_string());
        }
    }

    pub fn complete_node(&mut self, kind: StepKind) -> Result<()> {
        self.transition(kind, TaskNodeState::Succeeded).map(|_| ())
    }

    /// Fail a running node, skip everything after it and finish as PartiallyFailed
    pub fn fail_node(&mut self, kind: StepKind, error: &StepError) -> Result<()> {
        let node = self.transition(kind, TaskNodeState::Failed)?;
        node.last_error = Some(error.to_string());
        let attempts = node.attempts;

        self.failure = Some(StepFailure {
            step: kind,
            kind: error.kind,
            message: error.message.clone(),
            attempts,
        });
        self.skip_pending();
        self.finish(PartitionStatus::PartiallyFailed);
        Ok(())
    }

    /// Skip the given running node (if any) and every pending node, then finish
    /// as Skipped
    pub fn skip_remaining(&mut self, running: Option<StepKind>, reason: SkipReason) -> Result<()> {
        if let Some(kind) = running {
            self.transition(kind, TaskNodeState::Skipped)?;
        }
        self.skip_pending();
        self.skip_reason = Some(reason);
        self.finish(PartitionStatus::Skipped);
        Ok(())
    }

    /// A partition that never reached a worker
    pub fn mark_not_dispatched(&mut self, reason: SkipReason) {
        self.skip_pending();
        self.skip_reason = Some(reason);
        self.finish(PartitionStatus::Skipped);
    }

    /// Fail whatever node was in flight when the chain was interrupted by a
    /// panic or a bookkeeping error.
    ///
    /// Bypasses the usual guards since the chain stopped mid-step.
    pub fn fail_interrupted(&mut self, kind: ErrorKind, message: impl Into<String>) {
        if self.is_finished() {
            return;
        }
        let message = message.into();
        // The running node, or the next one due if the chain stopped between nodes
        let culprit = self.nodes.iter().position(|node| !node.state.is_terminal());

        let (step, attempts) = match culprit {
            Some(position) => {
                let node = &mut self.nodes[position];
                node.state = TaskNodeState::Failed;
                node.last_error = Some(message.clone());
                (node.kind, node.attempts)
            }
            None => (StepKind::Gate, 0),
        };
        self.failure = Some(StepFailure {
            step,
            kind,
            message,
            attempts,
        });
        self.skip_reason = None;
        self.skip_pending();
        self.finish(PartitionStatus::PartiallyFailed);
    }

    pub fn add_cleanup_warning(&mut self, warning: impl Into<String>) {
        self.cleanup_warnings.push(warning.into());
    }

    /// Fold a step's output into the run's artifacts
    pub fn record_output(&mut self, output: &StepOutput) {
        match output {
            StepOutput::Gate { .. } => {}
            StepOutput::Downloaded { bytes, .. } => self.artifacts.downloaded_bytes = Some(*bytes),
            StepOutput::Converted(stats) => {
                self.artifacts.rows = Some(stats.rows);
                self.artifacts.columnar_bytes = Some(stats.bytes_written);
            }
            StepOutput::Uploaded { remote_uri } => {
                self.artifacts.remote_uri = Some(remote_uri.clone());
            }
            StepOutput::CleanedUp { warnings, .. } => {
                self.cleanup_warnings.extend(warnings.iter().cloned());
            }
            StepOutput::Registered { table, outcome } => {
                self.artifacts.table = Some(table.clone());
                self.artifacts.registration = Some(*outcome);
            }
        }
    }

    /// Stamp the terminal status. The first call wins.
    pub fn finish(&mut self, status: PartitionStatus) {
        if self.status.is_none() {
            self.status = Some(status);
            self.finished_at = Some(Utc::now());
        }
    }

    fn skip_pending(&mut self) {
        for node in &mut self.nodes {
            if node.state == TaskNodeState::Pending {
                node.state = TaskNodeState::Skipped;
            }
        }
    }
}

/// Builds partition chains from descriptors
pub struct TaskGraphBuilder;

impl TaskGraphBuilder {
    /// Build one chain with every node Pending
    pub fn build(partition: &Partition) -> Result<PartitionRun> {
        validate_partition(partition)?;
        Ok(PartitionRun::new(partition.clone()))
    }

    /// Build every chain, rejecting malformed descriptors and duplicate names
    pub fn build_all(partitions: &[Partition]) -> Result<Vec<PartitionRun>> {
        let mut seen = HashSet::new();
        partitions
            .iter()
            .map(|partition| {
                if !seen.insert(partition.name()) {
                    return Err(invalid(partition, "duplicate partition name"));
                }
                Self::build(partition)
            })
            .collect()
    }
}

fn invalid(partition: &Partition, reason: &str) -> PipelineError {
    PipelineError::InvalidPartition {
        name: partition.name().to_string(),
        reason: reason.to_string(),
    }
}

fn validate_partition(partition: &Partition) -> Result<()> {
    let name = partition.name();
    if name.is_empty() {
        return Err(invalid(partition, "name is empty"));
    }
    if name == "." || name == ".." {
        return Err(invalid(partition, "name is a relative path component"));
    }
    if name
        .chars()
        .any(|c| c == '/' || c == '\\' || c.is_whitespace() || c.is_control())
    {
        return Err(invalid(
            partition,
            "name must not contain path separators, whitespace or control characters",
        ));
    }

    if partition.source_url().is_empty() {
        return Err(invalid(partition, "source URL is empty"));
    }
    let url = reqwest::Url::parse(partition.source_url())
        .map_err(|e| invalid(partition, &format!("source URL does not parse: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(partition, "source URL must be http or https"));
    }

    if partition.table_name().is_empty() || partition.object_key().is_empty() {
        return Err(invalid(partition, "table name is empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn partition(name: &str) -> Partition {
        Partition::derive(name, "https://data.example.test", "csv", Path::new("/tmp/work"))
    }

    #[test]
    fn test_build_produces_ordered_pending_chain() {
        let run = TaskGraphBuilder::build(&partition("comedy")).unwrap();
        let kinds: Vec<StepKind> = run.nodes().iter().map(|node| node.kind).collect();
        assert_eq!(kinds, StepKind::CHAIN.to_vec());
        assert!(run
            .nodes()
            .iter()
            .all(|node| node.state == TaskNodeState::Pending));
        assert_eq!(run.status(), None);
    }

    #[test]
    fn test_build_rejects_malformed_descriptors() {
        for bad in ["", "..", "film noir", "a/b", "tab\tname"] {
            assert!(
                TaskGraphBuilder::build(&partition(bad)).is_err(),
                "{bad:?} should be rejected"
            );
        }

        let ftp = Partition::new("comedy", "ftp://example.test/comedy.csv", "in", "out.parquet", "comedy");
        assert!(TaskGraphBuilder::build(&ftp).is_err());

        let no_url = Partition::new("comedy", "", "in", "out.parquet", "comedy");
        assert!(TaskGraphBuilder::build(&no_url).is_err());
    }

    #[test]
    fn test_build_all_rejects_duplicates() {
        let result = TaskGraphBuilder::build_all(&[partition("war"), partition("war")]);
        assert!(matches!(
            result,
            Err(PipelineError::InvalidPartition { ref name, .. }) if name == "war"
        ));
    }

    #[test]
    fn test_node_cannot_start_before_predecessors_succeed() {
        let mut run = TaskGraphBuilder::build(&partition("comedy")).unwrap();
        assert!(run.start_node(StepKind::Download).is_err());

        run.start_node(StepKind::Gate).unwrap();
        run.complete_node(StepKind::Gate).unwrap();
        run.start_node(StepKind::Download).unwrap();
        assert_eq!(
            run.node(StepKind::Download).unwrap().state,
            TaskNodeState::Running
        );
        assert!(run.start_node(StepKind::Convert).is_err());
    }

    #[test]
    fn test_fail_node_skips_rest() {
        let mut run = TaskGraphBuilder::build(&partition("drama")).unwrap();
        run.start_node(StepKind::Gate).unwrap();
        run.complete_node(StepKind::Gate).unwrap();
        run.start_node(StepKind::Download).unwrap();
        run.record_attempt(StepKind::Download).unwrap();
        run.fail_node(StepKind::Download, &StepError::permanent_http("404"))
            .unwrap();

        assert_eq!(run.status(), Some(PartitionStatus::PartiallyFailed));
        let failure = run.failure().unwrap();
        assert_eq!(failure.step, StepKind::Download);
        assert_eq!(failure.kind, ErrorKind::PermanentHttp);
        assert_eq!(failure.attempts, 1);
        assert!(run.nodes()[2..]
            .iter()
            .all(|node| node.state == TaskNodeState::Skipped));
    }

    #[test]
    fn test_interrupted_chain_fails_running_node() {
        let mut run = TaskGraphBuilder::build(&partition("horror")).unwrap();
        run.start_node(StepKind::Gate).unwrap();
        run.fail_interrupted(ErrorKind::WorkerPanic, "boom");

        assert_eq!(run.status(), Some(PartitionStatus::PartiallyFailed));
        assert_eq!(run.node(StepKind::Gate).unwrap().state, TaskNodeState::Failed);
        assert_eq!(run.failure().unwrap().kind, ErrorKind::WorkerPanic);
    }

    #[test]
    fn test_interrupted_between_nodes_blames_next_node() {
        let mut run = TaskGraphBuilder::build(&partition("crime")).unwrap();
        run.start_node(StepKind::Gate).unwrap();
        run.complete_node(StepKind::Gate).unwrap();
        run.fail_interrupted(ErrorKind::Internal, "bookkeeping");

        assert_eq!(run.node(StepKind::Gate).unwrap().state, TaskNodeState::Succeeded);
        assert_eq!(run.node(StepKind::Download).unwrap().state, TaskNodeState::Failed);
        assert_eq!(run.failure().unwrap().step, StepKind::Download);
        assert!(run.nodes()[2..]
            .iter()
            .all(|node| node.state == TaskNodeState::Skipped));
    }

    #[test]
    fn test_not_dispatched_is_skipped() {
        let mut run = TaskGraphBuilder::build(&partition("music")).unwrap();
        run.mark_not_dispatched(SkipReason::RunAborted);
        assert_eq!(run.status(), Some(PartitionStatus::Skipped));
        assert_eq!(run.skip_reason(), Some(SkipReason::RunAborted));
        assert!(run
            .nodes()
            .iter()
            .all(|node| node.state == TaskNodeState::Skipped));
    }
}
