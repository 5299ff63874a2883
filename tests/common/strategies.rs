use partition_loader::{PartitionStatus, StepKind};
use proptest::prelude::*;

/// Names that are safe to use as path components and object key prefixes
pub fn partition_name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,31}"
}

/// Names containing at least one character the builder must reject
pub fn unsafe_partition_name_strategy() -> impl Strategy<Value = String> {
    ("[a-z]{0,8}", prop::sample::select(vec!['/', '\\', ' ', '\t', '\n']), "[a-z]{0,8}")
        .prop_map(|(head, bad, tail)| format!("{head}{bad}{tail}"))
}

pub fn step_kind_strategy() -> impl Strategy<Value = StepKind> {
    prop::sample::select(StepKind::CHAIN.to_vec())
}

pub fn partition_status_strategy() -> impl Strategy<Value = PartitionStatus> {
    prop_oneof![
        Just(PartitionStatus::Completed),
        Just(PartitionStatus::PartiallyFailed),
        Just(PartitionStatus::Skipped),
    ]
}
