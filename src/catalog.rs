//! # Partition Catalog
//!
//! The static set of partitions one run processes. Every path and object key a
//! partition touches is derived from its name, so two partitions never contend
//! for the same local file or remote object.

use crate::config::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Descriptor for one independently processed dataset slice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    name: String,
    source_url: String,
    local_input: PathBuf,
    local_output: PathBuf,
    key_prefix: String,
    object_key: String,
    table_name: String,
}

impl Partition {
    /// Assemble a descriptor from explicit parts.
    ///
    /// No validation happens here; the task graph builder rejects malformed
    /// descriptors before anything runs.
    pub fn new(
        name: impl Into<String>,
        source_url: impl Into<String>,
        local_input: impl Into<PathBuf>,
        local_output: impl Into<PathBuf>,
        table_name: impl Into<String>,
    ) -> Self {
        let local_output = local_output.into();
        let table_name = table_name.into();
        let file_name = local_output
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            name: name.into(),
            source_url: source_url.into(),
            local_input: local_input.into(),
            object_key: format!("{table_name}/{file_name}"),
            key_prefix: table_name.clone(),
            local_output,
            table_name,
        }
    }

    /// Derive a partition the way the deployment lays files out:
    /// `{base_url}/{name}.{ext}` downloaded to `{work_dir}/{name}.{ext}`,
    /// converted to `{work_dir}/{name}.parquet`, uploaded to `{name}/{name}.parquet`.
    pub fn derive(name: &str, base_url: &str, extension: &str, work_dir: &Path) -> Self {
        let source_file = format!("{name}.{extension}");
        let columnar_file = format!("{name}.parquet");

        Self::new(
            name,
            format!("{}/{source_file}", base_url.trim_end_matches('/')),
            work_dir.join(&source_file),
            work_dir.join(&columnar_file),
            name,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn local_input(&self) -> &Path {
        &self.local_input
    }

    pub fn local_output(&self) -> &Path {
        &self.local_output
    }

    /// Object key prefix all of this partition's uploads live under
    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// Object key of the uploaded columnar file
    pub fn object_key(&self) -> &str {
        &self.object_key
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

/// Static list of partition descriptors
#[derive(Debug, Clone, Default)]
pub struct PartitionCatalog {
    partitions: Vec<Partition>,
}

impl PartitionCatalog {
    pub fn new(partitions: Vec<Partition>) -> Self {
        Self { partitions }
    }

    /// Build the catalog for the configured partition names
    pub fn from_config(config: &PipelineConfig) -> Self {
        let partitions = config
            .source
            .partitions
            .iter()
            .map(|name| {
                Partition::derive(
                    name,
                    &config.source.base_url,
                    &config.source.file_extension,
                    &config.work_dir,
                )
            })
            .collect();

        Self { partitions }
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }
}
