//! # Configuration Check
//!
//! Loads the pipeline configuration the same way the loader does (defaults,
//! optional `PIPELINE_CONFIG` file, `PIPELINE_*` environment), validates it and
//! prints the effective values with secrets redacted. Nothing is contacted.

use partition_loader::catalog::PartitionCatalog;
use partition_loader::config::PipelineConfig;
use partition_loader::orchestration::TaskGraphBuilder;
use std::process;

fn main() {
    println!("🔍 Checking partition loader configuration");

    let config = match PipelineConfig::load() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("❌ {error}");
            process::exit(1);
        }
    };

    let catalog = PartitionCatalog::from_config(&config);
    if let Err(error) = TaskGraphBuilder::build_all(catalog.partitions()) {
        eprintln!("❌ {error}");
        process::exit(1);
    }

    match serde_json::to_string_pretty(&config.sanitized()) {
        Ok(rendered) => println!("{rendered}"),
        Err(error) => {
            eprintln!("❌ could not render configuration: {error}");
            process::exit(1);
        }
    }
    println!("✅ Configuration valid: {} partitions", catalog.len());
}
