use async_trait::async_trait;
use parking_lot::Mutex;
use partition_loader::config::PipelineConfig;
use partition_loader::error::StepResult;
use partition_loader::orchestration::{
    ConversionStats, RetryPolicy, StepContext, StepExecutor, StepExecutorRegistry, StepOutput,
};
use partition_loader::warehouse::RegistrationOutcome;
use partition_loader::{Partition, PartitionCatalog, StepKind};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What a mock step does for a given attempt
pub type Script = Arc<dyn Fn(&StepContext) -> StepResult<StepOutput> + Send + Sync>;

/// One recorded executor invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub partition: String,
    pub step: StepKind,
    pub attempt: u32,
}

/// Executor that records every call, optionally sleeps, then follows its script
pub struct MockExecutor {
    kind: StepKind,
    delay: Duration,
    script: Script,
    calls: Arc<Mutex<Vec<Call>>>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

#[async_trait]
impl StepExecutor for MockExecutor {
    fn step_kind(&self) -> StepKind {
        self.kind
    }

    async fn execute(&self, ctx: &StepContext) -> StepResult<StepOutput> {
        self.calls.lock().push(Call {
            partition: ctx.partition.name().to_string(),
            step: self.kind,
            attempt: ctx.attempt,
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        (self.script)(ctx)
    }
}

/// Canned success output for a step
pub fn default_output(kind: StepKind) -> StepOutput {
    match kind {
        StepKind::Gate => StepOutput::Gate { exists: true },
        StepKind::Download => StepOutput::Downloaded {
            path: "input.csv".into(),
            bytes: 1_024,
        },
        StepKind::Convert => StepOutput::Converted(ConversionStats {
            rows: 50,
            bytes_written: 512,
        }),
        StepKind::Upload => StepOutput::Uploaded {
            remote_uri: "gs://movies/object.parquet".to_string(),
        },
        StepKind::Cleanup => StepOutput::CleanedUp {
            removed: vec![],
            warnings: vec![],
        },
        StepKind::Register => StepOutput::Registered {
            table: "movies-project.imdb_dataset.table".to_string(),
            outcome: RegistrationOutcome::Created,
        },
    }
}

/// A full set of recording executors with per-step scripts and delays
pub struct MockChain {
    scripts: HashMap<StepKind, Script>,
    delays: HashMap<StepKind, Duration>,
    calls: Arc<Mutex<Vec<Call>>>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            delays: HashMap::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_script<F>(mut self, kind: StepKind, script: F) -> Self
    where
        F: Fn(&StepContext) -> StepResult<StepOutput> + Send + Sync + 'static,
    {
        self.scripts.insert(kind, Arc::new(script));
        self
    }

    pub fn with_delay(mut self, kind: StepKind, delay: Duration) -> Self {
        self.delays.insert(kind, delay);
        self
    }

    pub fn registry(&self) -> StepExecutorRegistry {
        let mut registry = StepExecutorRegistry::new();
        for kind in StepKind::CHAIN {
            let script: Script = match self.scripts.get(&kind) {
                Some(script) => script.clone(),
                None => Arc::new(move |_: &StepContext| Ok(default_output(kind))),
            };
            registry.register(Arc::new(MockExecutor {
                kind,
                delay: self.delays.get(&kind).copied().unwrap_or_default(),
                script,
                calls: self.calls.clone(),
                in_flight: self.in_flight.clone(),
                peak_in_flight: self.peak_in_flight.clone(),
            }));
        }
        registry
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Steps invoked for one partition, in call order
    pub fn steps_for(&self, partition: &str) -> Vec<StepKind> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.partition == partition)
            .map(|call| call.step)
            .collect()
    }

    pub fn count(&self, partition: &str, step: StepKind) -> usize {
        self.steps_for(partition)
            .into_iter()
            .filter(|kind| *kind == step)
            .count()
    }

    /// Most steps observed executing at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

/// Catalog of partitions whose paths are never touched by mock executors
pub fn catalog(names: &[&str]) -> PartitionCatalog {
    PartitionCatalog::new(
        names
            .iter()
            .map(|name| {
                Partition::derive(
                    name,
                    "https://data.example.test/seeds",
                    "csv",
                    Path::new("/nonexistent/partition-loader"),
                )
            })
            .collect(),
    )
}

/// Retry policy with `max_attempts` everywhere, a fixed delay and no jitter
pub fn fixed_retry_policy(max_attempts: u32, delay: Duration) -> RetryPolicy {
    let mut retry = PipelineConfig::default().retry;
    let delay_ms = delay.as_millis() as u64;
    for settings in [
        &mut retry.gate,
        &mut retry.download,
        &mut retry.upload,
        &mut retry.register,
    ] {
        settings.max_attempts = max_attempts;
        settings.base_delay_ms = delay_ms;
        settings.max_delay_ms = delay_ms;
        settings.backoff_multiplier = 1.0;
        settings.jitter_enabled = false;
    }
    RetryPolicy::new(retry)
}
