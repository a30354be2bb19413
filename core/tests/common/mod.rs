#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reflow_core::api::{
    EngineConfig, ExecutionEngine, ExecutionError, ExecutionRequest, ExecutorOutput,
    InMemoryStateStore, PersistenceError, PlaceholderGenerator, ResolvedDependency,
    RetryStrategyPlugin, SkipStrategy, StateStore, TaskDefinition, TaskExecutor, TaskTable,
    WorkflowState,
};
use reflow_core::version::VersionHistory;
use serde_json::{json, Value};

/// Executor that records every call and can be told to fail or stall.
#[derive(Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, (usize, ExecutionError)>>,
    stalls: Mutex<HashMap<String, Duration>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl RecordingExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next `times` calls for `task_id`.
    pub fn fail(&self, task_id: &str, times: usize) {
        self.fail_with(
            task_id,
            times,
            ExecutionError::failed(task_id, "generator unavailable"),
        );
    }

    pub fn fail_with(&self, task_id: &str, times: usize, error: ExecutionError) {
        self.failures
            .lock()
            .unwrap()
            .insert(task_id.to_string(), (times, error));
    }

    pub fn stall(&self, task_id: &str, delay: Duration) {
        self.stalls
            .lock()
            .unwrap()
            .insert(task_id.to_string(), delay);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, task_id: &str) -> usize {
        self.calls().iter().filter(|c| *c == task_id).count()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskExecutor for RecordingExecutor {
    fn name(&self) -> &str {
        "recording"
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutorOutput, ExecutionError> {
        let task_id = request.task.id.clone();
        self.calls.lock().unwrap().push(task_id.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let stall = self.stalls.lock().unwrap().get(&task_id).copied();
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        } else {
            tokio::task::yield_now().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        {
            let mut failures = self.failures.lock().unwrap();
            if let Some((left, error)) = failures.get_mut(&task_id) {
                if *left > 0 {
                    *left -= 1;
                    return Err(error.clone());
                }
            }
        }

        let placeholders: Vec<&String> = request
            .dependencies
            .values()
            .filter(|d| d.is_placeholder)
            .map(|d| &d.task_id)
            .collect();
        let quality = if placeholders.is_empty() { 1.0 } else { 0.8 };

        Ok(ExecutorOutput::new(json!({
            "task": task_id,
            "placeholder_inputs": placeholders,
            "human_input": request.human_input,
        }))
        .with_quality(quality))
    }
}

pub struct EchoPlaceholder;

impl PlaceholderGenerator for EchoPlaceholder {
    fn name(&self) -> &str {
        "echo"
    }

    fn generate(
        &self,
        task: &TaskDefinition,
        strategy: SkipStrategy,
        _dependencies: &BTreeMap<String, ResolvedDependency>,
    ) -> Value {
        json!({ "placeholder": task.id, "strategy": strategy.as_str() })
    }
}

/// Retries immediately up to `max` attempts.
pub struct ImmediateRetry {
    pub max: u32,
}

impl RetryStrategyPlugin for ImmediateRetry {
    fn name(&self) -> &str {
        "immediate"
    }

    fn next_delay(&self, _attempt: u32, _error: &str) -> Option<Duration> {
        Some(Duration::ZERO)
    }

    fn max_attempts(&self) -> u32 {
        self.max
    }
}

/// In-memory store whose writes can be switched off.
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemoryStateStore,
    broken: AtomicBool,
    state_saves: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn break_writes(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    pub fn state_saves(&self) -> usize {
        self.state_saves.load(Ordering::SeqCst)
    }

    fn check(&self, document: &'static str) -> Result<(), PersistenceError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(PersistenceError::Write {
                document,
                path: "flaky".to_string(),
                message: "disk full".to_string(),
            });
        }
        Ok(())
    }
}

impl StateStore for FlakyStore {
    fn load_state(&self) -> Result<Option<WorkflowState>, PersistenceError> {
        self.inner.load_state()
    }

    fn save_state(&self, state: &WorkflowState) -> Result<(), PersistenceError> {
        self.check("workflow state")?;
        self.state_saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save_state(state)
    }

    fn load_versions(&self) -> Result<Option<VersionHistory>, PersistenceError> {
        self.inner.load_versions()
    }

    fn save_versions(&self, history: &VersionHistory) -> Result<(), PersistenceError> {
        self.check("version history")?;
        self.inner.save_versions(history)
    }
}

/// brief -> interview (human, skippable) -> draft -> review (human, required)
/// -> publish. Interview input regenerates `draft`.
pub fn report_table() -> TaskTable {
    TaskTable::new(vec![
        TaskDefinition::new("brief").in_category("research"),
        TaskDefinition::new("interview")
            .depends_on(["brief"])
            .human(true, SkipStrategy::Inference)
            .affects(["draft"])
            .in_category("research"),
        TaskDefinition::new("draft")
            .depends_on(["brief", "interview"])
            .in_category("writing"),
        TaskDefinition::new("review")
            .depends_on(["draft"])
            .human(false, SkipStrategy::Placeholder)
            .in_category("review"),
        TaskDefinition::new("publish")
            .depends_on(["review"])
            .in_category("writing"),
    ])
}

pub fn engine_with(
    table: TaskTable,
    executor: Arc<RecordingExecutor>,
    store: Arc<dyn StateStore>,
    config: EngineConfig,
) -> ExecutionEngine {
    ExecutionEngine::builder(table)
        .workflow_id("test-report")
        .config(config)
        .executor(executor)
        .placeholder(Arc::new(EchoPlaceholder))
        .store(store)
        .build()
        .expect("engine builds")
}

pub fn engine(table: TaskTable, executor: Arc<RecordingExecutor>) -> ExecutionEngine {
    engine_with(
        table,
        executor,
        Arc::new(InMemoryStateStore::new()),
        EngineConfig::default(),
    )
}
