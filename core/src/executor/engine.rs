use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Mutex};
use uuid::Uuid;

use crate::config::QualityConfig;
use crate::error::{EngineError, ExecutionError, GraphError, PersistenceError};
use crate::input::InputEvent;
use crate::quality::{generate_quality_report, quality_score, QualityReport};
use crate::state::{
    InMemoryStateStore, OutputDraft, OutputMetadata, StateStore, StatusTransition, TaskOutput,
    TaskStatus, TransitionKind, WorkflowState,
};
use crate::version::{DocumentVersion, VersionManager, VersionMeta, VersionTrigger};

use super::graph::{GraphStatistics, TaskGraph};
use super::progress::ProgressMonitor;
use super::scheduler::execute_batch;
use super::traits::{
    NoRetry, PlaceholderGenerator, RetryStrategyPlugin, TaskExecutor, PLACEHOLDER_QUALITY,
};
use super::types::{
    BlockedTask, EngineConfig, ExecutionRequest, ExecutorOutput, FailedTaskPolicy,
    ResolvedDependency, RunSummary, StatusReport, TaskDefinition, TaskStatusLine, TaskTable,
};

const DEFAULT_MAX_VERSIONS: usize = 20;

struct EngineInner {
    state: WorkflowState,
    versions: VersionManager,
}

/// What the transition rule decided for one ready task.
enum Plan {
    Substitute(BTreeMap<String, ResolvedDependency>),
    Pause,
    Execute(ExecutionRequest),
}

struct Invocation {
    result: Result<ExecutorOutput, ExecutionError>,
    attempts: u32,
    duration_ms: u64,
    dependencies_used: Vec<String>,
}

struct Decision {
    task_id: String,
    draft: OutputDraft,
    duration_ms: u64,
}

/// The adaptive scheduler.
///
/// Owns the workflow state behind one async mutex: `run`, `apply_input` and
/// `clear_failed` each hold it for their whole pass, so merges are
/// serialized. Task executors run concurrently within a batch but never touch
/// the state.
pub struct ExecutionEngine {
    table: TaskTable,
    graph: TaskGraph<TaskDefinition>,
    config: EngineConfig,
    quality: QualityConfig,
    executor: Arc<dyn TaskExecutor>,
    placeholder: Arc<dyn PlaceholderGenerator>,
    retry: Arc<dyn RetryStrategyPlugin>,
    store: Arc<dyn StateStore>,
    input_directory: Option<PathBuf>,
    inner: Mutex<EngineInner>,
    halted: AtomicBool,
}

pub struct ExecutionEngineBuilder {
    table: TaskTable,
    workflow_id: String,
    config: EngineConfig,
    quality: QualityConfig,
    executor: Option<Arc<dyn TaskExecutor>>,
    placeholder: Option<Arc<dyn PlaceholderGenerator>>,
    retry: Option<Arc<dyn RetryStrategyPlugin>>,
    store: Option<Arc<dyn StateStore>>,
    max_versions: usize,
    input_directory: Option<PathBuf>,
}

impl ExecutionEngine {
    pub fn builder(table: TaskTable) -> ExecutionEngineBuilder {
        ExecutionEngineBuilder::new(table)
    }

    /// Drive the workflow to its fixpoint.
    ///
    /// Ready tasks are decided batch by batch until an iteration finds nothing
    /// ready. A document version is written only if some task transitioned.
    pub async fn run(&self) -> Result<RunSummary, EngineError> {
        let (_never, shutdown) = watch::channel(false);
        self.run_with_shutdown(shutdown).await
    }

    /// [`run`](Self::run) that stops early once `shutdown` turns true.
    ///
    /// The signal is checked between batches: executions already in flight
    /// finish or time out, their results are merged and persisted, the
    /// version for the partial pass is written and both documents are
    /// flushed. No new batch is started.
    pub async fn run_with_shutdown(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> Result<RunSummary, EngineError> {
        self.ensure_running()?;
        let started = Instant::now();
        let mut inner = self.inner.lock().await;
        let mut summary = new_summary();

        let reopened = match self.config.failed_policy {
            FailedTaskPolicy::Retry => self.failed_to_retry(&inner.state)?,
            FailedTaskPolicy::Block => HashSet::new(),
        };

        self.converge(&mut inner, reopened, Some(&shutdown), &mut summary)
            .await?;

        let trigger = if inner.versions.current().is_none() {
            VersionTrigger::Initial
        } else {
            VersionTrigger::Rerun
        };
        self.finish_pass(&mut inner, &mut summary, trigger, started)?;

        if summary.interrupted {
            self.save_all(&inner)?;
            tracing::info!(run_id = %summary.run_id, "engine state flushed after shutdown signal");
        }
        Ok(summary)
    }

    /// Accept real data for a task and regenerate what depends on it.
    ///
    /// The task itself is re-executed on the real-data path, then each of its
    /// `affected_outputs` that already has an output is re-evaluated exactly
    /// once. The state is persisted after each regeneration. Finally the
    /// scheduling loop runs so newly unblocked tasks execute.
    pub async fn apply_input(&self, event: InputEvent) -> Result<RunSummary, EngineError> {
        self.ensure_running()?;
        let task = self
            .table
            .get(&event.task_id)
            .ok_or_else(|| EngineError::UnknownTask(event.task_id.clone()))?;

        let started = Instant::now();
        let mut inner = self.inner.lock().await;
        let mut summary = new_summary();

        tracing::info!(
            task_id = %task.id,
            source = ?event.source,
            "human input accepted"
        );
        inner
            .state
            .human_inputs
            .insert(task.id.clone(), event.payload);

        if inner.state.output(&task.id).is_some() {
            self.regenerate(&mut inner.state, task, &mut summary).await?;
        }
        self.persist_state(&mut inner.state)?;

        for affected_id in &task.affected_outputs {
            let Some(affected) = self.table.get(affected_id) else {
                continue;
            };
            if inner.state.output(affected_id).is_none() {
                tracing::debug!(task_id = %affected_id, "affected output not produced yet, left to the scheduler");
                continue;
            }

            self.regenerate(&mut inner.state, affected, &mut summary)
                .await?;
            self.persist_state(&mut inner.state)?;
        }

        self.converge(&mut inner, HashSet::new(), None, &mut summary)
            .await?;
        self.finish_pass(
            &mut inner,
            &mut summary,
            VersionTrigger::Input(task.id.clone()),
            started,
        )?;
        Ok(summary)
    }

    /// Re-open one Failed task and run the scheduling loop.
    ///
    /// This is how failed tasks are unblocked under `failed_policy = "block"`;
    /// it works under either policy.
    pub async fn clear_failed(&self, task_id: &str) -> Result<RunSummary, EngineError> {
        self.ensure_running()?;
        if !self.table.contains(task_id) {
            return Err(EngineError::UnknownTask(task_id.to_string()));
        }

        let started = Instant::now();
        let mut inner = self.inner.lock().await;
        let mut summary = new_summary();

        let status = inner.state.status_of(task_id);
        if status != TaskStatus::Failed {
            return Err(EngineError::NotFailed(task_id.to_string()));
        }
        StatusTransition::validate(
            task_id,
            status,
            TaskStatus::NotStarted,
            TransitionKind::Retry,
        )?;
        tracing::info!(task_id, "failed task cleared for another attempt");

        let reopened = HashSet::from([task_id.to_string()]);
        self.converge(&mut inner, reopened, None, &mut summary)
            .await?;
        self.finish_pass(&mut inner, &mut summary, VersionTrigger::Rerun, started)?;
        Ok(summary)
    }

    /// Snapshot of the current workflow state.
    pub async fn state(&self) -> WorkflowState {
        self.inner.lock().await.state.clone()
    }

    pub async fn quality_report(&self) -> QualityReport {
        let inner = self.inner.lock().await;
        generate_quality_report(&inner.state, &self.table, &self.quality)
    }

    /// Retained document versions, oldest first.
    pub async fn list_versions(&self) -> Vec<DocumentVersion> {
        self.inner.lock().await.versions.list().to_vec()
    }

    pub async fn current_version(&self) -> Option<String> {
        self.inner.lock().await.versions.current_version()
    }

    /// Per-task status plus remediation for every Paused or Failed task.
    pub async fn status_report(&self) -> StatusReport {
        let inner = self.inner.lock().await;
        let state = &inner.state;
        let completed = state.completed_ids();

        let mut tasks = Vec::with_capacity(self.table.len());
        let mut blocked = Vec::new();

        for task in self.table.iter() {
            let output = state.output(&task.id);
            let status = state.status_of(&task.id);

            let waiting_on = if status == TaskStatus::NotStarted {
                task.dependencies
                    .iter()
                    .filter(|d| !completed.contains(*d))
                    .cloned()
                    .collect()
            } else {
                Vec::new()
            };

            tasks.push(TaskStatusLine {
                task_id: task.id.clone(),
                name: task.display_name().to_string(),
                status,
                version: output.map(|o| o.version),
                quality: output.map(|o| o.quality).unwrap_or(0.0),
                is_placeholder: output.map(|o| o.is_placeholder).unwrap_or(false),
                waiting_on,
            });

            let (reason, remediation) = match status {
                TaskStatus::Paused => (
                    StatusTransition::status_description(status).to_string(),
                    self.input_remediation(&task.id),
                ),
                TaskStatus::Failed => (
                    output
                        .and_then(|o| o.metadata.error.clone())
                        .unwrap_or_else(|| "executor failed".to_string()),
                    self.failure_remediation(&task.id),
                ),
                _ => continue,
            };

            blocked.push(BlockedTask {
                task_id: task.id.clone(),
                status,
                reason,
                remediation,
                blocked_dependents: self.graph.transitive_dependents(&task.id).len(),
            });
        }

        StatusReport {
            workflow_id: state.workflow_id.clone(),
            quality: state.quality_score,
            metrics: state.metrics.clone(),
            current_version: inner.versions.current_version(),
            tasks,
            blocked,
        }
    }

    /// Rewrite both persisted documents.
    pub async fn flush(&self) -> Result<(), EngineError> {
        self.ensure_running()?;
        let inner = self.inner.lock().await;
        self.save_all(&inner)?;
        tracing::debug!("engine state flushed");
        Ok(())
    }

    pub fn statistics(&self) -> Result<GraphStatistics, EngineError> {
        Ok(self.graph.statistics()?)
    }

    /// Execution batches of the full graph, in definition order.
    pub fn execution_order(&self) -> Result<Vec<Vec<String>>, EngineError> {
        Ok(self.graph.topological_sort()?)
    }

    pub fn table(&self) -> &TaskTable {
        &self.table
    }

    pub fn graph(&self) -> &TaskGraph<TaskDefinition> {
        &self.graph
    }

    pub fn input_directory(&self) -> Option<&Path> {
        self.input_directory.as_deref()
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> Result<(), EngineError> {
        if self.is_halted() {
            Err(EngineError::Halted)
        } else {
            Ok(())
        }
    }

    fn halt(&self, err: PersistenceError) -> EngineError {
        self.halted.store(true, Ordering::SeqCst);
        tracing::error!(error = %err, "persistence failed, engine halted");
        EngineError::Persistence(err)
    }

    /// Failed tasks to re-open for this run, in definition order.
    fn failed_to_retry(&self, state: &WorkflowState) -> Result<HashSet<String>, EngineError> {
        let mut reopened = HashSet::new();
        for task in self.table.iter() {
            let status = state.status_of(&task.id);
            if status != TaskStatus::Failed {
                continue;
            }
            StatusTransition::validate(
                &task.id,
                status,
                TaskStatus::NotStarted,
                TransitionKind::Retry,
            )?;
            tracing::info!(task_id = %task.id, "retrying previously failed task");
            reopened.insert(task.id.clone());
        }
        Ok(reopened)
    }

    /// The scheduling loop.
    ///
    /// Every non-empty iteration decides at least one previously undecided
    /// task, so it ends after at most N+1 iterations. `reopened` tasks are
    /// Failed ones treated as undecided for this pass. A raised `shutdown`
    /// flag ends the loop before the next batch starts.
    async fn converge(
        &self,
        inner: &mut EngineInner,
        mut reopened: HashSet<String>,
        shutdown: Option<&watch::Receiver<bool>>,
        summary: &mut RunSummary,
    ) -> Result<(), EngineError> {
        let total = self.table.len();
        let undecided = self
            .table
            .iter()
            .filter(|t| !inner.state.status_of(&t.id).is_decided() || reopened.contains(&t.id))
            .count();
        let mut progress = ProgressMonitor::new(undecided, self.config.progress_bar);
        let mut iterations = 0usize;

        loop {
            let completed = inner.state.completed_ids();
            let mut decided = inner.state.decided_ids();
            for id in &reopened {
                decided.remove(id);
            }

            let ready = self.graph.ready_tasks(&completed, &decided);
            if ready.is_empty() {
                break;
            }
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                tracing::warn!(
                    iteration = iterations,
                    waiting = ready.len(),
                    "shutdown requested, no further batches started"
                );
                summary.interrupted = true;
                break;
            }

            iterations += 1;
            debug_assert!(
                iterations <= total + 1,
                "scheduling loop exceeded {} iterations",
                total + 1
            );

            tracing::debug!(iteration = iterations, ready = ?ready, "batch ready");
            progress.update_iteration(iterations, ready.len());
            for id in &ready {
                progress.add_task(id);
            }

            let decisions = self.decide_batch(&inner.state, &ready, summary).await?;

            for decision in decisions {
                let was_reopened = reopened.remove(&decision.task_id);
                progress.complete_task(
                    &decision.task_id,
                    decision.draft.status,
                    decision.duration_ms,
                );
                self.commit(
                    &mut inner.state,
                    &decision.task_id,
                    decision.draft,
                    TransitionKind::Schedule,
                    was_reopened,
                    summary,
                )?;
            }

            self.persist_state(&mut inner.state)?;
        }

        summary.iterations += iterations;
        progress.finish(inner.state.paused.len() + inner.state.failed.len());
        Ok(())
    }

    /// Re-evaluate one already-decided task through the transition rule and
    /// store the result as its next version.
    async fn regenerate(
        &self,
        state: &mut WorkflowState,
        task: &TaskDefinition,
        summary: &mut RunSummary,
    ) -> Result<(), EngineError> {
        let ids = [task.id.clone()];
        let decisions = self.decide_batch(state, &ids, summary).await?;

        for decision in decisions {
            self.commit(
                state,
                &decision.task_id,
                decision.draft,
                TransitionKind::Regenerate,
                false,
                summary,
            )?;
        }
        Ok(())
    }

    /// Apply the transition rule to every id in `ids`, running executor-bound
    /// tasks concurrently. Decisions come back in the order of `ids`.
    async fn decide_batch(
        &self,
        state: &WorkflowState,
        ids: &[String],
        summary: &mut RunSummary,
    ) -> Result<Vec<Decision>, EngineError> {
        let mut decided: BTreeMap<String, Decision> = BTreeMap::new();
        let mut requests = Vec::new();

        for id in ids {
            let Some(task) = self.table.get(id) else {
                continue;
            };

            match self.plan(state, task) {
                Plan::Substitute(dependencies) => {
                    decided.insert(
                        id.clone(),
                        Decision {
                            task_id: id.clone(),
                            draft: self.substitute_draft(task, &dependencies),
                            duration_ms: 0,
                        },
                    );
                }
                Plan::Pause => {
                    decided.insert(
                        id.clone(),
                        Decision {
                            task_id: id.clone(),
                            draft: paused_draft(),
                            duration_ms: 0,
                        },
                    );
                }
                Plan::Execute(request) => requests.push((id.clone(), request)),
            }
        }

        summary.executions += requests.len();

        let engine = self;
        let results = execute_batch(requests, self.config.max_concurrency, move |_, request| {
            engine.invoke(request)
        })
        .await?;

        for (task_id, invocation) in results {
            let duration_ms = invocation.duration_ms;
            decided.insert(
                task_id.clone(),
                Decision {
                    draft: self.executed_draft(&task_id, invocation),
                    task_id,
                    duration_ms,
                },
            );
        }

        Ok(ids.iter().filter_map(|id| decided.remove(id)).collect())
    }

    /// The transition rule for one task, given the current state.
    fn plan(&self, state: &WorkflowState, task: &TaskDefinition) -> Plan {
        let dependencies = resolve_dependencies(state, task);
        let human_input = state.human_inputs.get(&task.id).cloned();

        if task.human_required && human_input.is_none() {
            return if task.can_skip {
                Plan::Substitute(dependencies)
            } else {
                Plan::Pause
            };
        }

        Plan::Execute(ExecutionRequest {
            task: task.clone(),
            dependencies,
            human_input,
            attempt: 0,
        })
    }

    /// One executor call wrapped in the timeout and retry strategy.
    async fn invoke(&self, mut request: ExecutionRequest) -> Invocation {
        let started = Instant::now();
        let timeout_ms = self.config.task_timeout_ms;
        let timeout = Duration::from_millis(timeout_ms);
        let task_id = request.task.id.clone();
        let dependencies_used: Vec<String> = request.dependencies.keys().cloned().collect();
        let mut attempts = 0u32;

        let result = loop {
            request.attempt = attempts;
            let outcome = match tokio::time::timeout(timeout, self.executor.execute(&request)).await
            {
                Ok(res) => res.and_then(|output| check_output(&task_id, output)),
                Err(_) => Err(ExecutionError::Timeout {
                    task_id: task_id.clone(),
                    timeout_ms,
                }),
            };
            attempts += 1;

            let err = match outcome {
                Ok(output) => break Ok(output),
                Err(err) => err,
            };

            let message = err.to_string();
            if !err.is_retryable() || !self.retry.should_retry(attempts, &message) {
                break Err(err);
            }
            let Some(delay) = self.retry.next_delay(attempts, &message) else {
                break Err(err);
            };

            tracing::warn!(
                task_id = %task_id,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %message,
                "task execution failed, retrying"
            );
            tokio::time::sleep(delay).await;
        };

        Invocation {
            result,
            attempts,
            duration_ms: started.elapsed().as_millis() as u64,
            dependencies_used,
        }
    }

    fn executed_draft(&self, task_id: &str, invocation: Invocation) -> OutputDraft {
        let mut metadata = OutputMetadata {
            executor: self.executor.name().to_string(),
            dependencies_used: invocation.dependencies_used,
            attempts: invocation.attempts,
            ..OutputMetadata::default()
        };

        match invocation.result {
            Ok(output) => {
                metadata.confidence = output.confidence;
                metadata.sources = output.sources;
                metadata.artifacts = output.artifacts;
                metadata.note = output.note;
                OutputDraft {
                    status: TaskStatus::Completed,
                    content: output.content,
                    is_placeholder: false,
                    quality: output.quality,
                    metadata,
                }
            }
            Err(err) => {
                tracing::warn!(
                    task_id,
                    attempts = invocation.attempts,
                    error = %err,
                    "task failed"
                );
                metadata.error = Some(err.to_string());
                OutputDraft {
                    status: TaskStatus::Failed,
                    content: serde_json::Value::Null,
                    is_placeholder: false,
                    quality: 0.0,
                    metadata,
                }
            }
        }
    }

    fn substitute_draft(
        &self,
        task: &TaskDefinition,
        dependencies: &BTreeMap<String, ResolvedDependency>,
    ) -> OutputDraft {
        let strategy = task.skip_strategy;
        let content = self.placeholder.generate(task, strategy, dependencies);

        OutputDraft {
            status: TaskStatus::Skipped,
            content,
            is_placeholder: true,
            quality: PLACEHOLDER_QUALITY,
            metadata: OutputMetadata {
                executor: self.placeholder.name().to_string(),
                dependencies_used: dependencies.keys().cloned().collect(),
                confidence: PLACEHOLDER_QUALITY,
                note: Some(format!("substituted by {} strategy", strategy.as_str())),
                skip_strategy: Some(strategy),
                ..OutputMetadata::default()
            },
        }
    }

    /// Validate and record one decision as the task's next output.
    fn commit(
        &self,
        state: &mut WorkflowState,
        task_id: &str,
        draft: OutputDraft,
        kind: TransitionKind,
        reopened: bool,
        summary: &mut RunSummary,
    ) -> Result<(), EngineError> {
        let previous = state.output(task_id).cloned();
        let from = match (&previous, reopened) {
            (Some(prev), false) => prev.status,
            _ => TaskStatus::NotStarted,
        };
        StatusTransition::validate(task_id, from, draft.status, kind)?;

        let output = TaskOutput::from_draft(task_id, draft, previous.as_ref());
        tracing::info!(
            task_id,
            status = %output.status,
            version = output.version,
            quality = output.quality,
            placeholder = output.is_placeholder,
            "task output recorded"
        );

        tally(summary, task_id, output.status);
        state.record(output);
        Ok(())
    }

    fn save_all(&self, inner: &EngineInner) -> Result<(), EngineError> {
        self.store
            .save_state(&inner.state)
            .map_err(|e| self.halt(e))?;
        self.store
            .save_versions(inner.versions.history())
            .map_err(|e| self.halt(e))
    }

    fn persist_state(&self, state: &mut WorkflowState) -> Result<(), EngineError> {
        state.refresh_index(&self.table);
        state.quality_score = quality_score(state, &self.table, &self.quality);
        self.store.save_state(state).map_err(|e| self.halt(e))
    }

    fn finish_pass(
        &self,
        inner: &mut EngineInner,
        summary: &mut RunSummary,
        trigger: VersionTrigger,
        started: Instant,
    ) -> Result<(), EngineError> {
        summary.quality = inner.state.quality_score;

        if !summary.updated.is_empty() {
            let version = inner.versions.create_version(VersionMeta {
                trigger,
                quality: inner.state.quality_score,
                updated_sections: summary.updated.clone(),
            });
            self.store
                .save_versions(inner.versions.history())
                .map_err(|e| self.halt(e))?;
            summary.version = Some(version.label);
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            run_id = %summary.run_id,
            iterations = summary.iterations,
            executions = summary.executions,
            updated = summary.updated.len(),
            paused = inner.state.metrics.paused,
            failed = inner.state.metrics.failed,
            quality = summary.quality,
            version = ?summary.version,
            "workflow pass finished"
        );
        Ok(())
    }

    fn input_remediation(&self, task_id: &str) -> String {
        match &self.input_directory {
            Some(dir) => format!(
                "place {} (or .md / .txt) with the required input",
                dir.join(format!("{task_id}.json")).display()
            ),
            None => format!("submit the required input with `reflow input {task_id} <file>`"),
        }
    }

    fn failure_remediation(&self, task_id: &str) -> String {
        match self.config.failed_policy {
            FailedTaskPolicy::Retry => {
                "fix the executor problem, then run again (failed tasks are retried on every run)"
                    .to_string()
            }
            FailedTaskPolicy::Block => {
                format!("fix the executor problem, then run `reflow clear {task_id}`")
            }
        }
    }
}

impl ExecutionEngineBuilder {
    pub fn new(table: TaskTable) -> Self {
        Self {
            table,
            workflow_id: "report".to_string(),
            config: EngineConfig::default(),
            quality: QualityConfig::default(),
            executor: None,
            placeholder: None,
            retry: None,
            store: None,
            max_versions: DEFAULT_MAX_VERSIONS,
            input_directory: None,
        }
    }

    pub fn workflow_id(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = workflow_id.into();
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn quality(mut self, quality: QualityConfig) -> Self {
        self.quality = quality;
        self
    }

    pub fn executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn placeholder(mut self, placeholder: Arc<dyn PlaceholderGenerator>) -> Self {
        self.placeholder = Some(placeholder);
        self
    }

    pub fn retry_strategy(mut self, strategy: Arc<dyn RetryStrategyPlugin>) -> Self {
        self.retry = Some(strategy);
        self
    }

    pub fn store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn max_versions(mut self, max_versions: usize) -> Self {
        self.max_versions = max_versions;
        self
    }

    /// Directory named in remediation hints for paused tasks.
    pub fn input_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.input_directory = Some(dir.into());
        self
    }

    /// Validate the task table and restore persisted state.
    ///
    /// Fails with every table problem at once, or if a persisted document
    /// cannot be read.
    pub fn build(self) -> Result<ExecutionEngine, EngineError> {
        let problems = TaskGraph::validate_dependencies(&self.table.tasks);
        if !problems.is_empty() {
            return Err(GraphError::Invalid(problems).into());
        }
        let graph = TaskGraph::build(&self.table.tasks)?;

        let executor = self
            .executor
            .ok_or_else(|| EngineError::Config("no task executor configured".into()))?;
        let placeholder = self
            .placeholder
            .ok_or_else(|| EngineError::Config("no placeholder generator configured".into()))?;
        let retry = self.retry.unwrap_or_else(|| Arc::new(NoRetry));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryStateStore::new()));

        let restored = store.load_state()?;
        let resumed = restored.is_some();
        let mut state = restored.unwrap_or_else(|| WorkflowState::new(&self.workflow_id));
        state.refresh_index(&self.table);
        state.quality_score = quality_score(&state, &self.table, &self.quality);

        let history = store.load_versions()?.unwrap_or_default();
        let versions = VersionManager::from_history(history, self.max_versions);

        tracing::info!(
            workflow_id = %state.workflow_id,
            tasks = self.table.len(),
            resumed,
            executor = executor.name(),
            retry = retry.name(),
            "execution engine ready"
        );

        Ok(ExecutionEngine {
            table: self.table,
            graph,
            config: self.config,
            quality: self.quality,
            executor,
            placeholder,
            retry,
            store,
            input_directory: self.input_directory,
            inner: Mutex::new(EngineInner { state, versions }),
            halted: AtomicBool::new(false),
        })
    }
}

/// Current outputs of a task's dependencies.
fn resolve_dependencies(
    state: &WorkflowState,
    task: &TaskDefinition,
) -> BTreeMap<String, ResolvedDependency> {
    task.dependencies
        .iter()
        .filter_map(|dep| state.output(dep))
        .map(|output| {
            (
                output.task_id.clone(),
                ResolvedDependency {
                    task_id: output.task_id.clone(),
                    version: output.version,
                    quality: output.quality,
                    is_placeholder: output.is_placeholder,
                    content: output.content.clone(),
                },
            )
        })
        .collect()
}

fn check_output(task_id: &str, output: ExecutorOutput) -> Result<ExecutorOutput, ExecutionError> {
    if !output.quality.is_finite() || !(0.0..=1.0).contains(&output.quality) {
        return Err(ExecutionError::InvalidOutput {
            task_id: task_id.to_string(),
            message: format!("quality {} is outside 0.0..=1.0", output.quality),
        });
    }
    Ok(output)
}

fn paused_draft() -> OutputDraft {
    OutputDraft {
        status: TaskStatus::Paused,
        content: serde_json::Value::Null,
        is_placeholder: false,
        quality: 0.0,
        metadata: OutputMetadata {
            note: Some("awaiting required human input".to_string()),
            ..OutputMetadata::default()
        },
    }
}

fn new_summary() -> RunSummary {
    RunSummary {
        run_id: Uuid::new_v4().to_string(),
        ..RunSummary::default()
    }
}

fn tally(summary: &mut RunSummary, task_id: &str, status: TaskStatus) {
    let id = task_id.to_string();
    let bucket = match status {
        TaskStatus::Completed => &mut summary.completed,
        TaskStatus::Skipped => &mut summary.skipped,
        TaskStatus::Paused => &mut summary.paused,
        TaskStatus::Failed => &mut summary.failed,
        TaskStatus::NotStarted => return,
    };
    bucket.push(id.clone());

    if !summary.updated.contains(&id) {
        summary.updated.push(id);
    }
}
