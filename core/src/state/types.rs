use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::executor::types::{SkipStrategy, TaskTable};

/// Per-task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    NotStarted,
    Completed,
    Skipped,
    Paused,
    Failed,
}

impl TaskStatus {
    /// Completed and Skipped outputs satisfy a dependency; Paused and Failed do not.
    pub fn satisfies_dependents(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }

    pub fn is_decided(&self) -> bool {
        !matches!(self, Self::NotStarted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
            Self::Paused => "paused",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputMetadata {
    /// Name of the executor or generator that produced the output.
    #[serde(default)]
    pub executor: String,
    #[serde(default)]
    pub dependencies_used: Vec<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_strategy: Option<SkipStrategy>,
}

/// Fields of a task output that the producer decides.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputDraft {
    pub status: TaskStatus,
    pub content: serde_json::Value,
    pub is_placeholder: bool,
    pub quality: f64,
    pub metadata: OutputMetadata,
}

/// One version of a task's output.
///
/// Values are never mutated once stored; a regeneration builds a new value
/// whose `previous_version` points at the old one.
///
/// On disk the chain is flattened: the current version's fields plus a
/// `history` array of older versions, newest first. Nesting one object per
/// version would hit the JSON reader's depth limit on long-lived tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutput {
    pub task_id: String,
    pub status: TaskStatus,
    pub content: serde_json::Value,
    pub is_placeholder: bool,
    pub quality: f64,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub previous_version: Option<Arc<TaskOutput>>,
    pub metadata: OutputMetadata,
}

#[derive(Serialize)]
struct OutputRecordRef<'a> {
    task_id: &'a str,
    status: TaskStatus,
    content: &'a serde_json::Value,
    is_placeholder: bool,
    quality: f64,
    version: u32,
    created_at: &'a DateTime<Utc>,
    updated_at: &'a DateTime<Utc>,
    metadata: &'a OutputMetadata,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    history: Vec<OutputRecordRef<'a>>,
}

impl<'a> OutputRecordRef<'a> {
    fn of(output: &'a TaskOutput) -> Self {
        Self {
            task_id: &output.task_id,
            status: output.status,
            content: &output.content,
            is_placeholder: output.is_placeholder,
            quality: output.quality,
            version: output.version,
            created_at: &output.created_at,
            updated_at: &output.updated_at,
            metadata: &output.metadata,
            history: Vec::new(),
        }
    }
}

#[derive(Deserialize)]
struct OutputRecord {
    task_id: String,
    status: TaskStatus,
    #[serde(default)]
    content: serde_json::Value,
    #[serde(default)]
    is_placeholder: bool,
    quality: f64,
    version: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    metadata: OutputMetadata,
    #[serde(default)]
    history: Vec<OutputRecord>,
}

impl OutputRecord {
    fn link(self, previous: Option<Arc<TaskOutput>>) -> TaskOutput {
        TaskOutput {
            task_id: self.task_id,
            status: self.status,
            content: self.content,
            is_placeholder: self.is_placeholder,
            quality: self.quality,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
            previous_version: previous,
            metadata: self.metadata,
        }
    }
}

impl Serialize for TaskOutput {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut head = OutputRecordRef::of(self);
        head.history = self.history().skip(1).map(OutputRecordRef::of).collect();
        head.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TaskOutput {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut head = OutputRecord::deserialize(deserializer)?;
        let older = std::mem::take(&mut head.history);

        // Relink oldest first so each Arc points at an already built value.
        let previous = older
            .into_iter()
            .rev()
            .fold(None, |prev, record| Some(Arc::new(record.link(prev))));
        Ok(head.link(previous))
    }
}

impl TaskOutput {
    /// Build the next link of a history chain. With no previous output this is
    /// version 1.
    pub fn from_draft(task_id: &str, draft: OutputDraft, previous: Option<&TaskOutput>) -> Self {
        let now = Utc::now();
        let (version, created_at) = match previous {
            Some(prev) => (prev.version + 1, prev.created_at),
            None => (1, now),
        };

        Self {
            task_id: task_id.to_string(),
            status: draft.status,
            content: draft.content,
            is_placeholder: draft.is_placeholder,
            quality: draft.quality.clamp(0.0, 1.0),
            version,
            created_at,
            updated_at: now,
            previous_version: previous.map(|p| Arc::new(p.clone())),
            metadata: draft.metadata,
        }
    }

    /// This output followed by every older version, newest first.
    pub fn history(&self) -> impl Iterator<Item = &TaskOutput> {
        std::iter::successors(Some(self), |o| o.previous_version.as_deref())
    }

    /// Quality this output contributes to the aggregate score.
    pub fn effective_quality(&self) -> f64 {
        if self.status.satisfies_dependents() {
            self.quality
        } else {
            0.0
        }
    }
}

/// Summary counters derived from the current outputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowMetrics {
    pub total: usize,
    pub completed: usize,
    pub skipped: usize,
    pub paused: usize,
    pub failed: usize,
    pub not_started: usize,
    pub real_data_sections: usize,
    pub placeholder_sections: usize,
}

/// The single source of truth for one workflow, persisted after every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub workflow_id: String,
    #[serde(default)]
    pub outputs: BTreeMap<String, TaskOutput>,
    #[serde(default)]
    pub pending: BTreeSet<String>,
    #[serde(default)]
    pub skipped: BTreeSet<String>,
    #[serde(default)]
    pub paused: BTreeSet<String>,
    #[serde(default)]
    pub failed: BTreeSet<String>,
    /// Accepted human payloads, replayed whenever the task re-executes.
    #[serde(default)]
    pub human_inputs: BTreeMap<String, serde_json::Value>,
    /// Aggregate quality, 0-100.
    #[serde(default)]
    pub quality_score: f64,
    #[serde(default)]
    pub metrics: WorkflowMetrics,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowState {
    pub fn new(workflow_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            workflow_id: workflow_id.into(),
            outputs: BTreeMap::new(),
            pending: BTreeSet::new(),
            skipped: BTreeSet::new(),
            paused: BTreeSet::new(),
            failed: BTreeSet::new(),
            human_inputs: BTreeMap::new(),
            quality_score: 0.0,
            metrics: WorkflowMetrics::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status_of(&self, task_id: &str) -> TaskStatus {
        self.outputs
            .get(task_id)
            .map(|o| o.status)
            .unwrap_or(TaskStatus::NotStarted)
    }

    pub fn output(&self, task_id: &str) -> Option<&TaskOutput> {
        self.outputs.get(task_id)
    }

    /// Ids that satisfy dependents (Completed and Skipped).
    pub fn completed_ids(&self) -> HashSet<String> {
        self.outputs
            .values()
            .filter(|o| o.status.satisfies_dependents())
            .map(|o| o.task_id.clone())
            .collect()
    }

    /// Ids with any decided status.
    pub fn decided_ids(&self) -> HashSet<String> {
        self.outputs.keys().cloned().collect()
    }

    /// Store a new current output for its task.
    pub fn record(&mut self, output: TaskOutput) {
        self.outputs.insert(output.task_id.clone(), output);
        self.updated_at = Utc::now();
    }

    /// Recompute the id sets and counters from `outputs`.
    ///
    /// Outputs for ids that are no longer in the table are kept but not
    /// counted.
    pub fn refresh_index(&mut self, table: &TaskTable) {
        self.pending.clear();
        self.skipped.clear();
        self.paused.clear();
        self.failed.clear();

        let mut metrics = WorkflowMetrics {
            total: table.len(),
            ..WorkflowMetrics::default()
        };

        for task in table.iter() {
            let Some(output) = self.outputs.get(&task.id) else {
                self.pending.insert(task.id.clone());
                metrics.not_started += 1;
                continue;
            };

            match output.status {
                TaskStatus::NotStarted => {
                    self.pending.insert(task.id.clone());
                    metrics.not_started += 1;
                }
                TaskStatus::Completed => metrics.completed += 1,
                TaskStatus::Skipped => {
                    self.skipped.insert(task.id.clone());
                    metrics.skipped += 1;
                }
                TaskStatus::Paused => {
                    self.paused.insert(task.id.clone());
                    metrics.paused += 1;
                }
                TaskStatus::Failed => {
                    self.failed.insert(task.id.clone());
                    metrics.failed += 1;
                }
            }

            if output.status.satisfies_dependents() {
                if output.is_placeholder {
                    metrics.placeholder_sections += 1;
                } else {
                    metrics.real_data_sections += 1;
                }
            }
        }

        self.metrics = metrics;
    }
}
