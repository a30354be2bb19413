use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::task::TaskDefinition;

/// A dependency's current output, as handed to the task executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedDependency {
    pub task_id: String,
    pub version: u32,
    pub quality: f64,
    pub is_placeholder: bool,
    pub content: serde_json::Value,
}

/// Everything an executor gets to produce one task's content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub task: TaskDefinition,
    pub dependencies: BTreeMap<String, ResolvedDependency>,
    /// Human-supplied payload, present only on the real-data path of a
    /// human-gated task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_input: Option<serde_json::Value>,
    /// Zero-based attempt counter.
    #[serde(default)]
    pub attempt: u32,
}

/// What a task executor returns on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorOutput {
    pub content: serde_json::Value,
    #[serde(default = "default_quality")]
    pub quality: f64,
    #[serde(default = "default_quality")]
    pub confidence: f64,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default)]
    pub note: Option<String>,
}

fn default_quality() -> f64 {
    1.0
}

impl ExecutorOutput {
    pub fn new(content: serde_json::Value) -> Self {
        Self {
            content,
            quality: default_quality(),
            confidence: default_quality(),
            sources: Vec::new(),
            artifacts: Vec::new(),
            note: None,
        }
    }

    pub fn with_quality(mut self, quality: f64) -> Self {
        self.quality = quality;
        self
    }
}

/// Outcome of one engine pass (`run()` or `apply_input()`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Random id correlating the log lines of one pass.
    #[serde(default)]
    pub run_id: String,
    /// Number of fixpoint iterations that decided at least one task.
    pub iterations: usize,
    /// Task executor invocations (retries not counted separately).
    pub executions: usize,
    /// Ids whose output changed, in the order they were decided.
    pub updated: Vec<String>,
    pub completed: Vec<String>,
    pub skipped: Vec<String>,
    pub paused: Vec<String>,
    pub failed: Vec<String>,
    /// Label of the document version written, if any.
    pub version: Option<String>,
    pub quality: f64,
    pub duration_ms: u64,
    /// A shutdown signal stopped the pass before it reached the fixpoint.
    #[serde(default)]
    pub interrupted: bool,
}

impl RunSummary {
    pub fn is_noop(&self) -> bool {
        self.updated.is_empty()
    }
}
