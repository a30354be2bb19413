use serde::{Deserialize, Serialize};

use crate::state::{TaskStatus, WorkflowMetrics};

/// One row of the status listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusLine {
    pub task_id: String,
    pub name: String,
    pub status: TaskStatus,
    pub version: Option<u32>,
    pub quality: f64,
    pub is_placeholder: bool,
    /// Dependencies that do not yet satisfy this task (NotStarted tasks only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub waiting_on: Vec<String>,
}

/// A Paused or Failed task and what an operator can do about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockedTask {
    pub task_id: String,
    pub status: TaskStatus,
    pub reason: String,
    pub remediation: String,
    /// Tasks downstream that cannot run until this one is resolved.
    pub blocked_dependents: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub workflow_id: String,
    pub quality: f64,
    pub metrics: WorkflowMetrics,
    pub current_version: Option<String>,
    pub tasks: Vec<TaskStatusLine>,
    pub blocked: Vec<BlockedTask>,
}

impl StatusReport {
    pub fn is_converged(&self) -> bool {
        self.blocked.is_empty() && self.tasks.iter().all(|t| t.status.is_decided())
    }
}
