use thiserror::Error;

/// Errors raised while compiling or validating the task table.
///
/// These are fatal at startup: the engine never runs over an invalid graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Duplicate task ID: {0}")]
    DuplicateTaskId(String),

    #[error("Dependency not found: task '{task_id}' depends on '{missing_dep}'")]
    DependencyNotFound {
        task_id: String,
        missing_dep: String,
    },

    #[error("Affected output not found: task '{task_id}' lists '{missing}'")]
    AffectedOutputNotFound { task_id: String, missing: String },

    #[error("Affected output '{affected}' of task '{task_id}' is not a downstream dependent")]
    AffectedOutputNotDependent { task_id: String, affected: String },

    #[error("Circular dependency detected: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("task table is invalid:\n  - {}", .0.join("\n  - "))]
    Invalid(Vec<String>),
}

impl GraphError {
    /// Every individual problem carried by this error, one line each.
    pub fn problems(&self) -> Vec<String> {
        match self {
            Self::Invalid(problems) => problems.clone(),
            other => vec![other.to_string()],
        }
    }
}

/// Per-task execution failures.
///
/// Never fatal for the engine: the task is recorded as `Failed` and the
/// loop moves on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("task '{task_id}' failed: {message}")]
    Failed { task_id: String, message: String },

    #[error("task '{task_id}' timed out after {timeout_ms}ms")]
    Timeout { task_id: String, timeout_ms: u64 },

    #[error("task '{task_id}' produced invalid output: {message}")]
    InvalidOutput { task_id: String, message: String },

    #[error("failed to spawn executor for task '{task_id}': {message}")]
    Spawn { task_id: String, message: String },
}

impl ExecutionError {
    pub fn failed(task_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            task_id: task_id.into(),
            message: message.into(),
        }
    }

    /// Whether another attempt could succeed. A program that cannot be
    /// started will not start on the next try either.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Spawn { .. })
    }

    pub fn task_id(&self) -> &str {
        match self {
            Self::Failed { task_id, .. }
            | Self::Timeout { task_id, .. }
            | Self::InvalidOutput { task_id, .. }
            | Self::Spawn { task_id, .. } => task_id,
        }
    }
}

/// Malformed human-supplied input. Logged and ignored; the input stays in
/// place so a corrected resubmission can be picked up.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputParseError {
    #[error("input file name '{0}' does not map to a task id")]
    InvalidFileName(String),

    #[error("unsupported input extension '{extension}' for {path}")]
    UnsupportedExtension { path: String, extension: String },

    #[error("input for task '{task_id}' is not valid JSON: {message}")]
    MalformedJson { task_id: String, message: String },

    #[error("input for task '{task_id}' is empty")]
    Empty { task_id: String },

    #[error("input names unknown task '{0}'")]
    UnknownTask(String),

    #[error("failed to read input {path}: {message}")]
    Io { path: String, message: String },
}
