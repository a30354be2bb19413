use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::executor::types::{EngineConfig, RetryConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_workflow_id")]
    pub workflow_id: String,

    /// Path of the task table (`.toml` or `.json`).
    #[serde(default = "default_tasks_file")]
    pub tasks_file: String,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub input: InputConfig,

    #[serde(default)]
    pub quality: QualityConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,
}

fn default_workflow_id() -> String {
    "report".to_string()
}

fn default_tasks_file() -> String {
    "tasks.toml".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workflow_id: default_workflow_id(),
            tasks_file: default_tasks_file(),
            logging: LoggingConfig::default(),
            engine: EngineConfig::default(),
            retry: RetryConfig::default(),
            storage: StorageConfig::default(),
            input: InputConfig::default(),
            quality: QualityConfig::default(),
            executor: ExecutorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default)]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "reflow_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses OS temp dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: false,
            level: default_logging_level(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_state_file")]
    pub state_file: String,

    #[serde(default = "default_versions_file")]
    pub versions_file: String,

    /// Document versions kept in the history; older ones are pruned.
    #[serde(default = "default_max_versions")]
    pub max_versions: usize,
}

fn default_state_file() -> String {
    ".reflow/workflow_state.json".to_string()
}

fn default_versions_file() -> String {
    ".reflow/version_history.json".to_string()
}

fn default_max_versions() -> usize {
    20
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
            versions_file: default_versions_file(),
            max_versions: default_max_versions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Directory polled for `<task_id>.json|.md|.txt` files.
    #[serde(default = "default_input_dir")]
    pub directory: String,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_input_dir() -> String {
    "inputs".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2000
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            directory: default_input_dir(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    #[default]
    Uniform,
    Category,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    #[serde(default)]
    pub weighting: Weighting,

    /// Weight per task category when `weighting = "category"`; missing
    /// categories weigh 1.0.
    #[serde(default)]
    pub category_weights: BTreeMap<String, f64>,

    /// Minimum quality for a real-data section to count as complete.
    #[serde(default = "default_complete_threshold")]
    pub complete_threshold: f64,
}

fn default_complete_threshold() -> f64 {
    0.8
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            weighting: Weighting::default(),
            category_weights: BTreeMap::new(),
            complete_threshold: default_complete_threshold(),
        }
    }
}

/// Which task executor backs the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ExecutorConfig {
    #[serde(rename = "static")]
    Static(StaticExecutorConfig),
    #[serde(rename = "command")]
    Command(CommandExecutorConfig),
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::Static(StaticExecutorConfig::default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticExecutorConfig {
    /// Quality reported for every generated section.
    #[serde(default = "default_static_quality")]
    pub quality: f64,
}

fn default_static_quality() -> f64 {
    1.0
}

impl Default for StaticExecutorConfig {
    fn default() -> Self {
        Self {
            quality: default_static_quality(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CommandExecutorConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub working_dir: Option<String>,
}
