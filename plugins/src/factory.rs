use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use reflow_core::config::{AppConfig, ExecutorConfig, StorageConfig};
use reflow_core::executor::traits::{
    NoRetry, PlaceholderGenerator, RetryStrategyPlugin, TaskExecutor,
};
use reflow_core::executor::types::{RetryConfig, TaskTable};
use reflow_core::executor::ExecutionEngine;
use reflow_core::state::{FileStateStore, StateStore};

use crate::executor::{
    CommandTaskExecutor, ExponentialBackoffPlugin, LinearRetryPlugin, StaticTaskExecutor,
};
use crate::placeholder::DefaultPlaceholderGenerator;

pub fn build_executor(cfg: &ExecutorConfig) -> Result<Arc<dyn TaskExecutor>> {
    match cfg {
        ExecutorConfig::Static(s_cfg) => Ok(Arc::new(StaticTaskExecutor::new(s_cfg.quality))),
        ExecutorConfig::Command(c_cfg) => {
            if c_cfg.program.trim().is_empty() {
                bail!("executor.program must be set for the command executor");
            }
            Ok(Arc::new(CommandTaskExecutor::from_config(c_cfg)))
        }
    }
}

pub fn build_retry(cfg: &RetryConfig) -> Arc<dyn RetryStrategyPlugin> {
    match cfg.strategy.as_str() {
        "exponential-backoff" | "exponential" => {
            Arc::new(ExponentialBackoffPlugin::new(cfg.clone()))
        }
        "linear" => Arc::new(LinearRetryPlugin::new(cfg.clone())),
        "none" => Arc::new(NoRetry),
        other => {
            tracing::warn!(strategy = other, "unknown retry strategy, using exponential-backoff");
            Arc::new(ExponentialBackoffPlugin::new(cfg.clone()))
        }
    }
}

pub fn build_placeholder() -> Arc<dyn PlaceholderGenerator> {
    Arc::new(DefaultPlaceholderGenerator)
}

pub fn build_store(cfg: &StorageConfig) -> Arc<dyn StateStore> {
    Arc::new(FileStateStore::new(
        PathBuf::from(&cfg.state_file),
        PathBuf::from(&cfg.versions_file),
    ))
}

/// Load the task table named by the config.
pub fn load_tasks(cfg: &AppConfig) -> Result<TaskTable> {
    TaskTable::load(&cfg.tasks_file)
        .with_context(|| format!("Failed to load tasks_file {}", cfg.tasks_file))
}

/// Assemble a fully wired engine from configuration.
pub fn build_engine(cfg: &AppConfig, table: TaskTable) -> Result<ExecutionEngine> {
    let engine = ExecutionEngine::builder(table)
        .workflow_id(cfg.workflow_id.clone())
        .config(cfg.engine.clone())
        .quality(cfg.quality.clone())
        .executor(build_executor(&cfg.executor)?)
        .placeholder(build_placeholder())
        .retry_strategy(build_retry(&cfg.retry))
        .store(build_store(&cfg.storage))
        .max_versions(cfg.storage.max_versions)
        .input_directory(&cfg.input.directory)
        .build()?;
    Ok(engine)
}
