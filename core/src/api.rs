//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `reflow_core::api` instead of reaching into internal modules.

pub use crate::config::{
    load_default, load_from_path, AppConfig, CommandExecutorConfig, ExecutorConfig, InputConfig,
    LoggingConfig, QualityConfig, StaticExecutorConfig, StorageConfig, Weighting,
};
pub use crate::error::{
    CliError, EngineError, ExecutionError, GraphError, InputParseError, PersistenceError,
};
pub use crate::executor::traits::{
    NoRetry, PlaceholderGenerator, RetryStrategyPlugin, TaskExecutor, PLACEHOLDER_QUALITY,
};
pub use crate::executor::{
    BlockedTask, EngineConfig, ExecutionEngine, ExecutionEngineBuilder, ExecutionRequest,
    ExecutorOutput, FailedTaskPolicy, GraphStatistics, ResolvedDependency, RetryConfig,
    RunSummary, SkipStrategy, StatusReport, TaskDefinition, TaskGraph, TaskLike,
    TaskStatusLine, TaskTable,
};
pub use crate::input::{
    channel_source, parse_input_file, ChannelInputSource, DirectoryInputSource, InputEvent,
    InputSender, InputSource, InputWatcher, WatchSummary,
};
pub use crate::quality::{
    generate_quality_report, quality_score, Priority, QualityReport, Recommendation,
    SectionClass, SectionQuality,
};
pub use crate::state::{
    FileStateStore, InMemoryStateStore, OutputMetadata, StateStore, TaskOutput, TaskStatus,
    WorkflowMetrics, WorkflowState,
};
pub use crate::version::{DocumentVersion, VersionTrigger};
