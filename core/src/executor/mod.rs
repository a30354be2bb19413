//! Adaptive scheduler for the task dependency graph (DAG).
//!
//! ```text
//! TaskTable
//!   ↓
//! TaskGraph::build() → duplicate ids, dangling dependencies, cycles
//!   ↓
//! ExecutionEngine::run()
//!   loop: ready_tasks() → transition rule per task → execute_batch() → merge → persist
//!   ↓
//! WorkflowState + DocumentVersion
//! ```
//!
//! The transition rule for a ready task: a human-gated task without input is
//! substituted (skippable) or paused (mandatory); everything else goes to the
//! task executor and ends Completed or Failed.

mod engine;
pub mod graph;
mod progress;
mod scheduler;
pub mod traits;
pub mod types;

pub use engine::{ExecutionEngine, ExecutionEngineBuilder};
pub use graph::{GraphStatistics, TaskGraph};
pub use progress::ProgressMonitor;
pub use scheduler::execute_batch;
pub use types::{
    BlockedTask, EngineConfig, ExecutionRequest, ExecutorOutput, FailedTaskPolicy,
    ResolvedDependency, RetryConfig, RunSummary, SkipStrategy, StatusReport, TaskDefinition,
    TaskLike, TaskStatusLine, TaskTable,
};
