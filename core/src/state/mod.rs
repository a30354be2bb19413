//! Workflow state: task outputs with their version chains, the persisted
//! document that holds them, and the rules for changing a task's status.
//!
//! Only the execution engine mutates a [`WorkflowState`]; everything else
//! receives clones.

pub mod store;
pub mod transitions;
pub mod types;

pub use store::{FileStateStore, InMemoryStateStore, StateStore};
pub use transitions::{StatusTransition, TransitionError, TransitionKind};
pub use types::{OutputDraft, OutputMetadata, TaskOutput, TaskStatus, WorkflowMetrics, WorkflowState};
