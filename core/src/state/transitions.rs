//! Task status transition rules

use super::types::TaskStatus;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Invalid transition for '{task_id}' from {from} to {to} ({kind:?})")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
        kind: TransitionKind,
    },
}

/// Why a task's status is changing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// First decision for the task within the scheduling loop.
    Schedule,
    /// New version produced because real input arrived or a cascade reached it.
    Regenerate,
    /// A failed task re-opened for another attempt.
    Retry,
}

pub struct StatusTransition;

impl StatusTransition {
    /// Validate a status change.
    ///
    /// Scheduling only moves out of `NotStarted`; regeneration only replaces a
    /// decided output with another decided one; retries only leave `Failed`.
    pub fn validate(
        task_id: &str,
        from: TaskStatus,
        to: TaskStatus,
        kind: TransitionKind,
    ) -> Result<(), TransitionError> {
        let is_valid = match kind {
            TransitionKind::Schedule => from == TaskStatus::NotStarted && to.is_decided(),
            TransitionKind::Regenerate => from.is_decided() && to.is_decided(),
            TransitionKind::Retry => from == TaskStatus::Failed && to == TaskStatus::NotStarted,
        };

        if is_valid {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition {
                task_id: task_id.to_string(),
                from,
                to,
                kind,
            })
        }
    }

    /// Human-readable description used by status reports.
    pub fn status_description(status: TaskStatus) -> &'static str {
        match status {
            TaskStatus::NotStarted => "waiting for dependencies",
            TaskStatus::Completed => "completed with real data",
            TaskStatus::Skipped => "running on substitute output",
            TaskStatus::Paused => "blocked on required human input",
            TaskStatus::Failed => "executor failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_only_from_not_started() {
        assert!(StatusTransition::validate(
            "a",
            TaskStatus::NotStarted,
            TaskStatus::Skipped,
            TransitionKind::Schedule
        )
        .is_ok());

        assert!(StatusTransition::validate(
            "a",
            TaskStatus::Completed,
            TaskStatus::Completed,
            TransitionKind::Schedule
        )
        .is_err());

        assert!(StatusTransition::validate(
            "a",
            TaskStatus::NotStarted,
            TaskStatus::NotStarted,
            TransitionKind::Schedule
        )
        .is_err());
    }

    #[test]
    fn test_regenerate_requires_prior_output() {
        assert!(StatusTransition::validate(
            "a",
            TaskStatus::Paused,
            TaskStatus::Completed,
            TransitionKind::Regenerate
        )
        .is_ok());

        assert!(StatusTransition::validate(
            "a",
            TaskStatus::NotStarted,
            TaskStatus::Completed,
            TransitionKind::Regenerate
        )
        .is_err());
    }

    #[test]
    fn test_retry_only_from_failed() {
        assert!(StatusTransition::validate(
            "a",
            TaskStatus::Failed,
            TaskStatus::NotStarted,
            TransitionKind::Retry
        )
        .is_ok());

        assert!(StatusTransition::validate(
            "a",
            TaskStatus::Paused,
            TaskStatus::NotStarted,
            TransitionKind::Retry
        )
        .is_err());
    }
}
