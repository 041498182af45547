use sqlgate_store::TaskStore;
use sqlgate_types::{AggregateStatus, Task, TaskAction, TaskId};
use std::sync::Arc;
use thiserror::Error;

use crate::error::CoordinatorError;

/// Why the gate refused an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum GateRejection {
    #[error("task has committed")]
    AlreadyCommitted,

    #[error("task has rolled back")]
    AlreadyRolledBack,

    #[error("task is commit failed, not allow rollback")]
    CommitFailed,

    #[error("task commit has not finished")]
    CommitInProgress,

    #[error("task need commit first")]
    CommitNotAttempted,

    #[error("task has a commit or rollback in progress")]
    ActionInProgress,

    #[error("task has no rollback sql")]
    NothingToRollBack,
}

impl GateRejection {
    /// Stable label for metrics and logs
    pub fn reason(&self) -> &'static str {
        match self {
            GateRejection::AlreadyCommitted => "already_committed",
            GateRejection::AlreadyRolledBack => "already_rolled_back",
            GateRejection::CommitFailed => "commit_failed",
            GateRejection::CommitInProgress => "commit_in_progress",
            GateRejection::CommitNotAttempted => "commit_not_attempted",
            GateRejection::ActionInProgress => "action_in_progress",
            GateRejection::NothingToRollBack => "nothing_to_roll_back",
        }
    }
}

/// Decide whether `action` is legal for a task in the given aggregate state
pub fn evaluate(status: &AggregateStatus, action: TaskAction) -> Result<(), GateRejection> {
    match action {
        TaskAction::Inspect => Ok(()),
        TaskAction::Commit => {
            if status.has_doing_commit {
                return Err(GateRejection::AlreadyCommitted);
            }
            Ok(())
        }
        TaskAction::Rollback => {
            if status.has_doing_rollback || status.rollback_requested {
                return Err(GateRejection::AlreadyRolledBack);
            }
            if status.is_commit_failed {
                return Err(GateRejection::CommitFailed);
            }
            if status.commit_in_progress {
                return Err(GateRejection::CommitInProgress);
            }
            if !status.has_doing_commit {
                return Err(GateRejection::CommitNotAttempted);
            }
            Ok(())
        }
    }
}

/// A task may not be deleted while statements are being executed
pub fn check_delete(status: &AggregateStatus) -> Result<(), GateRejection> {
    if status.is_busy() {
        return Err(GateRejection::ActionInProgress);
    }
    Ok(())
}

/// Loads tasks fresh from the store and applies [`evaluate`]
pub struct ActionGate {
    store: Arc<dyn TaskStore>,
}

impl ActionGate {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    /// Load a live task and admit `action` against its current statement records.
    ///
    /// The caller must hold the task's lock for the result to stay valid.
    pub async fn admit(&self, id: TaskId, action: TaskAction) -> Result<Task, CoordinatorError> {
        let task = self
            .store
            .get(id)
            .await?
            .ok_or(CoordinatorError::TaskNotFound(id))?;

        evaluate(&task.aggregate(), action).map_err(|reason| CoordinatorError::ActionNotAllowed {
            task_id: id,
            action: action.as_str(),
            reason,
        })?;

        Ok(task)
    }

    /// Load a live task and check it can be deleted
    pub async fn admit_delete(&self, id: TaskId) -> Result<Task, CoordinatorError> {
        let task = self
            .store
            .get(id)
            .await?
            .ok_or(CoordinatorError::TaskNotFound(id))?;

        check_delete(&task.aggregate()).map_err(|reason| CoordinatorError::ActionNotAllowed {
            task_id: id,
            action: "delete",
            reason,
        })?;

        Ok(task)
    }
}
