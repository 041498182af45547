use sqlgate_store::StoreError;
use sqlgate_types::TaskId;
use thiserror::Error;

use crate::collaborators::CollaboratorError;
use crate::gate::GateRejection;

/// Malformed request, rejected before any state change
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("instance {name} not found")]
    UnknownInstance { name: String },

    #[error("schema {schema} does not exist on instance {instance}")]
    UnknownSchema { instance: String, schema: String },

    #[error("malformed sql: {reason}")]
    MalformedSql { reason: String },

    #[error("sql contains no statements")]
    EmptySql,
}

/// User-visible error category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    ActionNotAllowed,
    Storage,
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    #[error("{action} not allowed on task {task_id}: {reason}")]
    ActionNotAllowed {
        task_id: TaskId,
        action: &'static str,
        reason: GateRejection,
    },

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

impl CoordinatorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoordinatorError::Validation(_) | CoordinatorError::TaskNotFound(_) => {
                ErrorKind::Validation
            }
            CoordinatorError::ActionNotAllowed { .. } => ErrorKind::ActionNotAllowed,
            CoordinatorError::Store(_) | CoordinatorError::Collaborator(_) => ErrorKind::Storage,
        }
    }

    /// Gate rejection carried by this error, if any
    pub fn rejection(&self) -> Option<GateRejection> {
        match self {
            CoordinatorError::ActionNotAllowed { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}
