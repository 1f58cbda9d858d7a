use crate::delegation::TransportError;
use crate::security::Operation;
use crate::store::StoreError;
use thiserror::Error;

/// Errors surfaced by task execution.
///
/// Authorization and lookup failures are distinct variants so callers can map them
/// to different responses.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("principal {principal_id} is unauthorized to perform '{operation}'")]
    Unauthorized {
        principal_id: String,
        operation: Operation,
    },

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} {key} already exists")]
    Duplicate { kind: &'static str, key: String },

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Delegation failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Store error: {0}")]
    Store(#[source] anyhow::Error),

    #[error("Internal error: {0}")]
    Internal(#[source] anyhow::Error),
}

impl TaskError {
    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            TaskError::Unauthorized { .. } => "unauthorized",
            TaskError::NotFound { .. } => "not_found",
            TaskError::Duplicate { .. } => "duplicate",
            TaskError::Validation(_) => "validation",
            TaskError::Transport(_) => "transport",
            TaskError::Store(_) => "store",
            TaskError::Internal(_) => "internal",
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, TaskError::Unauthorized { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, TaskError::NotFound { .. })
    }
}

impl From<StoreError> for TaskError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, id } => TaskError::NotFound { kind, id },
            StoreError::Duplicate { kind, key } => TaskError::Duplicate { kind, key },
            StoreError::Backend(e) => TaskError::Store(e),
        }
    }
}
