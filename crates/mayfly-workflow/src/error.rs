//! Error types for workflow orchestration

use crate::store::StoreError;
use mayfly_crd::{CrdError, State};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Error type for orchestrator operations
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A request field is missing or malformed
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Workflow not found
    #[error("workflow not found: {0}")]
    NotFound(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("action not found: {0}")]
    ActionNotFound(String),

    /// Report does not address the action the orchestrator expects
    #[error("report does not match current cursor: {0}")]
    CursorMismatch(String),

    /// Report would move an action along an illegal edge
    #[error("invalid state transition for action '{action}' from {from} to {to}")]
    InvalidTransition { action: String, from: State, to: State },

    /// Workflow is already finished
    #[error("workflow '{id}' is already {state}")]
    WorkflowTerminal { id: String, state: State },

    #[error("workflow '{0}' already exists")]
    AlreadyExists(String),

    #[error("workflow data is {size} bytes, limit is {max}")]
    DataTooLarge { size: usize, max: usize },

    /// Status update kept losing the optimistic concurrency race
    #[error("workflow '{0}' was modified concurrently, giving up")]
    Conflict(String),

    /// Submitted workflow failed validation or conversion
    #[error("invalid workflow: {0}")]
    InvalidWorkflow(#[from] CrdError),

    /// State store error
    #[error("state store error: {0}")]
    Store(StoreError),
}

/// Transport-neutral error class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidArgument,
    NotFound,
    FailedPrecondition,
    AlreadyExists,
    Aborted,
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::InvalidArgument => "invalid_argument",
            ErrorCode::NotFound => "not_found",
            ErrorCode::FailedPrecondition => "failed_precondition",
            ErrorCode::AlreadyExists => "already_exists",
            ErrorCode::Aborted => "aborted",
            ErrorCode::Internal => "internal",
        };
        f.write_str(s)
    }
}

impl WorkflowError {
    pub fn code(&self) -> ErrorCode {
        match self {
            WorkflowError::InvalidArgument(_)
            | WorkflowError::CursorMismatch(_)
            | WorkflowError::DataTooLarge { .. }
            | WorkflowError::InvalidWorkflow(_) => ErrorCode::InvalidArgument,
            WorkflowError::NotFound(_)
            | WorkflowError::TaskNotFound(_)
            | WorkflowError::ActionNotFound(_) => ErrorCode::NotFound,
            WorkflowError::InvalidTransition { .. } | WorkflowError::WorkflowTerminal { .. } => {
                ErrorCode::FailedPrecondition
            }
            WorkflowError::AlreadyExists(_) => ErrorCode::AlreadyExists,
            WorkflowError::Conflict(_) => ErrorCode::Aborted,
            WorkflowError::Store(_) => ErrorCode::Internal,
        }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => WorkflowError::NotFound(id),
            StoreError::AlreadyExists(id) => WorkflowError::AlreadyExists(id),
            StoreError::Conflict { id, .. } => WorkflowError::Conflict(id),
            other => WorkflowError::Store(other),
        }
    }
}

/// Result type for workflow operations
pub type Result<T> = std::result::Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WorkflowError::NotFound("wf-123".to_string());
        assert_eq!(err.to_string(), "workflow not found: wf-123");

        let err = WorkflowError::InvalidTransition {
            action: "wipe".to_string(),
            from: State::Pending,
            to: State::Success,
        };
        assert_eq!(
            err.to_string(),
            "invalid state transition for action 'wipe' from STATE_PENDING to STATE_SUCCESS"
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            WorkflowError::CursorMismatch("x".into()).code(),
            ErrorCode::InvalidArgument
        );
        assert_eq!(WorkflowError::TaskNotFound("t".into()).code(), ErrorCode::NotFound);
        assert_eq!(
            WorkflowError::WorkflowTerminal {
                id: "wf".into(),
                state: State::Failed
            }
            .code(),
            ErrorCode::FailedPrecondition
        );
        assert_eq!(WorkflowError::Conflict("wf".into()).code(), ErrorCode::Aborted);
        assert_eq!(ErrorCode::FailedPrecondition.to_string(), "failed_precondition");
    }

    #[test]
    fn test_store_error_mapping() {
        let err: WorkflowError = StoreError::NotFound("wf".into()).into();
        assert!(matches!(err, WorkflowError::NotFound(_)));

        let err: WorkflowError = StoreError::Database("disk".into()).into();
        assert_eq!(err.code(), ErrorCode::Internal);
    }
}
