//! Error types for the workflow engine.

use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Failed to initialize the engine (output directory unusable).
    #[error("Engine initialization failed: {0}")]
    InitFailed(String),

    /// An operation was attempted before `initialize()`.
    #[error("Engine is not initialized")]
    NotInitialized,

    /// The engine has been shut down and accepts no new work.
    #[error("Engine is shut down")]
    ShutDown,

    /// Workflow not found in the registry.
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    /// Job not found in the store.
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// The job is not in a state that allows the operation.
    #[error("Job {job_id} is not running (status: {status})")]
    InvalidState { job_id: String, status: String },

    /// Workflow execution failed.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Unparseable interval expression.
    #[error("Invalid schedule expression '{expression}': {reason}")]
    ScheduleFormat { expression: String, reason: String },

    /// Schedule not found.
    #[error("Schedule not found: {0}")]
    ScheduleNotFound(String),
}

/// Coarse classification used by callers that translate errors into
/// transport-level responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    BadRequest,
    Internal,
}

impl ErrorKind {
    /// HTTP-equivalent status code for this kind.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::BadRequest => 400,
            ErrorKind::Internal => 500,
        }
    }
}

impl EngineError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::WorkflowNotFound(_)
            | EngineError::JobNotFound(_)
            | EngineError::ScheduleNotFound(_) => ErrorKind::NotFound,
            EngineError::InvalidState { .. } | EngineError::ScheduleFormat { .. } => {
                ErrorKind::BadRequest
            }
            EngineError::InitFailed(_)
            | EngineError::NotInitialized
            | EngineError::ShutDown
            | EngineError::ExecutionFailed(_) => ErrorKind::Internal,
        }
    }
}
