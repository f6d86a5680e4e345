//! Error types for scheduler operations.

use thiserror::Error;

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Configuration failed validation.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    /// Container has no free slot for another task.
    #[error("container full: {0}")]
    ContainerFull(String),
    /// A task with the same id is already outstanding.
    #[error("duplicate task id: {0}")]
    DuplicateTaskId(String),
    /// Backend-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
    /// No usable async runtime.
    #[error("runtime error: {0}")]
    Runtime(String),
    /// The scheduler no longer accepts work.
    #[error("scheduler is shut down")]
    ShutDown,
}

impl SchedulerError {
    /// Wrap any displayable backend failure.
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Failure reported by an [`Actuator`](crate::core::Actuator) for one task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActuatorError {
    /// Execution failed; the message becomes the task's failed reason.
    #[error("{0}")]
    Failed(String),
    /// Execution stopped because its context was cancelled.
    #[error("execution cancelled")]
    Cancelled,
}

impl ActuatorError {
    /// Build a [`ActuatorError::Failed`] from any message.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

impl From<anyhow::Error> for ActuatorError {
    fn from(err: anyhow::Error) -> Self {
        Self::Failed(format!("{err:#}"))
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
