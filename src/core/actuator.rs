//! Actuator trait and the per-execution context handed to it.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{ActuatorError, TaskId, TaskOutput, TaskPayload};

/// Execution context for one task run.
///
/// The scheduler cancels the token once the task timeout elapses. Actuators
/// are expected to watch it (`cancelled().await` inside a `select!`, or
/// `is_cancelled()` between steps) and return promptly.
#[derive(Debug, Clone)]
pub struct TaskContext {
    task_id: TaskId,
    cancel: CancellationToken,
    deadline: Instant,
}

impl TaskContext {
    /// Build a context for `task_id` that expires at `deadline`.
    pub fn new(task_id: impl Into<TaskId>, cancel: CancellationToken, deadline: Instant) -> Self {
        Self {
            task_id: task_id.into(),
            cancel,
            deadline,
        }
    }

    /// Identifier of the task being executed.
    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Whether the run has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the run is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// Token backing this context, for handing to nested work.
    #[must_use]
    pub const fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Instant at which the scheduler gives up on this run.
    #[must_use]
    pub const fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Executor performing the actual work of a task.
///
/// # Cancellation
///
/// Implementations must honor [`TaskContext`] cancellation. The scheduler
/// cannot abort an actuator that ignores it: the worker slot stays occupied
/// until `execute` returns, even though the task is already past its timeout.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use light_task_scheduler::core::{Actuator, ActuatorError, TaskContext, TaskOutput};
///
/// struct Sleeper;
///
/// #[async_trait]
/// impl Actuator<u64> for Sleeper {
///     async fn execute(&self, ctx: &TaskContext, millis: &u64) -> Result<TaskOutput, ActuatorError> {
///         tokio::select! {
///             () = tokio::time::sleep(std::time::Duration::from_millis(*millis)) => Ok((*millis).into()),
///             () = ctx.cancelled() => Err(ActuatorError::Cancelled),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Actuator<P>: Send + Sync + 'static
where
    P: TaskPayload,
{
    /// Execute one task payload.
    ///
    /// # Errors
    ///
    /// Any error marks the task `Failed`, with the error's message as reason.
    async fn execute(&self, ctx: &TaskContext, item: &P) -> Result<TaskOutput, ActuatorError>;
}
