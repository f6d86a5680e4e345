//! Container and persistencer contracts.

use async_trait::async_trait;

use super::{SchedulerError, StatusUpdate, Task, TaskPayload};

/// Pluggable source of pending tasks and sink of status updates.
///
/// Implementations own their locking or transactional claim semantics: the
/// scheduler calls `push`, `poll` and `update_status` concurrently and relies
/// on the container never handing out the same unresolved task twice.
#[async_trait]
pub trait Container<P>: Send + Sync + 'static
where
    P: TaskPayload,
{
    /// Store a new pending task.
    ///
    /// # Errors
    ///
    /// `ContainerFull` when out of capacity, `DuplicateTaskId` when the id is
    /// already held unresolved, or a backend error.
    async fn push(&self, task: Task<P>) -> Result<(), SchedulerError>;

    /// Claim up to `max_count` pending tasks.
    ///
    /// May wait briefly for work. Returns an empty vector, not an error, when
    /// nothing is available. Returned tasks are owned by the caller until it
    /// reports a terminal status.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    async fn poll(&self, max_count: usize) -> Result<Vec<Task<P>>, SchedulerError>;

    /// Record a status change.
    ///
    /// Idempotent, and never moves a task out of a terminal status.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    async fn update_status(&self, update: &StatusUpdate) -> Result<(), SchedulerError>;
}

/// Durable record of task state, used to observe progress from outside the
/// scheduler and to reconcile tasks left behind by a previous process.
#[async_trait]
pub trait Persistencer<P>: Send + Sync + 'static
where
    P: TaskPayload,
{
    /// Tasks still `Pending` or `Running`, from this or any earlier session.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    async fn load_unfinished(&self) -> Result<Vec<Task<P>>, SchedulerError>;

    /// Write the task's current status, timestamps, reason and output.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    async fn persist(&self, task: &Task<P>) -> Result<(), SchedulerError>;
}
