//! Bounded in-memory FIFO container.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::core::{Container, SchedulerError, StatusUpdate, Task, TaskId, TaskPayload, TaskStatus};
use crate::util::clock::now;

struct QueueState<P> {
    /// Pending tasks in arrival order.
    queue: VecDeque<Task<P>>,
    /// Ids currently in `queue`.
    queued: HashSet<TaskId>,
    /// Ids handed out by `poll` and not yet reported terminal.
    claimed: HashSet<TaskId>,
}

/// In-memory queue container with a fixed number of slots.
///
/// `push` fails fast with `ContainerFull` once `capacity` tasks are queued,
/// giving producers backpressure. Only queued tasks occupy slots: a claimed
/// task frees its slot immediately. `poll` waits up to `wait_quantum` for a
/// first task. Nothing survives a restart.
pub struct MemoryQueueContainer<P> {
    capacity: usize,
    wait_quantum: Duration,
    state: Mutex<QueueState<P>>,
    available: Notify,
}

impl<P> MemoryQueueContainer<P> {
    /// Create a container with `capacity` slots whose `poll` waits at most
    /// `wait_quantum` for work.
    pub fn new(capacity: usize, wait_quantum: Duration) -> Self {
        Self {
            capacity,
            wait_quantum,
            state: Mutex::new(QueueState {
                queue: VecDeque::with_capacity(capacity.min(1024)),
                queued: HashSet::new(),
                claimed: HashSet::new(),
            }),
            available: Notify::new(),
        }
    }

    /// Maximum number of queued tasks.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of queued (unclaimed) tasks.
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Whether no task is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of claimed tasks awaiting a terminal status.
    pub fn in_flight(&self) -> usize {
        self.state.lock().claimed.len()
    }

    /// Pop up to `max_count` tasks, marking each as claimed.
    fn take_batch(&self, max_count: usize) -> Vec<Task<P>> {
        let mut state = self.state.lock();
        let count = max_count.min(state.queue.len());
        let mut batch = Vec::with_capacity(count);
        let claimed_at = now();
        for _ in 0..count {
            let Some(mut task) = state.queue.pop_front() else {
                break;
            };
            state.queued.remove(&task.task_id);
            if task.begin(claimed_at) {
                state.claimed.insert(task.task_id.clone());
                batch.push(task);
            }
        }
        batch
    }
}

#[async_trait]
impl<P> Container<P> for MemoryQueueContainer<P>
where
    P: TaskPayload,
{
    async fn push(&self, task: Task<P>) -> Result<(), SchedulerError> {
        {
            let mut state = self.state.lock();
            if state.queued.contains(&task.task_id) || state.claimed.contains(&task.task_id) {
                return Err(SchedulerError::DuplicateTaskId(task.task_id));
            }
            if state.queue.len() >= self.capacity {
                tracing::warn!(
                    task_id = %task.task_id,
                    capacity = self.capacity,
                    "memory container full"
                );
                return Err(SchedulerError::ContainerFull(format!(
                    "memory queue capacity {} reached",
                    self.capacity
                )));
            }
            state.queued.insert(task.task_id.clone());
            state.queue.push_back(task);
        }
        self.available.notify_one();
        Ok(())
    }

    async fn poll(&self, max_count: usize) -> Result<Vec<Task<P>>, SchedulerError> {
        if max_count == 0 {
            return Ok(Vec::new());
        }
        let deadline = Instant::now() + self.wait_quantum;
        loop {
            let pushed = self.available.notified();
            tokio::pin!(pushed);
            pushed.as_mut().enable();

            let batch = self.take_batch(max_count);
            if !batch.is_empty() {
                return Ok(batch);
            }
            if tokio::time::timeout_at(deadline, pushed).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn update_status(&self, update: &StatusUpdate) -> Result<(), SchedulerError> {
        if update.status.is_terminal() && self.state.lock().claimed.remove(&update.task_id) {
            tracing::debug!(task_id = %update.task_id, status = %update.status, "memory container released task");
        } else if update.status == TaskStatus::Pending {
            tracing::debug!(task_id = %update.task_id, "ignoring pending status update");
        }
        Ok(())
    }
}
