//! Scheduler: dispatch loop, worker execution and state reconciliation.
//!
//! One controller task runs the dispatch loop, a second runs the state-poll
//! loop, and every claimed task executes on its own Tokio task. The running
//! count is reserved before a worker is spawned and released only after the
//! actuator has returned, so at most `task_limit` actuator calls are ever in
//! flight.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::util::clock::{millis_between, now};

use super::stats::SchedulerCounters;
use super::{
    Actuator, ActuatorError, Container, FinishedTasks, Persistencer, SchedulerError,
    SchedulerStats, Task, TaskContext, TaskId, TaskOutput, TaskPayload, TaskStatus,
};

/// Bookkeeping for a task currently owned by a local worker.
#[derive(Debug)]
struct LiveWorker {
    cancel: CancellationToken,
    deadline: Instant,
    overdue_warned: bool,
}

/// How an execution ended.
enum Outcome {
    Success(TaskOutput),
    Failed(String),
    Timeout(DateTime<Utc>),
}

/// State shared between the public handle, both loops and all workers.
struct Inner<P, C, A>
where
    P: TaskPayload,
{
    instance_id: String,
    config: SchedulerConfig,
    container: Arc<C>,
    actuator: A,
    persistencer: Option<Arc<dyn Persistencer<P>>>,
    /// False when the persistencer is the container itself.
    persist_separately: bool,
    /// Tasks executing in this process.
    live: Mutex<HashMap<TaskId, LiveWorker>>,
    /// Ids accepted by `add_task` and not yet terminal, flagged once the
    /// container has taken the push.
    outstanding: Mutex<HashMap<TaskId, bool>>,
    running: AtomicUsize,
    counters: SchedulerCounters,
    finished_tx: Mutex<Option<mpsc::Sender<Task<P>>>>,
    shutdown: CancellationToken,
    /// Signaled whenever a worker releases its slot.
    slot_freed: Notify,
}

/// Pluggable task scheduler.
///
/// Pulls tasks from a [`Container`], runs each through an [`Actuator`] under
/// a concurrency ceiling and per-task timeout, writes terminal status back to
/// the container (and to a separate [`Persistencer`] when one is given) and,
/// when enabled, publishes finished tasks on a [`FinishedTasks`] stream.
///
/// # Example
///
/// ```rust,ignore
/// let container = Arc::new(MemoryQueueContainer::new(10_000, Duration::from_millis(100)));
/// let scheduler = Scheduler::new(
///     container,
///     MyActuator,
///     None,
///     SchedulerConfig::new().with_task_limit(2).with_finished_task_list(true),
/// )?;
/// scheduler.add_task(Task::new("task-1", job)).await?;
/// let mut finished = scheduler.finished_tasks().expect("enabled");
/// while let Some(task) = finished.recv().await { /* ... */ }
/// ```
pub struct Scheduler<P, C, A>
where
    P: TaskPayload,
    C: Container<P>,
    A: Actuator<P>,
{
    inner: Arc<Inner<P, C, A>>,
    loops: Mutex<Vec<JoinHandle<()>>>,
    finished_rx: Mutex<Option<FinishedTasks<P>>>,
}

impl<P, C, A> Scheduler<P, C, A>
where
    P: TaskPayload,
    C: Container<P>,
    A: Actuator<P>,
{
    /// Validate `config` and start the dispatch loop and, unless disabled,
    /// the state-poll loop.
    ///
    /// When `persistencer` points at the same object as `container`, status
    /// is written once through the container.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` if the configuration does not validate
    /// - `Runtime` when called outside a Tokio runtime
    pub fn new(
        container: Arc<C>,
        actuator: A,
        persistencer: Option<Arc<dyn Persistencer<P>>>,
        config: SchedulerConfig,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SchedulerError::Runtime(e.to_string()))?;

        let persist_separately = persistencer
            .as_ref()
            .is_some_and(|p| !std::ptr::addr_eq(Arc::as_ptr(p), Arc::as_ptr(&container)));

        let (finished_tx, finished_rx) = if config.enable_finished_task_list {
            let (tx, rx) = mpsc::channel(config.finished_task_buffer);
            (Some(tx), Some(FinishedTasks::new(rx)))
        } else {
            (None, None)
        };

        let inner = Arc::new(Inner {
            instance_id: uuid::Uuid::new_v4().to_string(),
            config,
            container,
            actuator,
            persistencer,
            persist_separately,
            live: Mutex::new(HashMap::new()),
            outstanding: Mutex::new(HashMap::new()),
            running: AtomicUsize::new(0),
            counters: SchedulerCounters::default(),
            finished_tx: Mutex::new(finished_tx),
            shutdown: CancellationToken::new(),
            slot_freed: Notify::new(),
        });

        let mut loops = vec![runtime.spawn(Arc::clone(&inner).dispatch_loop())];
        if !inner.config.disable_state_poll {
            loops.push(runtime.spawn(Arc::clone(&inner).state_poll_loop()));
        }

        info!(
            scheduler = %inner.instance_id,
            task_limit = inner.config.task_limit,
            task_timeout_ms = inner.config.task_timeout.as_millis(),
            state_poll = !inner.config.disable_state_poll,
            persistencer = inner.persistencer.is_some(),
            "scheduler started"
        );

        Ok(Self {
            inner,
            loops: Mutex::new(loops),
            finished_rx: Mutex::new(finished_rx),
        })
    }

    /// Submit a task.
    ///
    /// Any execution state on `task` is discarded; it enters the container as
    /// `Pending`. Callers wanting a submission deadline can wrap the call in
    /// `tokio::time::timeout`.
    ///
    /// # Errors
    ///
    /// - `DuplicateTaskId` if the id is still outstanding in this scheduler
    /// - `ShutDown` after [`shutdown`](Self::shutdown)
    /// - the container's `push` error, unchanged (e.g. `ContainerFull`)
    pub async fn add_task(&self, task: Task<P>) -> Result<(), SchedulerError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(SchedulerError::ShutDown);
        }

        let mut task = task.into_submission();
        task.enqueue_time = Some(now());
        let task_id = task.task_id.clone();

        {
            let mut outstanding = self.inner.outstanding.lock();
            if outstanding.contains_key(&task_id) {
                return Err(SchedulerError::DuplicateTaskId(task_id));
            }
            outstanding.insert(task_id.clone(), false);
        }

        match self.inner.container.push(task).await {
            Ok(()) => {
                if let Some(pushed) = self.inner.outstanding.lock().get_mut(&task_id) {
                    *pushed = true;
                }
                self.inner.counters.submitted.fetch_add(1, Ordering::Relaxed);
                debug!(task_id = %task_id, "task submitted");
                Ok(())
            }
            Err(e) => {
                self.inner.outstanding.lock().remove(&task_id);
                warn!(task_id = %task_id, error = %e, "task rejected by container");
                Err(e)
            }
        }
    }

    /// Take the finished-task stream.
    ///
    /// Returns `None` when `enable_finished_task_list` is off, and on every
    /// call after the first: the stream is not restartable.
    pub fn finished_tasks(&self) -> Option<FinishedTasks<P>> {
        self.finished_rx.lock().take()
    }

    /// Number of tasks currently holding a worker slot.
    pub fn running_count(&self) -> usize {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Snapshot of counters.
    pub fn stats(&self) -> SchedulerStats {
        self.inner
            .counters
            .snapshot(self.inner.config.task_limit, self.running_count())
    }

    /// Configuration in effect.
    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Container this scheduler draws from.
    pub fn container(&self) -> &Arc<C> {
        &self.inner.container
    }

    /// Stop both loops, wait for in-flight workers, then close the
    /// finished-task stream.
    ///
    /// Workers are not cancelled; each still ends within its task timeout
    /// provided the actuator honors cancellation. Calling this twice is a
    /// no-op the second time.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();

        let loops = std::mem::take(&mut *self.loops.lock());
        for handle in loops {
            if let Err(e) = handle.await {
                error!(scheduler = %self.inner.instance_id, error = %e, "scheduler loop ended abnormally");
            }
        }

        loop {
            let freed = self.inner.slot_freed.notified();
            tokio::pin!(freed);
            freed.as_mut().enable();
            let running = self.running_count();
            if running == 0 {
                break;
            }
            debug!(running, "waiting for in-flight workers");
            freed.await;
        }

        self.inner.finished_tx.lock().take();
        info!(scheduler = %self.inner.instance_id, "scheduler shut down");
    }
}

impl<P, C, A> Drop for Scheduler<P, C, A>
where
    P: TaskPayload,
    C: Container<P>,
    A: Actuator<P>,
{
    fn drop(&mut self) {
        // Loops exit on their next tick; workers run to completion and the
        // stream closes once the last of them drops its handle.
        self.inner.shutdown.cancel();
    }
}

impl<P, C, A> Inner<P, C, A>
where
    P: TaskPayload,
    C: Container<P>,
    A: Actuator<P>,
{
    async fn dispatch_loop(self: Arc<Self>) {
        debug!(scheduler = %self.instance_id, "dispatch loop started");
        let interval = self.config.scheduling_poll_interval;

        while !self.shutdown.is_cancelled() {
            let running = self.running.load(Ordering::Acquire);
            let available = self.config.task_limit.saturating_sub(running);
            if available == 0 {
                if self.idle(interval, true).await {
                    break;
                }
                continue;
            }

            let tasks = match self.container.poll(available).await {
                Ok(tasks) => tasks,
                Err(e) => {
                    warn!(scheduler = %self.instance_id, error = %e, "container poll failed; retrying");
                    if self.idle(interval, false).await {
                        break;
                    }
                    continue;
                }
            };

            if tasks.is_empty() {
                if self.idle(interval, false).await {
                    break;
                }
                continue;
            }

            let mut remaining = available;
            for task in tasks {
                if remaining == 0 {
                    self.reject_overflow(task).await;
                } else if self.dispatch(task) {
                    remaining -= 1;
                }
            }
        }

        debug!(scheduler = %self.instance_id, "dispatch loop stopped");
    }

    /// Wait for `interval`, returning early on a freed slot when
    /// `wake_on_slot` is set. Returns `true` once shutdown is requested.
    async fn idle(&self, interval: Duration, wake_on_slot: bool) -> bool {
        tokio::select! {
            () = self.shutdown.cancelled() => true,
            () = tokio::time::sleep(interval) => false,
            () = self.slot_freed.notified(), if wake_on_slot => false,
        }
    }

    /// Start a worker for a claimed task. Returns `false` if it was skipped.
    fn dispatch(self: &Arc<Self>, mut task: Task<P>) -> bool {
        let task_id = task.task_id.clone();
        let cancel = CancellationToken::new();

        let deadline = {
            let mut live = self.live.lock();
            if live.contains_key(&task_id) {
                error!(task_id = %task_id, "task already running locally; skipping duplicate dispatch");
                return false;
            }
            if !task.begin(now()) {
                error!(task_id = %task_id, status = %task.task_status, "container handed out a task that cannot run");
                return false;
            }
            // Taken after the start stamp so a timed-out run never looks shorter than the timeout.
            let deadline = Instant::now() + self.config.task_timeout;
            live.insert(
                task_id.clone(),
                LiveWorker {
                    cancel: cancel.clone(),
                    deadline,
                    overdue_warned: false,
                },
            );
            deadline
        };

        let running = self.running.fetch_add(1, Ordering::AcqRel) + 1;
        self.counters.observe_running(running);
        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
        info!(task_id = %task_id, running, "task started");

        let ctx = TaskContext::new(task_id, cancel, deadline);
        tokio::spawn(Arc::clone(self).run_worker(task, ctx));
        true
    }

    /// Fail a task returned beyond the requested `max_count`.
    async fn reject_overflow(&self, mut task: Task<P>) {
        error!(task_id = %task.task_id, "container returned more tasks than requested");
        let at = now();
        if task.begin(at)
            && task.finish(
                TaskStatus::Failed,
                Some("container returned more tasks than requested".into()),
                at,
                None,
            )
        {
            self.write_back(&task).await;
            self.outstanding.lock().remove(&task.task_id);
            self.counters.record_terminal(task.task_status);
            self.publish(task);
        }
    }

    async fn run_worker(self: Arc<Self>, mut task: Task<P>, ctx: TaskContext) {
        // A store other than the container must see the claim, or a crash
        // here would leave it nothing to reconcile.
        self.persist(&task).await;

        let outcome = self.execute(&ctx, &task.task_item).await;

        let (status, reason, at, output) = match outcome {
            Outcome::Success(output) => (TaskStatus::Success, None, now(), Some(output)),
            Outcome::Failed(reason) => (TaskStatus::Failed, Some(reason), now(), None),
            Outcome::Timeout(at) => (
                TaskStatus::Timeout,
                Some(format!(
                    "task execution timeout after {}ms",
                    self.config.task_timeout.as_millis()
                )),
                at,
                None,
            ),
        };

        if task.finish(status, reason, at, output) {
            self.write_back(&task).await;
        }
        self.forget(&task.task_id);

        let elapsed_ms = task
            .task_start_time
            .zip(task.task_end_time)
            .map_or(0, |(start, end)| millis_between(start, end));
        match task.task_status {
            TaskStatus::Success => info!(task_id = %task.task_id, elapsed_ms, "task succeeded"),
            status => warn!(
                task_id = %task.task_id,
                status = %status,
                elapsed_ms,
                reason = task.failed_reason.as_deref().unwrap_or_default(),
                "task did not succeed"
            ),
        }
        self.counters.record_terminal(task.task_status);
        // Publish while the slot is still held: shutdown closes the stream
        // only once every slot is free.
        self.publish(task);
        self.free_slot();
    }

    /// Run the actuator against the deadline, containing panics.
    ///
    /// On timeout the context is cancelled and the actuator is still awaited:
    /// the slot stays held until it actually returns.
    async fn execute(&self, ctx: &TaskContext, item: &P) -> Outcome {
        let execution = AssertUnwindSafe(self.actuator.execute(ctx, item)).catch_unwind();
        tokio::pin!(execution);

        let result = tokio::select! {
            result = &mut execution => result,
            () = tokio::time::sleep_until(ctx.deadline()) => {
                let timed_out_at = now();
                ctx.cancel();
                debug!(task_id = %ctx.task_id(), "task timed out; cancelling actuator");
                if execution.await.is_err() {
                    warn!(task_id = %ctx.task_id(), "actuator panicked after cancellation");
                }
                return Outcome::Timeout(timed_out_at);
            }
        };

        match result {
            Ok(Ok(output)) => Outcome::Success(output),
            Ok(Err(ActuatorError::Cancelled)) => Outcome::Failed("execution cancelled".into()),
            Ok(Err(ActuatorError::Failed(reason))) => Outcome::Failed(reason),
            Err(panic) => {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(ToString::to_string)
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                error!(task_id = %ctx.task_id(), panic = %msg, "actuator panicked");
                Outcome::Failed(format!("actuator panicked: {msg}"))
            }
        }
    }

    /// Record the task's status in the container and, if distinct, the
    /// persistencer. Failures are logged only.
    async fn write_back(&self, task: &Task<P>) {
        if let Err(e) = self.container.update_status(&task.status_update()).await {
            error!(task_id = %task.task_id, status = %task.task_status, error = %e, "container status update failed");
        }
        self.persist(task).await;
    }

    /// Write `task` to the persistencer when it is not the container.
    async fn persist(&self, task: &Task<P>) {
        if !self.persist_separately {
            return;
        }
        if let Some(persistencer) = &self.persistencer {
            if let Err(e) = persistencer.persist(task).await {
                error!(task_id = %task.task_id, status = %task.task_status, error = %e, "persist failed");
            }
        }
    }

    fn forget(&self, task_id: &str) {
        self.live.lock().remove(task_id);
        self.outstanding.lock().remove(task_id);
    }

    fn free_slot(&self) {
        self.running.fetch_sub(1, Ordering::AcqRel);
        self.slot_freed.notify_one();
        self.slot_freed.notify_waiters();
    }

    /// Best-effort publish; never blocks.
    fn publish(&self, task: Task<P>) {
        let guard = self.finished_tx.lock();
        let Some(tx) = guard.as_ref() else {
            return;
        };
        match tx.try_send(task) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(task)) => {
                self.counters.dropped_results.fetch_add(1, Ordering::Relaxed);
                warn!(task_id = %task.task_id, "finished task buffer full; dropping result");
            }
            Err(mpsc::error::TrySendError::Closed(task)) => {
                debug!(task_id = %task.task_id, "finished task stream dropped by receiver");
            }
        }
    }

    async fn state_poll_loop(self: Arc<Self>) {
        debug!(scheduler = %self.instance_id, "state poll loop started");
        let interval = self.config.state_poll_interval;

        loop {
            if self.idle(interval, false).await {
                break;
            }
            self.check_overdue_workers();

            if let Some(persistencer) = &self.persistencer {
                // Only ids the container already holds; one still mid-push
                // would look finished.
                let known: Vec<TaskId> = self
                    .outstanding
                    .lock()
                    .iter()
                    .filter(|(_, pushed)| **pushed)
                    .map(|(id, _)| id.clone())
                    .collect();
                match persistencer.load_unfinished().await {
                    Ok(tasks) => self.reconcile(tasks, known).await,
                    Err(e) => {
                        warn!(scheduler = %self.instance_id, error = %e, "loading unfinished tasks failed; retrying");
                    }
                }
            }
        }

        debug!(scheduler = %self.instance_id, "state poll loop stopped");
    }

    /// Cancel any local worker past its deadline and flag actuators that
    /// keep running after cancellation.
    fn check_overdue_workers(&self) {
        let current = Instant::now();
        let grace = self.config.state_poll_interval;
        let mut live = self.live.lock();
        for (task_id, worker) in live.iter_mut() {
            if current < worker.deadline {
                continue;
            }
            if !worker.cancel.is_cancelled() {
                worker.cancel.cancel();
            }
            if !worker.overdue_warned && current >= worker.deadline + grace {
                worker.overdue_warned = true;
                warn!(
                    task_id = %task_id,
                    overdue_ms = current.duration_since(worker.deadline).as_millis(),
                    "actuator ignores cancellation; worker slot still held"
                );
            }
        }
    }

    /// Close `Running` tasks that no live worker owns and that started longer
    /// ago than any live owner would have allowed.
    ///
    /// `known` holds the ids pushed before `tasks` was loaded; when the
    /// persistencer is the container, those no longer unfinished anywhere are
    /// forgotten.
    async fn reconcile(&self, tasks: Vec<Task<P>>, known: Vec<TaskId>) {
        let current = now();
        let stale_after = TimeDelta::from_std(self.config.task_timeout + self.config.state_poll_interval)
            .unwrap_or(TimeDelta::MAX);

        let mut unfinished = HashSet::with_capacity(tasks.len());
        for mut task in tasks {
            unfinished.insert(task.task_id.clone());
            if task.task_status != TaskStatus::Running || self.live.lock().contains_key(&task.task_id) {
                continue;
            }
            let Some(started) = task.task_start_time.or(task.enqueue_time) else {
                continue;
            };
            if current - started < stale_after {
                continue;
            }

            let reason = format!("orphaned: no live worker for task running since {}", started.to_rfc3339());
            if !task.finish(TaskStatus::Timeout, Some(reason), current, None) {
                continue;
            }
            if let Err(e) = self.container.update_status(&task.status_update()).await {
                error!(task_id = %task.task_id, error = %e, "failed to close orphaned task");
                continue;
            }
            self.persist(&task).await;

            self.counters.reconciled.fetch_add(1, Ordering::Relaxed);
            self.counters.record_terminal(TaskStatus::Timeout);
            warn!(task_id = %task.task_id, started = %started, "reconciled orphaned task as timeout");

            if self.outstanding.lock().remove(&task.task_id).is_some() {
                self.publish(task);
            }
        }

        // Ids submitted here but finished by another process. Only a
        // persistencer that is also the container sees every pending task.
        if self.persist_separately {
            return;
        }
        let live = self.live.lock();
        let mut outstanding = self.outstanding.lock();
        for id in known {
            // Skip an id resubmitted since the snapshot and still mid-push.
            if !live.contains_key(&id) && !unfinished.contains(&id) && outstanding.get(&id) == Some(&true) {
                outstanding.remove(&id);
            }
        }
    }
}
