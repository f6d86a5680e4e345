//! Task entity and lifecycle status.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::core::SchedulerError;

/// Caller-assigned task identifier.
pub type TaskId = String;

/// Value produced by a successful actuator run.
pub type TaskOutput = serde_json::Value;

/// Marker trait for task payloads.
///
/// Payloads cross worker boundaries and are stored by durable containers, so
/// they must be `Send + Sync`, cloneable and serde round-trippable. The
/// scheduler never inspects them.
pub trait TaskPayload:
    Clone + Send + Sync + Serialize + for<'de> Deserialize<'de> + 'static
{
}

/// Blanket implementation: any type meeting the requirements is a `TaskPayload`.
impl<T> TaskPayload for T where
    T: Clone + Send + Sync + Serialize + for<'de> Deserialize<'de> + 'static
{
}

/// Status of a task in the scheduler lifecycle.
///
/// Transitions are monotonic: `Pending -> Running -> {Success | Failed | Timeout}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Stored in a container, waiting for a worker.
    Pending,
    /// Claimed and executing.
    Running,
    /// Actuator returned successfully before the timeout.
    Success,
    /// Actuator returned an error or panicked.
    Failed,
    /// Timeout elapsed before the actuator returned.
    Timeout,
}

impl TaskStatus {
    /// All statuses in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Running,
        Self::Success,
        Self::Failed,
        Self::Timeout,
    ];

    /// Whether no further transition is allowed.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Timeout)
    }

    /// Whether `self -> next` is a valid lifecycle step.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Success | Self::Failed | Self::Timeout)
        )
    }

    /// The only status a task may hold right before entering `self`.
    #[must_use]
    pub const fn predecessor(self) -> Option<Self> {
        match self {
            Self::Pending => None,
            Self::Running => Some(Self::Pending),
            Self::Success | Self::Failed | Self::Timeout => Some(Self::Running),
        }
    }

    /// Stable upper-case name used in storage and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| SchedulerError::Backend(format!("unknown task status `{s}`")))
    }
}

/// A unit of work: identity, opaque payload and lifecycle bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "P: Serialize"))]
#[serde(bound(deserialize = "P: serde::de::DeserializeOwned"))]
pub struct Task<P> {
    /// Unique identifier, assigned by the caller.
    pub task_id: TaskId,
    /// Payload handed to the actuator untouched.
    pub task_item: P,
    /// Current lifecycle status.
    pub task_status: TaskStatus,
    /// Set only for `Failed` and `Timeout`.
    pub failed_reason: Option<String>,
    /// When the task entered a container.
    pub enqueue_time: Option<DateTime<Utc>>,
    /// When execution began.
    pub task_start_time: Option<DateTime<Utc>>,
    /// When execution reached a terminal status.
    pub task_end_time: Option<DateTime<Utc>>,
    /// Output of a successful run.
    pub task_output: Option<TaskOutput>,
}

impl<P> Task<P> {
    /// Create a pending task.
    pub fn new(task_id: impl Into<TaskId>, task_item: P) -> Self {
        Self {
            task_id: task_id.into(),
            task_item,
            task_status: TaskStatus::Pending,
            failed_reason: None,
            enqueue_time: None,
            task_start_time: None,
            task_end_time: None,
            task_output: None,
        }
    }

    /// Drop any execution state so the task can be submitted again.
    #[must_use]
    pub fn into_submission(self) -> Self {
        Self::new(self.task_id, self.task_item)
    }

    /// Apply a status transition, refusing non-monotonic ones.
    ///
    /// Returns `false` and logs when the transition is invalid; the task is
    /// left untouched in that case.
    pub fn transition(&mut self, next: TaskStatus) -> bool {
        if self.task_status.can_transition_to(next) {
            self.task_status = next;
            return true;
        }
        tracing::error!(
            task_id = %self.task_id,
            from = %self.task_status,
            to = %next,
            "rejected non-monotonic status transition"
        );
        false
    }

    /// Move to `Running` (or stay there if a container already claimed it)
    /// and stamp the start time.
    pub fn begin(&mut self, at: DateTime<Utc>) -> bool {
        let ok = match self.task_status {
            TaskStatus::Running => true,
            _ => self.transition(TaskStatus::Running),
        };
        if ok {
            self.task_start_time = Some(at);
            self.task_end_time = None;
        }
        ok
    }

    /// Move to a terminal status, stamping the end time.
    ///
    /// The end time never precedes the start time.
    pub fn finish(
        &mut self,
        status: TaskStatus,
        reason: Option<String>,
        at: DateTime<Utc>,
        output: Option<TaskOutput>,
    ) -> bool {
        debug_assert!(status.is_terminal(), "finish requires a terminal status");
        if !self.transition(status) {
            return false;
        }
        let end = self.task_start_time.map_or(at, |start| at.max(start));
        self.task_end_time = Some(end);
        self.failed_reason = match status {
            TaskStatus::Failed | TaskStatus::Timeout => reason,
            _ => None,
        };
        self.task_output = if status == TaskStatus::Success {
            output
        } else {
            None
        };
        true
    }

    /// Time spent executing, once both timestamps are known.
    #[must_use]
    pub fn elapsed(&self) -> Option<TimeDelta> {
        Some(self.task_end_time? - self.task_start_time?)
    }

    /// Snapshot of the fields a container records on status changes.
    #[must_use]
    pub fn status_update(&self) -> StatusUpdate {
        StatusUpdate {
            task_id: self.task_id.clone(),
            status: self.task_status,
            failed_reason: self.failed_reason.clone(),
            start_time: self.task_start_time,
            end_time: self.task_end_time,
            output: self.task_output.clone(),
        }
    }
}

/// Status write-back sent to a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// Task being updated.
    pub task_id: TaskId,
    /// New status.
    pub status: TaskStatus,
    /// Failure or timeout reason.
    pub failed_reason: Option<String>,
    /// Execution start.
    pub start_time: Option<DateTime<Utc>>,
    /// Execution end.
    pub end_time: Option<DateTime<Utc>>,
    /// Output of a successful run.
    pub output: Option<TaskOutput>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::clock::now;

    #[test]
    fn test_monotonic_transitions() {
        use TaskStatus::{Failed, Pending, Running, Success, Timeout};

        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Success));
        assert!(Running.can_transition_to(Failed));
        assert!(Running.can_transition_to(Timeout));

        assert!(!Pending.can_transition_to(Success));
        assert!(!Running.can_transition_to(Pending));
        for terminal in [Success, Failed, Timeout] {
            for next in TaskStatus::ALL {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn test_predecessor_matches_transitions() {
        for next in TaskStatus::ALL {
            for prev in TaskStatus::ALL {
                assert_eq!(
                    prev.can_transition_to(next),
                    next.predecessor() == Some(prev),
                    "{prev} -> {next}"
                );
            }
        }
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in TaskStatus::ALL {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert!("DONE".parse::<TaskStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&TaskStatus::Timeout).unwrap(),
            r#""TIMEOUT""#
        );
    }

    #[test]
    fn test_terminal_state_is_sticky() {
        let mut task = Task::new("t-1", 7_u32);
        let start = now();
        assert!(task.begin(start));
        assert!(task.finish(TaskStatus::Success, None, start, Some(serde_json::json!(14))));

        assert!(!task.transition(TaskStatus::Running));
        assert!(!task.finish(TaskStatus::Failed, Some("late".into()), now(), None));
        assert_eq!(task.task_status, TaskStatus::Success);
        assert_eq!(task.failed_reason, None);
        assert_eq!(task.task_output, Some(serde_json::json!(14)));
    }

    #[test]
    fn test_end_time_never_precedes_start() {
        let mut task = Task::new("t-2", ());
        let start = now();
        task.begin(start);
        task.finish(
            TaskStatus::Failed,
            Some("boom".into()),
            start - TimeDelta::seconds(5),
            None,
        );
        assert_eq!(task.task_end_time, Some(start));
        assert_eq!(task.elapsed(), Some(TimeDelta::zero()));
    }

    #[test]
    fn test_reason_only_kept_for_failures() {
        let mut task = Task::new("t-3", ());
        task.begin(now());
        task.finish(TaskStatus::Success, Some("ignored".into()), now(), None);
        assert_eq!(task.failed_reason, None);

        let mut task = Task::new("t-4", ());
        task.begin(now());
        task.finish(TaskStatus::Timeout, Some("too slow".into()), now(), Some(serde_json::json!(1)));
        assert_eq!(task.failed_reason.as_deref(), Some("too slow"));
        assert_eq!(task.task_output, None);
    }

    #[test]
    fn test_into_submission_resets_state() {
        let mut task = Task::new("t-5", "payload".to_string());
        task.begin(now());
        task.finish(TaskStatus::Failed, Some("x".into()), now(), None);

        let fresh = task.into_submission();
        assert_eq!(fresh.task_status, TaskStatus::Pending);
        assert!(fresh.task_start_time.is_none());
        assert!(fresh.failed_reason.is_none());
        assert_eq!(fresh.task_item, "payload");
    }
}
