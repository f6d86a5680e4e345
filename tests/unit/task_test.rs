//! Tests for the task entity

use light_task_scheduler::core::{Task, TaskStatus};
use light_task_scheduler::util::{millis_between, now};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Clip {
    input: String,
    start: f32,
    end: f32,
}

fn clip() -> Clip {
    Clip {
        input: "match.mp4".into(),
        start: 10.0,
        end: 20.0,
    }
}

#[test]
fn test_new_task_is_pending() {
    let task = Task::new("task-1", clip());
    assert_eq!(task.task_status, TaskStatus::Pending);
    assert!(task.task_start_time.is_none());
    assert!(task.task_end_time.is_none());
    assert!(task.elapsed().is_none());
}

#[test]
fn test_serialized_shape() {
    let task = Task::new("task-1", clip());
    let json = serde_json::to_value(&task).unwrap();
    assert_eq!(json["task_id"], "task-1");
    assert_eq!(json["task_status"], "PENDING");
    assert_eq!(json["task_item"]["input"], "match.mp4");

    let back: Task<Clip> = serde_json::from_value(json).unwrap();
    assert_eq!(back, task);
}

#[test]
fn test_lifecycle_and_status_update() {
    let mut task = Task::new("task-2", clip());
    let start = now();
    assert!(task.begin(start));
    assert_eq!(task.task_status, TaskStatus::Running);

    let end = start + chrono::TimeDelta::milliseconds(1200);
    assert!(task.finish(
        TaskStatus::Success,
        None,
        end,
        Some(serde_json::json!({"output": "match_10_20.mp4"})),
    ));
    assert_eq!(millis_between(start, task.task_end_time.unwrap()), 1200);

    let update = task.status_update();
    assert_eq!(update.task_id, "task-2");
    assert_eq!(update.status, TaskStatus::Success);
    assert_eq!(update.start_time, Some(start));
    assert_eq!(update.end_time, Some(end));
    assert!(update.output.is_some());
}

#[test]
fn test_cannot_skip_running() {
    let mut task = Task::new("task-3", clip());
    assert!(!task.finish(TaskStatus::Failed, Some("boom".into()), now(), None));
    assert_eq!(task.task_status, TaskStatus::Pending);
    assert!(task.task_end_time.is_none());
}

#[test]
fn test_begin_accepts_claimed_task() {
    let mut task = Task::new("task-4", clip());
    task.task_status = TaskStatus::Running;
    let at = now();
    assert!(task.begin(at));
    assert_eq!(task.task_start_time, Some(at));
}
