//! Tests for error types

use anyhow::Context;
use light_task_scheduler::core::{ActuatorError, SchedulerError};

#[test]
fn test_container_full_error() {
    let err = SchedulerError::ContainerFull("memory queue capacity 1 reached".to_string());
    assert_eq!(format!("{}", err), "container full: memory queue capacity 1 reached");
}

#[test]
fn test_duplicate_task_id_error() {
    let err = SchedulerError::DuplicateTaskId("task-1".to_string());
    assert_eq!(format!("{}", err), "duplicate task id: task-1");
}

#[test]
fn test_backend_error() {
    let err = SchedulerError::backend("connection failed");
    assert_eq!(format!("{}", err), "backend error: connection failed");
}

#[test]
fn test_shut_down_error() {
    assert_eq!(SchedulerError::ShutDown.to_string(), "scheduler is shut down");
}

#[test]
fn test_actuator_error_messages() {
    assert_eq!(ActuatorError::failed("bad input").to_string(), "bad input");
    assert_eq!(ActuatorError::Cancelled.to_string(), "execution cancelled");
}

#[test]
fn test_actuator_error_from_anyhow_keeps_context() {
    let err: anyhow::Result<()> = Err(anyhow::anyhow!("ffmpeg exited with 1")).context("cut clip 3");
    let err = ActuatorError::from(err.unwrap_err());
    assert_eq!(err, ActuatorError::Failed("cut clip 3: ffmpeg exited with 1".into()));
}
