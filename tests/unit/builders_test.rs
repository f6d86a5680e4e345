//! Tests for scheduler builders

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use light_task_scheduler::builders::SchedulerBuilder;
use light_task_scheduler::config::SchedulerConfig;
use light_task_scheduler::core::{
    Actuator, ActuatorError, SchedulerError, TaskContext, TaskOutput,
};
use light_task_scheduler::infra::MemoryQueueContainer;

struct EchoActuator;

#[async_trait]
impl Actuator<String> for EchoActuator {
    async fn execute(&self, _ctx: &TaskContext, item: &String) -> Result<TaskOutput, ActuatorError> {
        Ok(serde_json::json!(item))
    }
}

fn container() -> Arc<MemoryQueueContainer<String>> {
    Arc::new(MemoryQueueContainer::new(16, Duration::from_millis(10)))
}

#[tokio::test]
async fn test_builder_applies_config() {
    let scheduler = SchedulerBuilder::new(container(), EchoActuator)
        .config(SchedulerConfig::new().with_task_limit(3))
        .build()
        .unwrap();

    assert_eq!(scheduler.config().task_limit, 3);
    assert_eq!(scheduler.stats().task_limit, 3);
    assert_eq!(scheduler.running_count(), 0);
    assert_eq!(scheduler.container().capacity(), 16);
    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_builder_defaults() {
    let scheduler = SchedulerBuilder::new(container(), EchoActuator).build().unwrap();
    assert_eq!(scheduler.config(), &SchedulerConfig::default());
    // Finished list is off by default.
    assert!(scheduler.finished_tasks().is_none());
    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_builder_rejects_invalid_config() {
    let result = SchedulerBuilder::new(container(), EchoActuator)
        .config(SchedulerConfig::new().with_task_limit(0))
        .build();
    assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
}

#[cfg(feature = "sql")]
#[tokio::test]
async fn test_persist_with_container() {
    use light_task_scheduler::config::SqlContainerConfig;
    use light_task_scheduler::infra::SqlContainer;

    let store = SqlContainer::<String>::connect(
        &SqlContainerConfig::new("sqlite::memory:").with_max_connections(1),
    )
    .await
    .unwrap();

    let scheduler = SchedulerBuilder::new(Arc::new(store), EchoActuator)
        .persist_with_container()
        .config(SchedulerConfig::new().with_state_poll_interval(Duration::from_millis(10)))
        .build()
        .unwrap();
    assert_eq!(scheduler.container().table(), "tasks");
    scheduler.shutdown().await;
}
