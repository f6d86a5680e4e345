//! Benchmarks for the in-memory container and end-to-end scheduling.
//!
//! Benchmarks cover:
//! - Push/poll throughput of `MemoryQueueContainer`
//! - Batch claim sizes
//! - Scheduler drain of a burst of no-op tasks

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::runtime::Runtime;

use light_task_scheduler::builders::SchedulerBuilder;
use light_task_scheduler::config::SchedulerConfig;
use light_task_scheduler::core::{
    Actuator, ActuatorError, Container, Task, TaskContext, TaskOutput,
};
use light_task_scheduler::infra::MemoryQueueContainer;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct BenchPayload {
    id: u64,
}

struct NoOpActuator;

#[async_trait]
impl Actuator<BenchPayload> for NoOpActuator {
    async fn execute(
        &self,
        _ctx: &TaskContext,
        item: &BenchPayload,
    ) -> Result<TaskOutput, ActuatorError> {
        Ok(serde_json::json!(item.id))
    }
}

fn container(capacity: usize) -> MemoryQueueContainer<BenchPayload> {
    MemoryQueueContainer::new(capacity, Duration::from_millis(1))
}

fn bench_push_poll(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_push_poll");
    for size in [10_u64, 100, 1000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.to_async(Runtime::new().unwrap()).iter(|| async move {
                let queue = container(size as usize);
                for id in 0..size {
                    queue
                        .push(Task::new(format!("t-{id}"), BenchPayload { id }))
                        .await
                        .unwrap();
                }
                let mut claimed = 0;
                while claimed < size as usize {
                    claimed += black_box(queue.poll(64).await.unwrap()).len();
                }
            });
        });
    }
    group.finish();
}

fn bench_claim_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_claim_batch");
    for batch in [1_usize, 8, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &batch| {
            b.to_async(Runtime::new().unwrap()).iter(|| async move {
                let queue = container(1024);
                for id in 0..1024 {
                    queue
                        .push(Task::new(format!("t-{id}"), BenchPayload { id }))
                        .await
                        .unwrap();
                }
                while !queue.is_empty() {
                    black_box(queue.poll(batch).await.unwrap());
                }
            });
        });
    }
    group.finish();
}

fn bench_scheduler_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler");
    group.sample_size(20);
    group.bench_function("drain_200_noop_tasks", |b| {
        b.to_async(Runtime::new().unwrap()).iter(|| async {
            let scheduler = SchedulerBuilder::new(Arc::new(container(1000)), NoOpActuator)
                .config(
                    SchedulerConfig::new()
                        .with_task_limit(8)
                        .with_scheduling_poll_interval(Duration::from_millis(1))
                        .with_state_poll_disabled(true)
                        .with_finished_task_list(true),
                )
                .build()
                .unwrap();
            let mut finished = scheduler.finished_tasks().unwrap();
            for id in 0..200 {
                scheduler
                    .add_task(Task::new(format!("t-{id}"), BenchPayload { id }))
                    .await
                    .unwrap();
            }
            for _ in 0..200 {
                black_box(finished.recv().await.unwrap());
            }
            scheduler.shutdown().await;
        });
    });
    group.finish();
}

criterion_group!(benches, bench_push_poll, bench_claim_batch, bench_scheduler_drain);
criterion_main!(benches);
