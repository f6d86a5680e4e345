//! Video cutting demo.
//!
//! Splits the first 100s of a video into ten 10s clips, two at a time, with a
//! simulated cutter. Run with:
//!
//! ```text
//! cargo run --example videocut -- input.mp4 [queue|sql]
//! ```
//!
//! `queue` (default) uses the in-memory container; `sql` stores tasks in a
//! local SQLite file (`LTS_DEMO_DB`, default `sqlite://videocut.db`) and
//! enables orphan reconciliation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use light_task_scheduler::builders::SchedulerBuilder;
use light_task_scheduler::config::{SchedulerConfig, SqlContainerConfig};
use light_task_scheduler::core::{
    Actuator, ActuatorError, AppResult, Container, Persistencer, Task, TaskContext, TaskOutput,
    TaskStatus,
};
use light_task_scheduler::infra::{MemoryQueueContainer, SqlContainer};
use light_task_scheduler::util::init_tracing;

const CLIP_SECONDS: u16 = 10;
const CLIPS: u16 = 10;

/// One clip to cut out of the input video.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VideoCutJob {
    input_video: String,
    cut_start: f32,
    cut_end: f32,
}

/// Pretends to cut: 30ms of work per second of footage.
struct VideoCutter;

#[async_trait]
impl Actuator<VideoCutJob> for VideoCutter {
    async fn execute(
        &self,
        ctx: &TaskContext,
        job: &VideoCutJob,
    ) -> Result<TaskOutput, ActuatorError> {
        if job.cut_end <= job.cut_start {
            return Err(ActuatorError::failed(format!(
                "empty range {}..{}",
                job.cut_start, job.cut_end
            )));
        }
        let work = Duration::from_secs_f32((job.cut_end - job.cut_start) * 0.03);
        tokio::select! {
            () = ctx.cancelled() => return Err(ActuatorError::Cancelled),
            () = tokio::time::sleep(work) => {}
        }

        let stem = job
            .input_video
            .rsplit_once('.')
            .map_or(job.input_video.as_str(), |(stem, _)| stem);
        Ok(serde_json::json!({
            "output_video": format!("{stem}_{}_{}.mp4", job.cut_start, job.cut_end),
        }))
    }
}

fn random_id(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

async fn run<C>(
    container: Arc<C>,
    persistencer: Option<Arc<dyn Persistencer<VideoCutJob>>>,
    scan_interval: Duration,
    input_video: &str,
) -> AppResult<()>
where
    C: Container<VideoCutJob>,
{
    let config = SchedulerConfig::new()
        .with_task_limit(2)
        .with_task_timeout(Duration::from_secs(20))
        .with_finished_task_list(true)
        .with_scheduling_poll_interval(scan_interval)
        .with_state_poll_interval(scan_interval);

    let mut builder = SchedulerBuilder::new(container, VideoCutter).config(config);
    if let Some(persistencer) = persistencer {
        builder = builder.persistencer(persistencer);
    }
    let scheduler = builder.build()?;

    let mut submitted = 0_usize;
    for clip in 0..CLIPS {
        let task_id = format!("task-{}", random_id(8));
        let start = clip * CLIP_SECONDS;
        let job = VideoCutJob {
            input_video: input_video.to_string(),
            cut_start: f32::from(start),
            cut_end: f32::from(start + CLIP_SECONDS),
        };
        match scheduler.add_task(Task::new(task_id.clone(), job)).await {
            Ok(()) => submitted += 1,
            Err(e) => error!(task_id = %task_id, error = %e, "add task failed"),
        }
    }

    let mut finished = scheduler
        .finished_tasks()
        .context("finished task list not available")?;
    for _ in 0..submitted {
        let Some(task) = finished.recv().await else {
            break;
        };
        let cost_ms = task.elapsed().map_or(0, |d| d.num_milliseconds());
        match task.task_status {
            TaskStatus::Success => info!(
                task_id = %task.task_id,
                output = %task.task_output.clone().unwrap_or_default(),
                cost_ms,
                "success task"
            ),
            status => error!(
                task_id = %task.task_id,
                status = %status,
                reason = task.failed_reason.as_deref().unwrap_or_default(),
                cost_ms,
                "failed task"
            ),
        }
    }

    let stats = scheduler.stats();
    info!(
        succeeded = stats.succeeded,
        failed = stats.failed,
        timed_out = stats.timed_out,
        peak_running = stats.peak_running,
        "all clips processed"
    );
    scheduler.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> AppResult<()> {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let input_video = args.next().context("usage: videocut <input-video> [queue|sql]")?;
    let mode = args.next().unwrap_or_else(|| "queue".into());

    match mode.as_str() {
        "queue" => {
            let container = Arc::new(MemoryQueueContainer::new(10_000, Duration::from_millis(100)));
            run(container, None, Duration::from_millis(50), &input_video).await
        }
        "sql" => {
            let url = std::env::var("LTS_DEMO_DB").unwrap_or_else(|_| "sqlite://videocut.db".into());
            let container = Arc::new(
                SqlContainer::<VideoCutJob>::connect(&SqlContainerConfig::new(url))
                    .await
                    .context("build sql container")?,
            );
            let persistencer: Arc<dyn Persistencer<VideoCutJob>> = container.clone();
            run(container, Some(persistencer), Duration::from_millis(500), &input_video).await
        }
        other => bail!("unknown mode `{other}`; expected `queue` or `sql`"),
    }
}
