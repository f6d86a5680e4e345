//! # Light Task Scheduler
//!
//! A pluggable task scheduler: tasks are pulled from a [`Container`], run
//! through a user-supplied [`Actuator`] under a concurrency ceiling and a
//! per-task timeout, and their terminal status is written back to the
//! container and, optionally, to a durable [`Persistencer`].
//!
//! ## Core Problem Solved
//!
//! Long-running jobs (video cutting, transcoding, batch inference) need to be
//! throttled, timed out and tracked, sometimes across process restarts and
//! sometimes across several processes sharing one task store:
//!
//! - **Bounded concurrency**: at most `task_limit` actuator calls in flight
//! - **Per-task timeout**: runs past `task_timeout` are cancelled and marked `TIMEOUT`
//! - **Pluggable storage**: in-memory FIFO queue or a SQLite table with atomic claims
//! - **Orphan reconciliation**: `RUNNING` rows left by a crashed process are closed out
//! - **Result stream**: finished tasks can be drained as an async stream
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use light_task_scheduler::builders::SchedulerBuilder;
//! use light_task_scheduler::config::SchedulerConfig;
//! use light_task_scheduler::core::Task;
//! use light_task_scheduler::infra::MemoryQueueContainer;
//!
//! let container = Arc::new(MemoryQueueContainer::new(10_000, Duration::from_millis(100)));
//! let scheduler = SchedulerBuilder::new(container, VideoCutter)
//!     .config(
//!         SchedulerConfig::new()
//!             .with_task_limit(2)
//!             .with_task_timeout(Duration::from_secs(20))
//!             .with_finished_task_list(true),
//!     )
//!     .build()?;
//!
//! scheduler.add_task(Task::new("cut-1", job)).await?;
//!
//! let mut finished = scheduler.finished_tasks().expect("finished list enabled");
//! while let Some(task) = finished.recv().await {
//!     println!("{} -> {}", task.task_id, task.task_status);
//! }
//! ```
//!
//! For a runnable walk-through, see `demos/videocut.rs`.
//!
//! [`Container`]: crate::core::Container
//! [`Actuator`]: crate::core::Actuator
//! [`Persistencer`]: crate::core::Persistencer

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions: tasks, contracts and the scheduler itself.
pub mod core;
/// Configuration models for the scheduler and container backends.
pub mod config;
/// Builders to assemble a scheduler from its parts.
pub mod builders;
/// Infrastructure adapters: container backends.
pub mod infra;
/// Shared utilities.
pub mod util;
