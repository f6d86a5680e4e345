//! Core scheduling abstractions: task model, pluggable contracts and the
//! scheduler itself.

pub mod actuator;
pub mod container;
pub mod error;
pub mod finished;
pub mod scheduler;
pub mod stats;
pub mod task;

pub use actuator::{Actuator, TaskContext};
pub use container::{Container, Persistencer};
pub use error::{ActuatorError, AppResult, SchedulerError};
pub use finished::FinishedTasks;
pub use scheduler::Scheduler;
pub use stats::SchedulerStats;
pub use task::{StatusUpdate, Task, TaskId, TaskOutput, TaskPayload, TaskStatus};
