//! Configuration models for the scheduler and its backends.

pub mod scheduler;
#[cfg(feature = "sql")]
pub mod sql;

pub use scheduler::SchedulerConfig;
#[cfg(feature = "sql")]
pub use sql::SqlContainerConfig;
