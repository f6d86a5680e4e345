//! Builders for assembling a scheduler from its parts.

pub mod scheduler_builder;

pub use scheduler_builder::SchedulerBuilder;
