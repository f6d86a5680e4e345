//! Container backends.

pub mod memory;
#[cfg(feature = "sql")]
pub mod sql;

pub use memory::MemoryQueueContainer;
#[cfg(feature = "sql")]
pub use sql::SqlContainer;
