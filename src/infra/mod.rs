//! Infrastructure adapters: container backends.

pub mod container;

pub use container::MemoryQueueContainer;
#[cfg(feature = "sql")]
pub use container::SqlContainer;
