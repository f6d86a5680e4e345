//! Fluent construction of a [`Scheduler`].

use std::sync::Arc;

use crate::config::SchedulerConfig;
use crate::core::{Actuator, Container, Persistencer, Scheduler, SchedulerError, TaskPayload};

/// Collects a container, actuator, optional persistencer and configuration,
/// then starts the scheduler.
pub struct SchedulerBuilder<P, C, A>
where
    P: TaskPayload,
{
    container: Arc<C>,
    actuator: A,
    persistencer: Option<Arc<dyn Persistencer<P>>>,
    config: SchedulerConfig,
}

impl<P, C, A> SchedulerBuilder<P, C, A>
where
    P: TaskPayload,
    C: Container<P>,
    A: Actuator<P>,
{
    /// Start from the required parts and a default configuration.
    pub fn new(container: Arc<C>, actuator: A) -> Self {
        Self {
            container,
            actuator,
            persistencer: None,
            config: SchedulerConfig::default(),
        }
    }

    /// Record status through a separate persistencer.
    #[must_use]
    pub fn persistencer(mut self, persistencer: Arc<dyn Persistencer<P>>) -> Self {
        self.persistencer = Some(persistencer);
        self
    }

    /// Replace the configuration.
    #[must_use]
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate and start the scheduler.
    ///
    /// # Errors
    ///
    /// See [`Scheduler::new`].
    pub fn build(self) -> Result<Scheduler<P, C, A>, SchedulerError> {
        Scheduler::new(self.container, self.actuator, self.persistencer, self.config)
    }
}

impl<P, C, A> SchedulerBuilder<P, C, A>
where
    P: TaskPayload,
    C: Container<P> + Persistencer<P>,
    A: Actuator<P>,
{
    /// Use the container itself as the persistencer, enabling reconciliation
    /// of orphaned tasks without a second write per status change.
    #[must_use]
    pub fn persist_with_container(mut self) -> Self {
        let persistencer: Arc<dyn Persistencer<P>> = self.container.clone();
        self.persistencer = Some(persistencer);
        self
    }
}
