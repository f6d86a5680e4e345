//! Scheduler configuration.

use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::{AppResult, SchedulerError};

/// Prefix of the environment variables read by [`SchedulerConfig::from_env`].
pub const ENV_PREFIX: &str = "LTS_";

/// Scheduler configuration, immutable once the scheduler is built.
///
/// Durations serialize as whole milliseconds (`task_timeout_ms`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum number of tasks executing concurrently.
    pub task_limit: usize,
    /// Maximum wall-clock time per task execution.
    #[serde(rename = "task_timeout_ms", with = "crate::util::duration_ms")]
    pub task_timeout: Duration,
    /// Publish finished tasks to a drainable stream.
    pub enable_finished_task_list: bool,
    /// Wait between container polls when no slot or task is available.
    #[serde(rename = "scheduling_poll_interval_ms", with = "crate::util::duration_ms")]
    pub scheduling_poll_interval: Duration,
    /// Skip the state-reconciliation loop entirely.
    pub disable_state_poll: bool,
    /// Wait between state-reconciliation passes.
    #[serde(rename = "state_poll_interval_ms", with = "crate::util::duration_ms")]
    pub state_poll_interval: Duration,
    /// Capacity of the finished-task buffer; results beyond it are dropped.
    pub finished_task_buffer: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            task_limit: num_cpus::get(),
            task_timeout: Duration::from_secs(60),
            enable_finished_task_list: false,
            scheduling_poll_interval: Duration::from_millis(100),
            disable_state_poll: false,
            state_poll_interval: Duration::from_secs(1),
            finished_task_buffer: 10_000,
        }
    }
}

impl SchedulerConfig {
    /// Create a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the concurrency ceiling.
    #[must_use]
    pub const fn with_task_limit(mut self, task_limit: usize) -> Self {
        self.task_limit = task_limit;
        self
    }

    /// Set the per-task timeout.
    #[must_use]
    pub const fn with_task_timeout(mut self, task_timeout: Duration) -> Self {
        self.task_timeout = task_timeout;
        self
    }

    /// Enable or disable the finished-task stream.
    #[must_use]
    pub const fn with_finished_task_list(mut self, enabled: bool) -> Self {
        self.enable_finished_task_list = enabled;
        self
    }

    /// Set the dispatch loop's idle wait.
    #[must_use]
    pub const fn with_scheduling_poll_interval(mut self, interval: Duration) -> Self {
        self.scheduling_poll_interval = interval;
        self
    }

    /// Disable the state-reconciliation loop.
    #[must_use]
    pub const fn with_state_poll_disabled(mut self, disabled: bool) -> Self {
        self.disable_state_poll = disabled;
        self
    }

    /// Set the state-reconciliation cadence.
    #[must_use]
    pub const fn with_state_poll_interval(mut self, interval: Duration) -> Self {
        self.state_poll_interval = interval;
        self
    }

    /// Set the finished-task buffer capacity.
    #[must_use]
    pub const fn with_finished_task_buffer(mut self, capacity: usize) -> Self {
        self.finished_task_buffer = capacity;
        self
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.task_limit == 0 {
            return Err(invalid("task_limit must be greater than 0"));
        }
        if self.task_timeout.is_zero() {
            return Err(invalid("task_timeout must be greater than 0"));
        }
        if self.scheduling_poll_interval.is_zero() {
            return Err(invalid("scheduling_poll_interval must be greater than 0"));
        }
        if !self.disable_state_poll && self.state_poll_interval.is_zero() {
            return Err(invalid(
                "state_poll_interval must be greater than 0 unless the state poll is disabled",
            ));
        }
        if self.enable_finished_task_list && self.finished_task_buffer == 0 {
            return Err(invalid(
                "finished_task_buffer must be greater than 0 when the finished task list is enabled",
            ));
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] on parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, SchedulerError> {
        let cfg: Self =
            serde_json::from_str(input).map_err(|e| invalid(format!("parse error: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from `LTS_*` environment variables, reading a
    /// `.env` file first when one exists.
    ///
    /// Recognized: `LTS_TASK_LIMIT`, `LTS_TASK_TIMEOUT_MS`,
    /// `LTS_ENABLE_FINISHED_TASK_LIST`, `LTS_SCHEDULING_POLL_INTERVAL_MS`,
    /// `LTS_DISABLE_STATE_POLL`, `LTS_STATE_POLL_INTERVAL_MS`,
    /// `LTS_FINISHED_TASK_BUFFER`. Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Fails when a variable does not parse or the result is invalid.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary `LTS_*` key lookup.
    ///
    /// # Errors
    ///
    /// Fails when a value does not parse or the result is invalid.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let read = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = read("TASK_LIMIT") {
            cfg.task_limit = parse_value("TASK_LIMIT", &v)?;
        }
        if let Some(v) = read("TASK_TIMEOUT_MS") {
            cfg.task_timeout = Duration::from_millis(parse_value("TASK_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = read("ENABLE_FINISHED_TASK_LIST") {
            cfg.enable_finished_task_list = parse_value("ENABLE_FINISHED_TASK_LIST", &v)?;
        }
        if let Some(v) = read("SCHEDULING_POLL_INTERVAL_MS") {
            cfg.scheduling_poll_interval =
                Duration::from_millis(parse_value("SCHEDULING_POLL_INTERVAL_MS", &v)?);
        }
        if let Some(v) = read("DISABLE_STATE_POLL") {
            cfg.disable_state_poll = parse_value("DISABLE_STATE_POLL", &v)?;
        }
        if let Some(v) = read("STATE_POLL_INTERVAL_MS") {
            cfg.state_poll_interval =
                Duration::from_millis(parse_value("STATE_POLL_INTERVAL_MS", &v)?);
        }
        if let Some(v) = read("FINISHED_TASK_BUFFER") {
            cfg.finished_task_buffer = parse_value("FINISHED_TASK_BUFFER", &v)?;
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

fn invalid(msg: impl Into<String>) -> SchedulerError {
    SchedulerError::InvalidConfig(msg.into())
}

fn parse_value<T>(name: &str, raw: &str) -> AppResult<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("{ENV_PREFIX}{name}: cannot parse `{raw}`"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_is_valid() {
        let cfg = SchedulerConfig::default();
        assert!(cfg.task_limit > 0);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_state_poll_interval_ignored_when_disabled() {
        let cfg = SchedulerConfig::new()
            .with_state_poll_interval(Duration::ZERO)
            .with_state_poll_disabled(true);
        assert!(cfg.validate().is_ok());

        let cfg = cfg.with_state_poll_disabled(false);
        assert!(matches!(cfg.validate(), Err(SchedulerError::InvalidConfig(_))));
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("LTS_TASK_LIMIT", "2"),
            ("LTS_TASK_TIMEOUT_MS", "20000"),
            ("LTS_ENABLE_FINISHED_TASK_LIST", "true"),
            ("LTS_SCHEDULING_POLL_INTERVAL_MS", " 50 "),
        ]
        .into_iter()
        .collect();

        let cfg = SchedulerConfig::from_lookup(|k| vars.get(k).map(ToString::to_string)).unwrap();
        assert_eq!(cfg.task_limit, 2);
        assert_eq!(cfg.task_timeout, Duration::from_secs(20));
        assert!(cfg.enable_finished_task_list);
        assert_eq!(cfg.scheduling_poll_interval, Duration::from_millis(50));
        assert_eq!(cfg.state_poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = SchedulerConfig::from_lookup(|k| {
            (k == "LTS_TASK_LIMIT").then(|| "two".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("LTS_TASK_LIMIT"));

        let err = SchedulerConfig::from_lookup(|k| {
            (k == "LTS_TASK_LIMIT").then(|| "0".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("task_limit"));
    }
}
