//! Durable SQL container configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::SchedulerError;

/// Connection settings for [`SqlContainer`](crate::infra::container::SqlContainer).
///
/// The database location (path, or host/port/credentials for networked
/// drivers) is carried by `url`, e.g. `sqlite:///var/lib/tasks.db`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlContainerConfig {
    /// Connection URL.
    pub url: String,
    /// Table holding task rows; created on connect.
    pub table: String,
    /// Connection pool size.
    pub max_connections: u32,
    /// How long a statement waits on a locked database before failing.
    #[serde(rename = "busy_timeout_ms", with = "crate::util::duration_ms")]
    pub busy_timeout: Duration,
}

impl Default for SqlContainerConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://light_task_scheduler.db".into(),
            table: "tasks".into(),
            max_connections: 5,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl SqlContainerConfig {
    /// Configuration for the given URL with default settings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Set the table name.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Set the connection pool size.
    #[must_use]
    pub const fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Set the busy timeout.
    #[must_use]
    pub const fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] for an empty URL, a table
    /// name that is not a plain SQL identifier, or an empty pool.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.url.trim().is_empty() {
            return Err(SchedulerError::InvalidConfig("url must not be empty".into()));
        }
        if !is_identifier(&self.table) {
            return Err(SchedulerError::InvalidConfig(format!(
                "table `{}` is not a valid identifier",
                self.table
            )));
        }
        if self.max_connections == 0 {
            return Err(SchedulerError::InvalidConfig(
                "max_connections must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] on parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, SchedulerError> {
        let cfg: Self = serde_json::from_str(input)
            .map_err(|e| SchedulerError::InvalidConfig(format!("parse error: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

/// ASCII letter or underscore first, then letters, digits or underscores.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_identifier_rules() {
        assert!(is_identifier("tasks"));
        assert!(is_identifier("_video_cut_2"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("2tasks"));
        assert!(!is_identifier("tasks; DROP TABLE x"));
        assert!(!is_identifier("my-tasks"));
    }

    #[test]
    fn test_validate() {
        assert!(SqlContainerConfig::default().validate().is_ok());
        assert!(SqlContainerConfig::new(" ").validate().is_err());
        assert!(SqlContainerConfig::default()
            .with_max_connections(0)
            .validate()
            .is_err());
        assert!(SqlContainerConfig::default()
            .with_table("bad table")
            .validate()
            .is_err());
    }
}
