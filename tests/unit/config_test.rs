//! Tests for configuration parsing and validation

use std::time::Duration;

use light_task_scheduler::config::SchedulerConfig;
use light_task_scheduler::core::SchedulerError;

#[test]
fn test_from_json_str_uses_millisecond_fields() {
    let cfg = SchedulerConfig::from_json_str(
        r#"{
            "task_limit": 2,
            "task_timeout_ms": 20000,
            "enable_finished_task_list": true,
            "scheduling_poll_interval_ms": 50
        }"#,
    )
    .unwrap();

    assert_eq!(cfg.task_limit, 2);
    assert_eq!(cfg.task_timeout, Duration::from_secs(20));
    assert!(cfg.enable_finished_task_list);
    assert_eq!(cfg.scheduling_poll_interval, Duration::from_millis(50));
    // Missing fields fall back to defaults.
    assert_eq!(cfg.state_poll_interval, Duration::from_secs(1));
    assert_eq!(cfg.finished_task_buffer, 10_000);
}

#[test]
fn test_from_json_str_rejects_invalid() {
    assert!(matches!(
        SchedulerConfig::from_json_str(r#"{"task_limit": 0}"#),
        Err(SchedulerError::InvalidConfig(_))
    ));
    assert!(matches!(
        SchedulerConfig::from_json_str("not json"),
        Err(SchedulerError::InvalidConfig(_))
    ));
}

#[test]
fn test_json_roundtrip() {
    let cfg = SchedulerConfig::new()
        .with_task_limit(3)
        .with_task_timeout(Duration::from_millis(1500))
        .with_state_poll_disabled(true);
    let json = serde_json::to_string(&cfg).unwrap();
    assert!(json.contains(r#""task_timeout_ms":1500"#));
    assert_eq!(SchedulerConfig::from_json_str(&json).unwrap(), cfg);
}

#[test]
fn test_finished_buffer_required_when_list_enabled() {
    let cfg = SchedulerConfig::new().with_finished_task_buffer(0);
    assert!(cfg.validate().is_ok());
    assert!(cfg.with_finished_task_list(true).validate().is_err());
}

#[test]
fn test_zero_intervals_rejected() {
    assert!(SchedulerConfig::new()
        .with_scheduling_poll_interval(Duration::ZERO)
        .validate()
        .is_err());
    assert!(SchedulerConfig::new()
        .with_task_timeout(Duration::ZERO)
        .validate()
        .is_err());
}

#[cfg(feature = "sql")]
#[test]
fn test_sql_config_defaults_from_json() {
    use light_task_scheduler::config::SqlContainerConfig;

    let cfg: SqlContainerConfig =
        serde_json::from_str(r#"{"url": "sqlite:///var/lib/cuts.db", "busy_timeout_ms": 250}"#).unwrap();
    assert_eq!(cfg.url, "sqlite:///var/lib/cuts.db");
    assert_eq!(cfg.table, "tasks");
    assert_eq!(cfg.busy_timeout, Duration::from_millis(250));
    assert!(cfg.validate().is_ok());

    assert!(SqlContainerConfig::from_json_str(r#"{"table": "drop table"}"#).is_err());
}
