//! Configuration system tests.

use intervalmon::core::{Config, ConfigBuilder, LogLevel, MonitorError, WriterConfig};
use intervalmon::Monitor;
use std::time::Duration;

#[test]
fn test_default_config() {
    let config = Config::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.interval, Duration::from_secs(60));
    assert_eq!(config.history_depth, 3);
    assert_eq!(config.http.port, 9999);
    assert!(config.writers.is_empty());
    assert_eq!(config.logging.level, LogLevel::Info);
}

#[test]
fn test_config_builder() {
    let config = ConfigBuilder::new()
        .interval_secs(15)
        .history_depth(0)
        .http_port(9191)
        .writer(WriterConfig::new("json", "/var/tmp/buckets.jsonl").with_retries(3, false))
        .log_level(LogLevel::Warn)
        .build()
        .unwrap();

    assert_eq!(config.interval, Duration::from_secs(15));
    assert_eq!(config.history_depth, 0);
    assert_eq!(config.http.port, 9191);
    assert_eq!(config.writers[0].retries, 3);
    assert_eq!(config.logging.level, LogLevel::Warn);
}

#[test]
fn test_yaml_config() {
    let yaml = r#"
interval: 1m
history_depth: 5
http:
  enabled: false
  port: 8081
  bind_address: 127.0.0.1
writers:
  - name: text
    path: /tmp/intervalmon.txt
  - name: json
    path: /tmp/intervalmon.jsonl
    retries: 20
    force: true
metrics:
  - name: rpc.latency
    kind: quantile
  - name: rpc.calls
    kind: count
    tags:
      service: billing
"#;

    let config = ConfigBuilder::new().from_yaml(yaml).unwrap().build().unwrap();

    assert!(config.aligns_to_minute());
    assert_eq!(config.history_depth, 5);
    assert!(!config.http.enabled);
    assert_eq!(config.http.bind_address.to_string(), "127.0.0.1");
    assert_eq!(config.writers.len(), 2);
    assert!(config.writers[1].force);
    assert_eq!(config.metrics[1].tags["service"], "billing");
}

#[test]
fn test_invalid_values_are_rejected() {
    let too_fast = ConfigBuilder::new().interval(Duration::from_millis(10)).build();
    assert!(matches!(too_fast, Err(MonitorError::Config(_))));

    let bad_port = ConfigBuilder::new().http_port(1024).build();
    assert!(matches!(bad_port, Err(MonitorError::Config(_))));

    let too_many_retries = ConfigBuilder::new()
        .writer(WriterConfig::new("text", "/tmp/out.txt").with_retries(50, false))
        .build();
    assert!(matches!(too_many_retries, Err(MonitorError::Config(_))));
}

#[test]
fn test_invalid_config_fails_monitor_construction() {
    let mut config = Config::default();
    config.interval = Duration::ZERO;

    let err = Monitor::new(config).unwrap_err();
    assert_eq!(err.category(), "config");
}

#[test]
fn test_huge_history_depth_fails_monitor_construction() {
    let mut config = Config::default();
    config.history_depth = usize::MAX;

    let err = Monitor::new(config).unwrap_err();
    assert!(matches!(err, MonitorError::Config(_)));
}

#[test]
fn test_malformed_yaml() {
    let result = ConfigBuilder::new().from_yaml("interval: [not, a, duration]\n");
    assert!(matches!(result, Err(MonitorError::Config(_))));
}
