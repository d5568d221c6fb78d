//! Configuration management for the monitor.
//!
//! This module provides configuration handling with:
//! - YAML file support
//! - Builder-style programmatic construction
//! - Validation before the engine starts (nothing is silently corrected)

use crate::core::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Smallest accepted aggregation interval.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Retry ceiling for writers unless `force` is set.
pub const MAX_WRITER_RETRIES: u32 = 10;

/// Largest accepted history depth.
pub const MAX_HISTORY_DEPTH: usize = 10_000;

/// Complete configuration for the monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Length of one aggregation bucket
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Number of retired buckets kept besides the most recent one
    pub history_depth: usize,
    /// HTTP query surface
    pub http: HttpConfig,
    /// Consumers of retired buckets
    pub writers: Vec<WriterConfig>,
    /// Persistent metrics registered at construction
    pub metrics: Vec<MetricDeclaration>,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// HTTP query surface configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Serve the query surface
    pub enabled: bool,
    /// Listen port
    pub port: u16,
    /// Bind address
    pub bind_address: IpAddr,
}

/// Configuration of a single writer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Factory tag the writer is registered under
    pub name: String,
    /// Output file
    pub path: PathBuf,
    /// Retry attempts after a failed write
    pub retries: u32,
    /// Allow more than `MAX_WRITER_RETRIES` retries
    pub force: bool,
}

/// A persistent metric declared up front
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDeclaration {
    /// Metric name
    pub name: String,
    /// Aggregation kind name, e.g. `avg` or `count_sum`
    pub kind: String,
    /// Human readable description
    #[serde(default)]
    pub description: String,
    /// Tags attached to every output line
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            interval: Duration::from_secs(60),
            history_depth: 3,
            http: HttpConfig::default(),
            writers: Vec::new(),
            metrics: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            enabled: true,
            port: 9999,
            bind_address: IpAddr::from([0, 0, 0, 0]),
        }
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        WriterConfig {
            name: String::new(),
            path: PathBuf::from("./intervalmon.txt"),
            retries: 0,
            force: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
        }
    }
}

impl WriterConfig {
    /// Writer config for the given factory tag and output path
    pub fn new<S: Into<String>, P: Into<PathBuf>>(name: S, path: P) -> Self {
        WriterConfig {
            name: name.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set the retry count
    pub fn with_retries(mut self, retries: u32, force: bool) -> Self {
        self.retries = retries;
        self.force = force;
        self
    }

    /// Validate this writer's settings
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(MonitorError::config("writer name must not be empty"));
        }

        if self.path.as_os_str().is_empty() {
            return Err(MonitorError::config(format!(
                "writer '{}' needs an output path",
                self.name
            )));
        }

        if self.retries > MAX_WRITER_RETRIES && !self.force {
            return Err(MonitorError::config(format!(
                "writer '{}' retries must be in 0-{}, set force: true to go higher (got {})",
                self.name, MAX_WRITER_RETRIES, self.retries
            )));
        }

        Ok(())
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.interval < MIN_INTERVAL {
            return Err(MonitorError::config(format!(
                "aggregation interval too small, must be >= 1s (got {:?})",
                self.interval
            )));
        }

        if self.history_depth > MAX_HISTORY_DEPTH {
            return Err(MonitorError::config(format!(
                "history depth must be in 0-{} (got {})",
                MAX_HISTORY_DEPTH, self.history_depth
            )));
        }

        validate_http_port(self.http.port)?;

        for writer in &self.writers {
            writer.validate()?;
        }

        for metric in &self.metrics {
            if metric.name.is_empty() {
                return Err(MonitorError::config("declared metric name must not be empty"));
            }
        }

        Ok(())
    }

    /// True when rotations should line up with wall-clock minutes
    pub fn aligns_to_minute(&self) -> bool {
        self.interval == Duration::from_secs(60)
    }
}

/// Validate an HTTP listen port: 1024 < port < 65535
pub fn validate_http_port(port: u16) -> Result<()> {
    if port > 1024 && port < 65535 {
        Ok(())
    } else {
        Err(MonitorError::config(format!(
            "HTTP port must be > 1024 and < 65535 (got {})",
            port
        )))
    }
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Configuration builder for programmatic construction
pub struct ConfigBuilder {
    config: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
        }
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)
            .map_err(|e| MonitorError::config(format!("Failed to parse YAML config: {}", e)))?;
        Ok(self)
    }

    /// Set the aggregation interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Set the aggregation interval in whole seconds
    pub fn interval_secs(self, secs: u64) -> Self {
        self.interval(Duration::from_secs(secs))
    }

    /// Set the number of retained history buckets
    pub fn history_depth(mut self, depth: usize) -> Self {
        self.config.history_depth = depth;
        self
    }

    /// Set the HTTP port
    pub fn http_port(mut self, port: u16) -> Self {
        self.config.http.port = port;
        self
    }

    /// Enable or disable the HTTP query surface
    pub fn http_enabled(mut self, enabled: bool) -> Self {
        self.config.http.enabled = enabled;
        self
    }

    /// Add a writer
    pub fn writer(mut self, writer: WriterConfig) -> Self {
        self.config.writers.push(writer);
        self
    }

    /// Declare a persistent metric
    pub fn metric(mut self, metric: MetricDeclaration) -> Self {
        self.config.metrics.push(metric);
        self
    }

    /// Set the log level
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.logging.level = level;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.aligns_to_minute());
    }

    #[test]
    fn test_interval_below_one_second_rejected() {
        let err = ConfigBuilder::new()
            .interval(Duration::from_millis(500))
            .build()
            .unwrap_err();
        assert_eq!(err.category(), "config");

        assert!(ConfigBuilder::new().interval_secs(1).build().is_ok());
    }

    #[test]
    fn test_history_depth_upper_bound() {
        assert!(ConfigBuilder::new().history_depth(MAX_HISTORY_DEPTH).build().is_ok());

        let err = ConfigBuilder::new()
            .history_depth(MAX_HISTORY_DEPTH + 1)
            .build()
            .unwrap_err();
        assert!(matches!(err, MonitorError::Config(_)));

        let mut config = Config::default();
        config.history_depth = usize::MAX;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_http_port_bounds() {
        assert!(validate_http_port(1024).is_err());
        assert!(validate_http_port(1025).is_ok());
        assert!(validate_http_port(65534).is_ok());
        assert!(validate_http_port(65535).is_err());
        assert!(ConfigBuilder::new().http_port(80).build().is_err());
    }

    #[test]
    fn test_writer_retry_limits() {
        let writer = WriterConfig::new("text", "/tmp/out.txt").with_retries(11, false);
        assert!(writer.validate().is_err());

        let forced = WriterConfig::new("text", "/tmp/out.txt").with_retries(11, true);
        assert!(forced.validate().is_ok());

        assert!(WriterConfig::new("", "/tmp/out.txt").validate().is_err());
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
interval: 5s
history_depth: 10
http:
  port: 9100
writers:
  - name: text
    path: /tmp/intervalmon.txt
    retries: 2
metrics:
  - name: db.query
    kind: avg
    description: query latency
    tags:
      shard: "3"
logging:
  level: debug
"#;

        let config = ConfigBuilder::new().from_yaml(yaml).unwrap().build().unwrap();

        assert_eq!(config.interval, Duration::from_secs(5));
        assert_eq!(config.history_depth, 10);
        assert_eq!(config.http.port, 9100);
        assert!(config.http.enabled);
        assert_eq!(config.writers.len(), 1);
        assert_eq!(config.writers[0].retries, 2);
        assert_eq!(config.metrics[0].kind, "avg");
        assert_eq!(config.metrics[0].tags.get("shard").map(String::as_str), Some("3"));
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert!(!config.aligns_to_minute());
    }

    #[test]
    fn test_negative_history_depth_fails_to_parse() {
        let result = ConfigBuilder::new().from_yaml("history_depth: -1\n");
        assert!(result.is_err());
    }
}
