//! Configuration, error taxonomy and shared utilities.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod retry;

// Re-export commonly used types
pub use config::{
    Config, ConfigBuilder, HttpConfig, LogLevel, LoggingConfig, MetricDeclaration, WriterConfig,
    MAX_HISTORY_DEPTH,
};
pub use error::{MonitorError, Result};
pub use retry::{retry_with_config, RetryConfig};
