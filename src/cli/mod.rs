//! Command-line interface for intervalmon.
//!
//! Runs the engine standalone: rotation, configured writers and the HTTP
//! query surface, until interrupted. `--demo` feeds synthetic observations
//! so the output has something to show.

use crate::core::{Config, ConfigBuilder, LogLevel, MonitorError, Result};
use crate::metrics::AggregationKind;
use crate::monitoring::Monitor;
use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// In-process interval metrics aggregation
#[derive(Parser, Debug)]
#[command(name = "intervalmon")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (default: ~/.config/intervalmon/config.yaml)
    #[arg(short, long, env = "INTERVALMON_CONFIG")]
    pub config: Option<PathBuf>,

    /// Aggregation interval, e.g. "10s" or "1m"
    #[arg(short, long, env = "INTERVALMON_INTERVAL", value_parser = humantime_serde::re::humantime::parse_duration)]
    pub interval: Option<Duration>,

    /// Retired buckets kept besides the latest one
    #[arg(long, env = "INTERVALMON_HISTORY")]
    pub history: Option<usize>,

    /// HTTP port for the query surface
    #[arg(short, long, env = "INTERVALMON_PORT")]
    pub port: Option<u16>,

    /// Disable the HTTP query surface
    #[arg(long)]
    pub no_http: bool,

    /// Enable debug logging
    #[arg(short, long, env = "INTERVALMON_DEBUG")]
    pub debug: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub check_config: bool,

    /// Generate synthetic observations
    #[arg(long)]
    pub demo: bool,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Load configuration with precedence:
    /// 1. CLI arguments
    /// 2. Config file
    /// 3. Defaults
    pub async fn load_config(&self) -> Result<Config> {
        let mut builder = ConfigBuilder::new();

        let config_path = if let Some(path) = &self.config {
            path.clone()
        } else {
            let default_path = dirs::config_dir()
                .map(|d| d.join("intervalmon").join("config.yaml"))
                .unwrap_or_else(|| PathBuf::from("~/.config/intervalmon/config.yaml"));

            if default_path.exists() {
                default_path
            } else {
                return self.build_config_from_args(builder);
            }
        };

        match tokio::fs::read_to_string(&config_path).await {
            Ok(content) => {
                builder = builder.from_yaml(&content)?;
                tracing::info!("Loaded configuration from: {:?}", config_path);
            },
            Err(e) if self.config.is_some() => {
                return Err(MonitorError::config(format!(
                    "Failed to read config file {:?}: {}",
                    config_path, e
                )));
            },
            Err(_) => {
                tracing::debug!("No config file found at {:?}, using defaults", config_path);
            },
        }

        self.build_config_from_args(builder)
    }

    fn build_config_from_args(&self, mut builder: ConfigBuilder) -> Result<Config> {
        if let Some(interval) = self.interval {
            builder = builder.interval(interval);
        }
        if let Some(depth) = self.history {
            builder = builder.history_depth(depth);
        }
        if let Some(port) = self.port {
            builder = builder.http_port(port);
        }
        if self.no_http {
            builder = builder.http_enabled(false);
        }

        builder.build()
    }

    /// Install the global tracing subscriber.
    ///
    /// `--debug` wins, then `INTERVALMON_LOG`, then `RUST_LOG`, then the
    /// configured level.
    pub fn init_logging(&self, level: LogLevel) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let directive = log_directive(
            self.debug,
            std::env::var("INTERVALMON_LOG").ok(),
            std::env::var(EnvFilter::DEFAULT_ENV).ok(),
            level,
        );
        let filter = EnvFilter::try_new(&directive)
            .map_err(|e| MonitorError::config(format!("Invalid log filter '{}': {}", directive, e)))?;

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(self.debug)
            .compact();

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| MonitorError::config(format!("Failed to initialize logging: {}", e)))?;

        Ok(())
    }
}

/// Filter directive from the logging sources in precedence order.
fn log_directive(
    debug: bool,
    intervalmon_log: Option<String>,
    rust_log: Option<String>,
    level: LogLevel,
) -> String {
    if debug {
        return "debug".to_string();
    }

    intervalmon_log
        .filter(|v| !v.trim().is_empty())
        .or_else(|| rust_log.filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| level.as_str().to_string())
}

/// Execute the CLI.
pub async fn execute(cli: Cli) -> Result<()> {
    // The configured level feeds the filter, so logging starts after loading
    let config = cli.load_config().await?;
    cli.init_logging(config.logging.level)?;
    tracing::debug!(level = config.logging.level.as_str(), "logging initialised");

    if cli.check_config {
        config.validate()?;
        println!("Configuration is valid!");
        println!("  Interval: {:?}", config.interval);
        println!("  History depth: {}", config.history_depth);
        println!("  HTTP: {} (port {})", config.http.enabled, config.http.port);
        println!("  Writers: {}", config.writers.len());
        println!("  Declared metrics: {}", config.metrics.len());
        return Ok(());
    }

    run(config, cli.demo).await
}

async fn run(config: Config, demo: bool) -> Result<()> {
    let monitor = Arc::new(Monitor::new(config)?);
    let http = monitor.config().http.clone();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = if http.enabled {
        let monitor = Arc::clone(&monitor);
        Some(tokio::spawn(async move {
            let shutdown = async {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = crate::api::start_server(monitor, &http, shutdown).await {
                tracing::error!("HTTP server error: {}", e);
            }
        }))
    } else {
        None
    };

    let generator = demo.then(|| tokio::spawn(generate_demo_load(Arc::clone(&monitor))));

    // Rotation starts in the background so minute alignment does not block shutdown
    let mut scheduler = {
        let monitor = Arc::clone(&monitor);
        tokio::spawn(async move { monitor.start().await })
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("Received shutdown signal, stopping...");
            // Still waiting for the minute boundary
            scheduler.abort();
        }
        joined = &mut scheduler => {
            joined??;
            tokio::signal::ctrl_c().await?;
            tracing::info!("Received shutdown signal, stopping...");
        }
    }

    if let Some(generator) = generator {
        generator.abort();
    }
    monitor.stop().await?;

    let _ = shutdown_tx.send(());
    if let Some(server) = server {
        server.await?;
    }

    Ok(())
}

/// Synthetic traffic for `--demo`.
async fn generate_demo_load(monitor: Arc<Monitor>) {
    let latency = monitor.metric(
        "demo.request",
        AggregationKind::CountAvg,
        "synthetic request latency in ms",
        HashMap::from([("source".to_string(), "demo".to_string())]),
    );
    let sizes = monitor.metric(
        "demo.payload",
        AggregationKind::Quantile,
        "synthetic payload size in bytes",
        HashMap::new(),
    );

    let mut ticker = tokio::time::interval(Duration::from_millis(50));
    loop {
        ticker.tick().await;
        monitor.count("demo.ticks");
        monitor.add_persistent(latency, AggregationKind::CountAvg, 5.0 + rand::random::<f64>() * 45.0);
        monitor.add_persistent(sizes, AggregationKind::Quantile, rand::random::<f64>() * 4096.0);
        monitor.gauge("demo.queue", f64::from(rand::random::<u8>() % 32));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "intervalmon",
            "--interval",
            "10s",
            "--history",
            "5",
            "--port",
            "8088",
            "--no-http",
        ]);

        let config = cli.build_config_from_args(ConfigBuilder::new()).unwrap();
        assert_eq!(config.interval, Duration::from_secs(10));
        assert_eq!(config.history_depth, 5);
        assert_eq!(config.http.port, 8088);
        assert!(!config.http.enabled);
    }

    #[test]
    fn test_cli_rejects_invalid_port() {
        let cli = Cli::parse_from(["intervalmon", "--port", "80"]);
        assert!(cli.build_config_from_args(ConfigBuilder::new()).is_err());
    }

    #[test]
    fn test_log_directive_precedence() {
        assert_eq!(log_directive(false, None, None, LogLevel::Warn), "warn");
        assert_eq!(
            log_directive(false, None, Some("intervalmon=trace".to_string()), LogLevel::Warn),
            "intervalmon=trace"
        );
        assert_eq!(
            log_directive(false, Some("error".to_string()), Some("trace".to_string()), LogLevel::Warn),
            "error"
        );
        assert_eq!(
            log_directive(true, Some("error".to_string()), None, LogLevel::Warn),
            "debug"
        );
        assert_eq!(log_directive(false, Some(" ".to_string()), None, LogLevel::Trace), "trace");
    }

    #[tokio::test]
    async fn test_configured_level_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "logging:\n  level: debug\n").unwrap();

        let cli = Cli::parse_from(["intervalmon", "--config", path.to_str().unwrap()]);
        let config = cli.load_config().await.unwrap();
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(log_directive(false, None, None, config.logging.level), "debug");
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["intervalmon"]);
        assert!(!cli.debug);
        assert!(!cli.demo);
        assert!(cli.interval.is_none());
    }
}
