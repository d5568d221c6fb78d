//! Common test utilities and fixtures.

#![allow(dead_code)]

use intervalmon::core::{Config, ConfigBuilder, MonitorError, Result};
use intervalmon::export::Writer;
use intervalmon::metrics::{BucketSnapshot, IntervalBucket, RegistryView};
use intervalmon::Monitor;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Writer that records a snapshot of every bucket it receives.
pub struct CollectingWriter {
    name: String,
    seen: Mutex<Vec<BucketSnapshot>>,
    notify: Option<mpsc::UnboundedSender<BucketSnapshot>>,
}

impl CollectingWriter {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            seen: Mutex::new(Vec::new()),
            notify: None,
        })
    }

    /// Writer plus a channel receiving each snapshot as it is processed.
    pub fn with_channel(name: &str) -> (Arc<Self>, mpsc::UnboundedReceiver<BucketSnapshot>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = Arc::new(Self {
            name: name.to_string(),
            seen: Mutex::new(Vec::new()),
            notify: Some(tx),
        });
        (writer, rx)
    }

    pub fn seen(&self) -> Vec<BucketSnapshot> {
        self.seen.lock().clone()
    }
}

#[async_trait::async_trait]
impl Writer for CollectingWriter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, registry: RegistryView, bucket: Arc<IntervalBucket>) -> Result<()> {
        let snapshot = bucket.snapshot(&registry);
        self.seen.lock().push(snapshot.clone());
        if let Some(tx) = &self.notify {
            let _ = tx.send(snapshot);
        }
        Ok(())
    }
}

/// Writer that always panics.
pub struct PanickingWriter;

#[async_trait::async_trait]
impl Writer for PanickingWriter {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn process(&self, _registry: RegistryView, _bucket: Arc<IntervalBucket>) -> Result<()> {
        panic!("consumer blew up");
    }
}

/// Writer that always fails.
pub struct FailingWriter;

#[async_trait::async_trait]
impl Writer for FailingWriter {
    fn name(&self) -> &str {
        "failing"
    }

    async fn process(&self, _registry: RegistryView, _bucket: Arc<IntervalBucket>) -> Result<()> {
        Err(MonitorError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only filesystem",
        )))
    }
}

/// Config with the given interval and history depth, HTTP disabled.
pub fn config(interval: Duration, history_depth: usize) -> Config {
    ConfigBuilder::new()
        .interval(interval)
        .history_depth(history_depth)
        .http_enabled(false)
        .build()
        .unwrap()
}

/// Monitor with extra writers on top of `config`.
pub fn monitor_with(config: Config, writers: Vec<Arc<dyn Writer>>) -> Arc<Monitor> {
    Arc::new(Monitor::with_writers(config, writers).unwrap())
}

/// Text value of `name{suffix}` in a snapshot.
pub fn rendered(snapshot: &BucketSnapshot, name: &str, suffix: &str) -> Option<String> {
    snapshot
        .metric(name)
        .and_then(|m| m.value(suffix))
        .map(|v| v.text.clone())
}
