//! JSON Lines writer: one object per retired bucket, appended.

use super::Writer;
use crate::core::{retry_with_config, Result, RetryConfig, WriterConfig};
use crate::metrics::{IntervalBucket, RegistryView};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// Appends every retired bucket as a JSON object on its own line.
///
/// Non-finite floats serialise as `null`.
#[derive(Debug, Clone)]
pub struct JsonWriter {
    path: PathBuf,
    retry: RetryConfig,
}

impl JsonWriter {
    /// Registry tag
    pub const TAG: &'static str = "json";

    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retry = RetryConfig::with_retries(retries);
        self
    }

    pub(crate) fn from_config(config: &WriterConfig) -> Result<Arc<dyn Writer>> {
        config.validate()?;
        Ok(Arc::new(Self::new(&config.path).with_retries(config.retries)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, line: &[u8]) -> Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Writer for JsonWriter {
    fn name(&self) -> &str {
        Self::TAG
    }

    async fn process(&self, registry: RegistryView, bucket: Arc<IntervalBucket>) -> Result<()> {
        let snapshot = bucket.snapshot(&registry);
        let mut line = serde_json::to_vec(&snapshot)?;
        line.push(b'\n');

        retry_with_config(&self.retry, || self.append(&line)).await?;

        tracing::debug!(writer = Self::TAG, path = %self.path.display(), "appended bucket");
        Ok(())
    }
}
