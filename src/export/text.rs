//! Plain-text writer.
//!
//! Output layout:
//!
//! ```text
//! 1700000040
//!
//! calls_Count=5
//! db.query_Count;db=main=3
//! db.query_Avg;db=main=12.50000
//! bytes.sent=2048.000000
//! ```
//!
//! The first line is the bucket start in unix seconds. Persistent metrics
//! follow as `name{suffix}{;k=v...}=value`, then ad-hoc entries as
//! `name=value`. The file is replaced atomically on every bucket.

use super::Writer;
use crate::core::{retry_with_config, Result, RetryConfig, WriterConfig};
use crate::metrics::{BucketSnapshot, IntervalBucket, RegistryView};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Writes the latest retired bucket to a text file
#[derive(Debug, Clone)]
pub struct TextWriter {
    path: PathBuf,
    retry: RetryConfig,
}

impl TextWriter {
    /// Registry tag
    pub const TAG: &'static str = "text";

    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            retry: RetryConfig::default(),
        }
    }

    /// Retry failed writes `retries` times with backoff
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

    /// Write `contents` to a sibling temp file, then rename it over the target
    async fn replace(&self, contents: &str) -> Result<()> {
        let tmp = temp_path(&self.path);

        if let Err(e) = tokio::fs::write(&tmp, contents).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl Writer for TextWriter {
    fn name(&self) -> &str {
        Self::TAG
    }

    async fn process(&self, registry: RegistryView, bucket: Arc<IntervalBucket>) -> Result<()> {
        let snapshot = bucket.snapshot(&registry);
        let contents = render_text(&snapshot);

        retry_with_config(&self.retry, || self.replace(&contents)).await?;

        tracing::debug!(
            writer = Self::TAG,
            path = %self.path.display(),
            bytes = contents.len(),
            "wrote bucket"
        );
        Ok(())
    }
}

/// Render a snapshot in the text layout
pub fn render_text(snapshot: &BucketSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", snapshot.started_at.timestamp());
    out.push('\n');

    for reading in &snapshot.persistent {
        for value in &reading.values {
            let _ = writeln!(
                out,
                "{}{}{}={}",
                reading.name, value.suffix, reading.tags, value.text
            );
        }
    }

    for (name, value) in &snapshot.adhoc {
        let _ = writeln!(out, "{}={:.6}", name, value);
    }

    out
}

fn temp_path(target: &Path) -> PathBuf {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "intervalmon".to_string());
    let unique = format!(
        ".{}.{}.{:08x}.tmp",
        file_name,
        std::process::id(),
        rand::random::<u32>()
    );
    target.with_file_name(unique)
}
