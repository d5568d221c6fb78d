//! Consumers of retired buckets.
//!
//! A writer receives every retired bucket together with a read-only view of
//! the registry. Writers are looked up by tag in a [`WriterRegistry`] so the
//! configuration can name them; `text` and `json` are built in.

mod json;
mod text;

pub use json::JsonWriter;
pub use text::{render_text, TextWriter};

use crate::core::{MonitorError, Result, WriterConfig};
use crate::metrics::{IntervalBucket, RegistryView};
use std::collections::HashMap;
use std::sync::Arc;

/// Trait for bucket consumers.
///
/// `process` runs on its own task and may overlap with later rotations; the
/// bucket it receives is already retired and no longer written to.
#[async_trait::async_trait]
pub trait Writer: Send + Sync {
    /// Name used in logs and fault reports.
    fn name(&self) -> &str;

    /// Consume one retired bucket.
    async fn process(&self, registry: RegistryView, bucket: Arc<IntervalBucket>) -> Result<()>;
}

/// Builds a writer from its configuration.
pub type WriterFactory = fn(&WriterConfig) -> Result<Arc<dyn Writer>>;

/// Map from writer tag to factory.
#[derive(Clone)]
pub struct WriterRegistry {
    factories: HashMap<String, WriterFactory>,
}

impl Default for WriterRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for WriterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterRegistry")
            .field("tags", &self.tags())
            .finish()
    }
}

impl WriterRegistry {
    /// Registry without any writers.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the `text` and `json` writers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(TextWriter::TAG, TextWriter::from_config);
        registry.register(JsonWriter::TAG, JsonWriter::from_config);
        registry
    }

    /// Register `factory` under `tag`, replacing any earlier one.
    pub fn register(&mut self, tag: &str, factory: WriterFactory) {
        if self.factories.insert(tag.to_string(), factory).is_some() {
            tracing::debug!(writer = tag, "replaced writer factory");
        }
    }

    /// Whether a factory exists for `tag`.
    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    /// Registered tags, sorted.
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    /// Build the writer `config` names.
    pub fn build(&self, config: &WriterConfig) -> Result<Arc<dyn Writer>> {
        let factory = self
            .factories
            .get(&config.name)
            .ok_or_else(|| MonitorError::WriterNotFound(config.name.clone()))?;
        factory(config)
    }

    /// Build every configured writer, failing on the first error.
    pub fn build_all(&self, configs: &[WriterConfig]) -> Result<Vec<Arc<dyn Writer>>> {
        configs.iter().map(|config| self.build(config)).collect()
    }
}
