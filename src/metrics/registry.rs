//! Metric registry: stable identities for metric names.
//!
//! Lookups by name go through a `DashMap` and never touch the table lock.
//! Allocation is a single operation under the table write lock, and a name
//! only becomes visible to lookups after the caller's install hook has run,
//! so nobody can observe an identity whose value slot does not exist yet.

use crate::metrics::kind::AggregationKind;
use dashmap::DashMap;
use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Identity of a persistent metric, unique per name for the process lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricId(pub u32);

impl MetricId {
    /// Returned when no identity could be allocated. Never resolvable and
    /// never backed by a value slot.
    pub const UNASSIGNED: MetricId = MetricId(0);

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything known about a registered metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricDescriptor {
    pub id: MetricId,
    pub name: String,
    pub kind: AggregationKind,
    pub description: String,
    pub tags: HashMap<String, String>,
    /// `key=value` pairs sorted by key; regenerated whenever tags change
    sorted_tags: Vec<String>,
}

impl MetricDescriptor {
    fn new(
        id: MetricId,
        name: &str,
        kind: AggregationKind,
        description: &str,
        tags: HashMap<String, String>,
    ) -> Self {
        let sorted_tags = encode_tags(&tags);
        Self {
            id,
            name: name.to_string(),
            kind,
            description: description.to_string(),
            tags,
            sorted_tags,
        }
    }

    /// Sorted `key=value` tag encoding
    pub fn sorted_tags(&self) -> &[String] {
        &self.sorted_tags
    }

    /// Tags as an output-line suffix: `;k1=v1;k2=v2`, empty without tags
    pub fn tag_suffix(&self) -> String {
        self.sorted_tags.iter().map(|tag| format!(";{}", tag)).collect()
    }

    fn with_tags(&self, tags: HashMap<String, String>) -> Self {
        Self {
            sorted_tags: encode_tags(&tags),
            tags,
            ..self.clone()
        }
    }
}

impl fmt::Display for MetricDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (id {}, {}): {} [{}]",
            self.name,
            self.id,
            self.kind,
            self.description,
            self.sorted_tags.join(";")
        )
    }
}

fn encode_tags(tags: &HashMap<String, String>) -> Vec<String> {
    let mut encoded: Vec<String> = tags.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    encoded.sort_unstable();
    encoded
}

/// Descriptor table, indexed by `id - 1`
#[derive(Debug, Default)]
pub struct RegistryTable {
    descriptors: Vec<Arc<MetricDescriptor>>,
}

impl RegistryTable {
    /// Descriptor for `id`
    pub fn get(&self, id: MetricId) -> Option<&Arc<MetricDescriptor>> {
        let index = usize::try_from(id.0).ok()?.checked_sub(1)?;
        self.descriptors.get(index)
    }

    /// All descriptors in id order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<MetricDescriptor>> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Bidirectional name <-> identity mapping plus metadata
#[derive(Debug, Default)]
pub struct MetricRegistry {
    index: DashMap<Arc<str>, MetricId>,
    table: RwLock<RegistryTable>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity for `name`, if registered
    #[inline]
    pub fn resolve(&self, name: &str) -> Option<MetricId> {
        self.index.get(name).map(|entry| *entry.value())
    }

    /// Descriptor for `id`
    pub fn describe(&self, id: MetricId) -> Option<Arc<MetricDescriptor>> {
        self.table.read().get(id).map(Arc::clone)
    }

    /// Get-or-allocate the identity for `name`.
    ///
    /// Concurrent first use of one name allocates exactly one identity. An
    /// existing name keeps its original kind.
    pub fn register(
        &self,
        name: &str,
        kind: AggregationKind,
        description: &str,
        tags: HashMap<String, String>,
    ) -> MetricId {
        self.register_with(name, kind, description, tags, |_| {})
    }

    /// Like [`register`](Self::register), running `install` for a newly
    /// allocated metric before it becomes resolvable.
    pub fn register_with<F>(
        &self,
        name: &str,
        kind: AggregationKind,
        description: &str,
        tags: HashMap<String, String>,
        install: F,
    ) -> MetricId
    where
        F: FnOnce(&MetricDescriptor),
    {
        if let Some(id) = self.resolve(name) {
            return id;
        }

        let mut table = self.table.write();

        // Lost the race to another registration of the same name
        if let Some(id) = self.resolve(name) {
            return id;
        }

        let Some(id) = next_id(table.descriptors.len()) else {
            tracing::error!(
                metric = name,
                allocated = table.descriptors.len(),
                "metric identities exhausted, not registering"
            );
            return MetricId::UNASSIGNED;
        };
        let descriptor = Arc::new(MetricDescriptor::new(
            id,
            name,
            kind,
            description,
            tags,
        ));

        install(&descriptor);
        table.descriptors.push(Arc::clone(&descriptor));
        self.index.insert(Arc::from(name), descriptor.id);

        tracing::debug!(metric_id = id.0, metric = name, kind = %kind, "registered metric");
        descriptor.id
    }

    /// Replace the tags of `id`, regenerating the sorted encoding.
    /// Returns false for an unknown identity.
    pub fn retag(&self, id: MetricId, tags: HashMap<String, String>) -> bool {
        let mut table = self.table.write();
        let Some(index) = usize::try_from(id.0).ok().and_then(|i| i.checked_sub(1)) else {
            return false;
        };
        match table.descriptors.get_mut(index) {
            Some(slot) => {
                *slot = Arc::new(slot.with_tags(tags));
                true
            },
            None => false,
        }
    }

    /// Read access to the whole table; holds off registrations while alive
    pub fn table(&self) -> RwLockReadGuard<'_, RegistryTable> {
        self.table.read()
    }

    /// Number of registered metrics
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Identity following `allocated` existing ones; `None` once `u32` runs out
fn next_id(allocated: usize) -> Option<MetricId> {
    u32::try_from(allocated).ok()?.checked_add(1).map(MetricId)
}

/// Read-only handle on a registry, handed to consumers and the query surface
#[derive(Debug, Clone)]
pub struct RegistryView {
    inner: Arc<MetricRegistry>,
}

impl RegistryView {
    pub fn new(registry: Arc<MetricRegistry>) -> Self {
        Self { inner: registry }
    }

    pub fn resolve(&self, name: &str) -> Option<MetricId> {
        self.inner.resolve(name)
    }

    pub fn describe(&self, id: MetricId) -> Option<Arc<MetricDescriptor>> {
        self.inner.describe(id)
    }

    pub fn table(&self) -> RwLockReadGuard<'_, RegistryTable> {
        self.inner.table()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
