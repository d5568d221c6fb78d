//! One accumulation window.
//!
//! A bucket holds ad-hoc observations (`name -> f64`) and persistent ones
//! (`MetricId -> AggregatorValue`) behind independent locks, so the two
//! recording paths never contend. Persistent values carry their own mutex;
//! recording only needs the map's read lock, and the write lock is taken
//! only to install a freshly registered metric.

use crate::core::{MonitorError, Result};
use crate::metrics::kind::AggregationKind;
use crate::metrics::registry::{MetricId, RegistryView};
use crate::metrics::value::AggregatorValue;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Accumulation window for one rotation interval
#[derive(Debug)]
pub struct IntervalBucket {
    started_at: DateTime<Utc>,
    adhoc: RwLock<HashMap<String, f64>>,
    persistent: RwLock<HashMap<MetricId, Mutex<AggregatorValue>>>,
}

impl Default for IntervalBucket {
    fn default() -> Self {
        Self::new()
    }
}

impl IntervalBucket {
    /// Empty bucket starting now
    pub fn new() -> Self {
        Self::seeded(std::iter::empty())
    }

    /// Bucket with a zeroed value per `(id, kind)`
    pub fn seeded<I>(templates: I) -> Self
    where
        I: IntoIterator<Item = (MetricId, AggregationKind)>,
    {
        let persistent = templates
            .into_iter()
            .map(|(id, kind)| (id, Mutex::new(AggregatorValue::new(kind))))
            .collect();

        Self {
            started_at: Utc::now(),
            adhoc: RwLock::new(HashMap::new()),
            persistent: RwLock::new(persistent),
        }
    }

    /// When this window opened
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Add `value` to the ad-hoc entry `name`, creating it at zero
    pub fn add_adhoc(&self, name: &str, value: f64) {
        let mut adhoc = self.adhoc.write();
        match adhoc.get_mut(name) {
            Some(current) => *current += value,
            None => {
                adhoc.insert(name.to_string(), value);
            },
        }
    }

    /// Overwrite the ad-hoc entry `name`
    pub fn set_adhoc(&self, name: &str, value: f64) {
        let mut adhoc = self.adhoc.write();
        match adhoc.get_mut(name) {
            Some(current) => *current = value,
            None => {
                adhoc.insert(name.to_string(), value);
            },
        }
    }

    /// Combine `value` into the persistent metric `id`
    pub fn add_persistent(&self, id: MetricId, kind: AggregationKind, value: f64) -> Result<()> {
        let persistent = self.persistent.read();
        let slot = persistent.get(&id).ok_or(MonitorError::UnknownMetric { id: id.0 })?;
        let result = slot.lock().combine(kind, value);
        result
    }

    /// Overwrite the persistent metric `id`
    pub fn set_persistent(&self, id: MetricId, kind: AggregationKind, value: f64) -> Result<()> {
        let persistent = self.persistent.read();
        let slot = persistent.get(&id).ok_or(MonitorError::UnknownMetric { id: id.0 })?;
        let result = slot.lock().overwrite(kind, value);
        result
    }

    /// Install a zeroed value for a metric registered after this bucket was
    /// created. Existing values are left alone.
    pub fn install(&self, id: MetricId, kind: AggregationKind) {
        self.persistent
            .write()
            .entry(id)
            .or_insert_with(|| Mutex::new(AggregatorValue::new(kind)));
    }

    /// Current ad-hoc value
    pub fn adhoc(&self, name: &str) -> Option<f64> {
        self.adhoc.read().get(name).copied()
    }

    /// Copy of the persistent value for `id`
    pub fn persistent(&self, id: MetricId) -> Option<AggregatorValue> {
        self.persistent.read().get(&id).map(|slot| slot.lock().clone())
    }

    /// Distinct ad-hoc plus persistent entries
    pub fn size(&self) -> usize {
        self.adhoc.read().len() + self.persistent.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Render the whole bucket against `registry`.
    ///
    /// The registry table is read before any bucket lock, the same order
    /// registration uses.
    pub fn snapshot(&self, registry: &RegistryView) -> BucketSnapshot {
        let table = registry.table();

        let mut persistent: Vec<PersistentReading> = {
            let values = self.persistent.read();
            values
                .iter()
                .filter_map(|(id, slot)| {
                    let descriptor = table.get(*id)?;
                    let value = slot.lock();
                    Some(PersistentReading::new(
                        descriptor.name.clone(),
                        *id,
                        descriptor.kind,
                        descriptor.tag_suffix(),
                        &value,
                    ))
                })
                .collect()
        };
        drop(table);
        persistent.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

        let adhoc = self
            .adhoc
            .read()
            .iter()
            .map(|(name, value)| (name.clone(), *value))
            .collect();

        BucketSnapshot {
            started_at: self.started_at,
            adhoc,
            persistent,
        }
    }
}

/// Frozen, serialisable copy of a bucket
#[derive(Debug, Clone, Serialize)]
pub struct BucketSnapshot {
    pub started_at: DateTime<Utc>,
    pub adhoc: BTreeMap<String, f64>,
    pub persistent: Vec<PersistentReading>,
}

impl BucketSnapshot {
    /// Persistent reading for metric `name`
    pub fn metric(&self, name: &str) -> Option<&PersistentReading> {
        self.persistent.iter().find(|reading| reading.name == name)
    }
}

/// Rendered outputs of one persistent metric
#[derive(Debug, Clone, Serialize)]
pub struct PersistentReading {
    pub name: String,
    pub id: MetricId,
    pub kind: AggregationKind,
    /// `;k=v` encoded tags, empty without tags
    pub tags: String,
    pub values: Vec<RenderedValue>,
}

/// One output line of a persistent metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedValue {
    pub suffix: &'static str,
    /// Formatted as written by the text writer
    pub text: String,
    /// Numeric value; NaN and infinities serialise as null
    pub value: f64,
}

impl PersistentReading {
    fn new(
        name: String,
        id: MetricId,
        kind: AggregationKind,
        tags: String,
        value: &AggregatorValue,
    ) -> Self {
        let values = kind
            .suffixes()
            .iter()
            .zip(value.readings())
            .map(|(suffix, reading)| RenderedValue {
                suffix: *suffix,
                text: reading.to_string(),
                value: reading.as_f64(),
            })
            .collect();

        Self {
            name,
            id,
            kind,
            tags,
            values,
        }
    }

    /// Rendered value for `suffix`, e.g. `"_Count"`
    pub fn value(&self, suffix: &str) -> Option<&RenderedValue> {
        self.values.iter().find(|v| v.suffix == suffix)
    }
}
