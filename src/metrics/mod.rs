//! Metric identities, accumulators and interval buckets.
//!
//! Leaves first:
//! - `kind`: aggregation kinds and their output suffixes
//! - `value`: per-metric accumulator
//! - `registry`: name <-> identity mapping
//! - `bucket`: one accumulation window
//! - `store`: current bucket plus history ring

pub mod bucket;
pub mod kind;
pub mod registry;
pub mod store;
pub mod value;

pub use bucket::{BucketSnapshot, IntervalBucket, PersistentReading, RenderedValue};
pub use kind::{AggregationKind, REPORTED_QUANTILES};
pub use registry::{MetricDescriptor, MetricId, MetricRegistry, RegistryTable, RegistryView};
pub use store::RotationStore;
pub use value::{format_float, AggregatorValue, Reading};
