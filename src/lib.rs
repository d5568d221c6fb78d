//! intervalmon - in-process interval metrics aggregation.
//!
//! Application code records counters, sums, averages and quantile
//! observations under arbitrary names. The engine accumulates them into
//! fixed-length buckets, rotates buckets on a schedule, keeps a bounded
//! history of retired buckets and hands every retired bucket to pluggable
//! writers.
//!
//! # Architecture
//!
//! - `metrics`: aggregation kinds, accumulators, registry, buckets, rotation store
//! - `scheduler`: periodic rotation and writer dispatch
//! - `export`: writer trait, writer registry, text and JSON writers
//! - `monitoring`: the [`Monitor`] engine tying it together
//! - `api`: read-only HTTP query surface
//! - `core`: configuration, errors, retry
//! - `cli`: command-line interface
//!
//! # Example
//!
//! ```no_run
//! use intervalmon::core::Config;
//! use intervalmon::metrics::AggregationKind;
//! use intervalmon::Monitor;
//! use std::collections::HashMap;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let monitor = Monitor::new(Config::default())?;
//!     monitor.start().await?;
//!
//!     let calls = monitor.metric("calls", AggregationKind::Count, "handled calls", HashMap::new());
//!     monitor.add_persistent(calls, AggregationKind::Count, 1.0);
//!
//!     {
//!         let _timer = monitor.time_avg("handler.latency");
//!         // work
//!     }
//!
//!     monitor.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! Logging goes through `tracing`; the library never installs a subscriber.

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod api;
pub mod cli;
pub mod core;
pub mod export;
pub mod metrics;
pub mod monitoring;
pub mod scheduler;

// Re-export core types for convenience
pub use crate::core::{Config, MonitorError, Result};
pub use crate::monitoring::{Monitor, ScopedTimer};
