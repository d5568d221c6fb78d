//! The monitoring engine.
//!
//! A [`Monitor`] owns the metric registry, the rotation store and the
//! scheduler. Recording methods never return errors to the caller: failures
//! are logged and the observation is dropped, so instrumentation cannot
//! destabilise the host program. Setup errors are returned from construction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::core::{Config, MetricDeclaration, MonitorError, Result};
use crate::export::{Writer, WriterRegistry};
use crate::metrics::{
    AggregationKind, BucketSnapshot, IntervalBucket, MetricDescriptor, MetricId, RegistryView,
    RotationStore,
};
use crate::scheduler::{Rotator, Scheduler, SchedulerState};

/// In-process metrics engine.
pub struct Monitor {
    config: Config,
    store: Arc<RotationStore>,
    rotator: Arc<Rotator>,
    scheduler: Scheduler,
    created: Instant,
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("interval", &self.config.interval)
            .field("history_depth", &self.config.history_depth)
            .field("metrics", &self.store.registry().len())
            .field("state", &self.scheduler.state())
            .finish()
    }
}

impl Monitor {
    /// Engine with the builtin writers.
    pub fn new(config: Config) -> Result<Self> {
        Self::build(config, &WriterRegistry::with_builtins(), Vec::new())
    }

    /// Engine resolving writer tags through `writers`.
    pub fn with_writer_registry(config: Config, writers: &WriterRegistry) -> Result<Self> {
        Self::build(config, writers, Vec::new())
    }

    /// Engine with extra, already constructed writers next to the configured ones.
    pub fn with_writers(config: Config, extra: Vec<Arc<dyn Writer>>) -> Result<Self> {
        Self::build(config, &WriterRegistry::with_builtins(), extra)
    }

    fn build(
        config: Config,
        registry: &WriterRegistry,
        extra: Vec<Arc<dyn Writer>>,
    ) -> Result<Self> {
        config.validate()?;

        // Parse every declared kind before allocating any identity
        let declared = config
            .metrics
            .iter()
            .map(|m| Ok((m, m.kind.parse::<AggregationKind>()?)))
            .collect::<Result<Vec<_>>>()?;

        let mut writers = registry.build_all(&config.writers)?;
        writers.extend(extra);

        let store = Arc::new(RotationStore::new(config.history_depth));
        for (declaration, kind) in declared {
            store.register(
                &declaration.name,
                kind,
                &declaration.description,
                declaration.tags.clone(),
            );
        }

        let rotator = Arc::new(Rotator::new(Arc::clone(&store), writers));
        let scheduler = Scheduler::new(
            Arc::clone(&rotator),
            config.interval,
            config.aligns_to_minute(),
        );

        tracing::info!(
            interval = ?config.interval,
            history_depth = config.history_depth,
            writers = ?rotator.writer_names(),
            metrics = store.registry().len(),
            "monitor created"
        );

        Ok(Self {
            config,
            store,
            rotator,
            scheduler,
            created: Instant::now(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<RotationStore> {
        &self.store
    }

    // Lifecycle

    /// Start the scheduler. See [`Scheduler::start`].
    pub async fn start(&self) -> Result<()> {
        self.scheduler.start().await
    }

    /// Stop the scheduler and wait for its loop to exit.
    pub async fn stop(&self) -> Result<()> {
        self.scheduler.stop().await
    }

    /// Rotate immediately and wait for every writer to finish with the
    /// retired bucket.
    pub async fn rotate_now(&self) -> Arc<IntervalBucket> {
        self.rotator.rotate().completed().await
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    // Ad-hoc recording

    /// Add `value` to the ad-hoc entry `name`.
    pub fn add(&self, name: &str, value: f64) {
        self.store.observe_adhoc(name, value);
    }

    /// Overwrite the ad-hoc entry `name`.
    pub fn set(&self, name: &str, value: f64) {
        self.store.overwrite_adhoc(name, value);
    }

    /// Increment `name` by one.
    pub fn count(&self, name: &str) {
        self.add(name, 1.0);
    }

    /// Same as [`add`](Self::add).
    pub fn sum(&self, name: &str, value: f64) {
        self.add(name, value);
    }

    /// Same as [`set`](Self::set).
    pub fn gauge(&self, name: &str, value: f64) {
        self.set(name, value);
    }

    // Persistent recording

    /// Get or register a persistent metric.
    pub fn metric(
        &self,
        name: &str,
        kind: AggregationKind,
        description: &str,
        tags: HashMap<String, String>,
    ) -> MetricId {
        self.store.register(name, kind, description, tags)
    }

    /// Register a metric whose kind is given by name.
    pub fn declare(&self, declaration: &MetricDeclaration) -> Result<MetricId> {
        let kind: AggregationKind = declaration.kind.parse()?;
        Ok(self.metric(
            &declaration.name,
            kind,
            &declaration.description,
            declaration.tags.clone(),
        ))
    }

    /// Combine `value` into persistent metric `id`.
    pub fn add_persistent(&self, id: MetricId, kind: AggregationKind, value: f64) {
        self.report(self.store.observe_persistent(id, kind, value));
    }

    /// Overwrite persistent metric `id`.
    pub fn set_persistent(&self, id: MetricId, kind: AggregationKind, value: f64) {
        self.report(self.store.overwrite_persistent(id, kind, value));
    }

    /// Register `name` on first use, then combine `value` into it.
    pub fn observe(&self, name: &str, kind: AggregationKind, value: f64) {
        let id = match self.store.registry().resolve(name) {
            Some(id) => id,
            None => self.metric(name, kind, "", HashMap::new()),
        };
        self.add_persistent(id, kind, value);
    }

    /// Time a scope into the `Avg` metric `name`, in milliseconds.
    pub fn time_avg(&self, name: &str) -> ScopedTimer<'_> {
        let id = self.metric(name, AggregationKind::Avg, "", HashMap::new());
        ScopedTimer::new(self, TimerTarget::Avg(id))
    }

    /// Time a scope into the ad-hoc entry `name`, summing milliseconds.
    pub fn time_sum(&self, name: &str) -> ScopedTimer<'_> {
        ScopedTimer::new(self, TimerTarget::Sum(name.to_string()))
    }

    /// Replace the tags of `id`. False for an unknown identity.
    pub fn retag(&self, id: MetricId, tags: HashMap<String, String>) -> bool {
        self.store.registry().retag(id, tags)
    }

    fn report(&self, result: Result<()>) {
        let Err(error) = result else {
            return;
        };

        match &error {
            MonitorError::UnknownMetric { id } => {
                tracing::warn!(
                    metric_id = *id,
                    category = error.category(),
                    "dropped observation for unknown metric"
                );
            },
            _ => tracing::warn!(category = error.category(), "dropped observation: {}", error),
        }
    }

    // Query surface; read locks only

    /// Snapshot of the bucket currently recording.
    pub fn current_snapshot(&self) -> BucketSnapshot {
        self.store.current().snapshot(&self.store.registry_view())
    }

    /// Snapshot of the bucket retired `versions_ago` rotations before the
    /// latest one.
    pub fn history_snapshot(&self, versions_ago: usize) -> Option<BucketSnapshot> {
        self.store
            .history_at(versions_ago)
            .map(|bucket| bucket.snapshot(&self.store.registry_view()))
    }

    pub fn resolve_name(&self, name: &str) -> Option<MetricId> {
        self.store.registry().resolve(name)
    }

    pub fn describe(&self, id: MetricId) -> Option<Arc<MetricDescriptor>> {
        self.store.registry().describe(id)
    }

    pub fn registry_view(&self) -> RegistryView {
        self.store.registry_view()
    }

    /// Health summary for external checks.
    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: match self.scheduler.state() {
                SchedulerState::Running | SchedulerState::Idle => "ok",
                SchedulerState::Stopping | SchedulerState::Stopped => "stopped",
            },
            version: env!("CARGO_PKG_VERSION"),
            uptime_seconds: self.created.elapsed().as_secs(),
            scheduler: self.scheduler.state(),
            interval_seconds: self.config.interval.as_secs(),
            rotations: self.scheduler.rotations(),
            metrics: self.store.registry().len(),
            current_entries: self.store.current().size(),
            history_depth: self.store.depth(),
            writers: self.rotator.writer_names(),
        }
    }
}

/// Health response for external monitoring systems.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub scheduler: SchedulerState,
    pub interval_seconds: u64,
    pub rotations: u64,
    pub metrics: usize,
    pub current_entries: usize,
    pub history_depth: usize,
    pub writers: Vec<String>,
}

#[derive(Debug)]
enum TimerTarget {
    Avg(MetricId),
    Sum(String),
}

/// Measures the time until it is ended or dropped.
///
/// Dropping records as well, so early returns and unwinding are covered.
#[must_use = "the timer records when dropped; binding it to `_` ends it immediately"]
#[derive(Debug)]
pub struct ScopedTimer<'a> {
    monitor: &'a Monitor,
    target: TimerTarget,
    started: Instant,
    recorded: bool,
}

impl<'a> ScopedTimer<'a> {
    fn new(monitor: &'a Monitor, target: TimerTarget) -> Self {
        Self {
            monitor,
            target,
            started: Instant::now(),
            recorded: false,
        }
    }

    /// Record now and return the measured time.
    pub fn end(mut self) -> Duration {
        self.record()
    }

    fn record(&mut self) -> Duration {
        let elapsed = self.started.elapsed();
        if !self.recorded {
            self.recorded = true;
            let millis = elapsed.as_secs_f64() * 1000.0;
            match &self.target {
                TimerTarget::Avg(id) => self.monitor.add_persistent(*id, AggregationKind::Avg, millis),
                TimerTarget::Sum(name) => self.monitor.add(name, millis),
            }
        }
        elapsed
    }
}

impl Drop for ScopedTimer<'_> {
    fn drop(&mut self) {
        self.record();
    }
}
