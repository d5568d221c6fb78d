//! Rotation scheduler and consumer dispatch.
//!
//! One background task rotates the store on a fixed period and hands each
//! retired bucket to every writer on its own task. Writer failures and panics
//! are caught and logged; they never reach the scheduler loop.

use crate::core::{MonitorError, Result};
use crate::export::Writer;
use crate::metrics::{IntervalBucket, RegistryView, RotationStore};
use chrono::{DateTime, Timelike, Utc};
use futures::FutureExt;
use parking_lot::RwLock;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Scheduler lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

impl SchedulerState {
    pub fn as_str(self) -> &'static str {
        match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Running => "running",
            SchedulerState::Stopping => "stopping",
            SchedulerState::Stopped => "stopped",
        }
    }
}

/// Result of one rotation: the retired bucket and its consumer tasks
#[derive(Debug)]
pub struct Rotation {
    pub retired: Arc<IntervalBucket>,
    pub consumers: Vec<JoinHandle<()>>,
}

impl Rotation {
    /// Wait for every consumer task of this rotation to finish
    pub async fn completed(self) -> Arc<IntervalBucket> {
        for consumer in self.consumers {
            if let Err(e) = consumer.await {
                tracing::warn!("consumer task did not complete: {}", e);
            }
        }
        self.retired
    }
}

/// Rotates the store and fans the retired bucket out to writers
pub(crate) struct Rotator {
    store: Arc<RotationStore>,
    writers: Arc<[Arc<dyn Writer>]>,
    rotations: AtomicU64,
}

impl Rotator {
    pub(crate) fn new(store: Arc<RotationStore>, writers: Vec<Arc<dyn Writer>>) -> Self {
        Self {
            store,
            writers: writers.into(),
            rotations: AtomicU64::new(0),
        }
    }

    /// Rotate once and dispatch. Must be called inside a tokio runtime.
    pub(crate) fn rotate(&self) -> Rotation {
        let retired = self.store.rotate();
        self.rotations.fetch_add(1, Ordering::Relaxed);
        let consumers = dispatch(&self.writers, &self.store.registry_view(), &retired);
        Rotation { retired, consumers }
    }

    pub(crate) fn rotations(&self) -> u64 {
        self.rotations.load(Ordering::Relaxed)
    }

    pub(crate) fn writer_names(&self) -> Vec<String> {
        self.writers.iter().map(|w| w.name().to_string()).collect()
    }
}

/// Hand `bucket` to every writer on an independent task.
///
/// Errors and panics inside a writer are recovered and logged as consumer
/// faults.
pub fn dispatch(
    writers: &[Arc<dyn Writer>],
    registry: &RegistryView,
    bucket: &Arc<IntervalBucket>,
) -> Vec<JoinHandle<()>> {
    writers
        .iter()
        .map(|writer| {
            let writer = Arc::clone(writer);
            let registry = registry.clone();
            let bucket = Arc::clone(bucket);

            tokio::spawn(async move {
                let outcome = AssertUnwindSafe(writer.process(registry, bucket))
                    .catch_unwind()
                    .await;

                match outcome {
                    Ok(Ok(())) => tracing::debug!(writer = writer.name(), "bucket consumed"),
                    Ok(Err(e)) => {
                        let fault = MonitorError::consumer_fault(writer.name(), e.to_string());
                        tracing::warn!(
                            writer = writer.name(),
                            category = e.category(),
                            "{}",
                            fault
                        );
                    },
                    Err(panic) => {
                        let fault = MonitorError::consumer_fault(writer.name(), panic_message(&*panic));
                        tracing::error!(writer = writer.name(), category = fault.category(), "{}", fault);
                    },
                }
            })
        })
        .collect()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

/// Time left until the next wall-clock minute. Exactly on a boundary this
/// is a full minute.
pub fn until_next_minute(now: DateTime<Utc>) -> Duration {
    let into_minute =
        u64::from(now.second()) * 1000 + u64::from(now.timestamp_subsec_millis()).min(999);
    Duration::from_millis(60_000 - into_minute)
}

#[derive(Default)]
struct Lifecycle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

/// Drives periodic rotation
pub struct Scheduler {
    rotator: Arc<Rotator>,
    interval: Duration,
    align_to_minute: bool,
    state: RwLock<SchedulerState>,
    lifecycle: Mutex<Lifecycle>,
}

impl Scheduler {
    pub(crate) fn new(rotator: Arc<Rotator>, interval: Duration, align_to_minute: bool) -> Self {
        Self {
            rotator,
            interval,
            align_to_minute,
            state: RwLock::new(SchedulerState::Idle),
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.read()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Completed rotations, scheduled or manual
    pub fn rotations(&self) -> u64 {
        self.rotator.rotations()
    }

    /// Start rotating.
    ///
    /// With minute alignment this first waits for the next wall-clock minute.
    /// One rotation runs before the periodic timer is armed.
    pub async fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;

        let state = self.state();
        if state != SchedulerState::Idle {
            return Err(MonitorError::invalid_operation(format!(
                "scheduler cannot start from state {}",
                state.as_str()
            )));
        }

        if self.align_to_minute {
            let wait = until_next_minute(Utc::now());
            tracing::info!("aligning first rotation to the minute, waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }

        drop(self.rotator.rotate());

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_loop(Arc::clone(&self.rotator), self.interval, shutdown_rx));

        lifecycle.shutdown = Some(shutdown_tx);
        lifecycle.task = Some(task);
        *self.state.write() = SchedulerState::Running;

        tracing::info!(interval = ?self.interval, "scheduler started");
        Ok(())
    }

    /// Stop rotating and wait for the loop to exit.
    ///
    /// A rotation in progress finishes first. Stopping an idle scheduler
    /// moves it straight to `Stopped`.
    pub async fn stop(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;

        match self.state() {
            SchedulerState::Stopped => return Ok(()),
            SchedulerState::Idle => {
                *self.state.write() = SchedulerState::Stopped;
                return Ok(());
            },
            SchedulerState::Running | SchedulerState::Stopping => {},
        }

        *self.state.write() = SchedulerState::Stopping;
        if let Some(shutdown) = lifecycle.shutdown.take() {
            let _ = shutdown.send(());
        }

        let joined = match lifecycle.task.take() {
            Some(task) => task.await,
            None => Ok(()),
        };
        *self.state.write() = SchedulerState::Stopped;
        joined?;

        tracing::info!(rotations = self.rotations(), "scheduler stopped");
        Ok(())
    }
}

async fn run_loop(rotator: Arc<Rotator>, period: Duration, mut shutdown: oneshot::Receiver<()>) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                drop(rotator.rotate());
            }
            _ = &mut shutdown => {
                tracing::debug!("rotation loop received shutdown");
                break;
            }
        }
    }
}
