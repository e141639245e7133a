//! Timer seam driving the recovery watchdog
//!
//! Production code uses [`IntervalTimer`] on the tokio runtime. Tests use
//! [`ManualTimer`] and fire ticks explicitly, which keeps every background
//! check deterministic.

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Callback run on every tick
pub type TickFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[async_trait]
pub trait Timer: Send + Sync {
    /// Start ticking; a running timer is restarted with the new callback
    async fn start(&self, tick: TickFn);

    fn stop(&self);
}

/// Tokio interval timer with an initial due time
#[derive(Debug)]
pub struct IntervalTimer {
    due: Duration,
    period: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl IntervalTimer {
    pub fn new(due: Duration, period: Duration) -> Self {
        Self {
            due,
            period,
            task: Mutex::new(None),
        }
    }

    /// First tick right away, then every `period`
    pub fn immediate(period: Duration) -> Self {
        Self::new(Duration::ZERO, period)
    }
}

#[async_trait]
impl Timer for IntervalTimer {
    async fn start(&self, tick: TickFn) {
        let due = self.due;
        let period = self.period.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            tokio::time::sleep(due).await;
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                tick().await;
            }
        });

        if let Some(previous) = self.task.lock().replace(handle) {
            previous.abort();
        }
        debug!(due = ?self.due, period = ?self.period, "Interval timer started");
    }

    fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            debug!("Interval timer stopped");
        }
    }
}

impl Drop for IntervalTimer {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

/// Timer fired by hand
#[derive(Default)]
pub struct ManualTimer {
    fire_on_start: bool,
    tick: Mutex<Option<TickFn>>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire once while `start` runs
    pub fn firing_on_start() -> Self {
        Self {
            fire_on_start: true,
            tick: Mutex::new(None),
        }
    }

    pub fn is_started(&self) -> bool {
        self.tick.lock().is_some()
    }

    /// Run one tick; does nothing while stopped
    pub async fn fire(&self) {
        let tick = self.tick.lock().clone();
        if let Some(tick) = tick {
            tick().await;
        }
    }
}

#[async_trait]
impl Timer for ManualTimer {
    async fn start(&self, tick: TickFn) {
        *self.tick.lock() = Some(Arc::clone(&tick));
        if self.fire_on_start {
            tick().await;
        }
    }

    fn stop(&self) {
        self.tick.lock().take();
    }
}

impl std::fmt::Debug for ManualTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualTimer")
            .field("fire_on_start", &self.fire_on_start)
            .field("started", &self.is_started())
            .finish()
    }
}
