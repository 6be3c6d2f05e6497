//! Background scheduler for periodic sync runs.
//!
//! `Idle -> Running -> Idle`, driven by a fixed-period timer task. At most one
//! run is active per scheduler; ticks that land while a run is in progress
//! are dropped, not queued. Stopping the timer never interrupts a run.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, error, info};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

use crate::errors::{Error, Result};

/// Zero-argument async unit of work run on every tick.
pub type SyncTask = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

struct SchedulerInner {
    task: SyncTask,
    interval_secs: AtomicU64,
    in_progress: AtomicBool,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl SchedulerInner {
    fn timer(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.timer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Clears the in-progress flag when dropped, including on panic.
struct RunGuard {
    inner: Arc<SchedulerInner>,
}

impl RunGuard {
    fn try_acquire(inner: &Arc<SchedulerInner>) -> Option<Self> {
        inner
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                inner: Arc::clone(inner),
            })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.inner.in_progress.store(false, Ordering::Release);
    }
}

/// Periodic sync driver.
///
/// # Example
///
/// ```ignore
/// let service = Arc::new(SyncService::default());
/// let scheduler = SyncScheduler::from_fn(300, move || {
///     let service = service.clone();
///     let cloud = cloud.clone();
///     let tv = tv.clone();
///     async move { service.sync_legacy(cloud.as_ref(), tv.as_ref()).await.map(|_| ()) }
/// });
/// scheduler.start().await?;
/// ```
pub struct SyncScheduler {
    inner: Arc<SchedulerInner>,
}

impl SyncScheduler {
    pub fn new(interval_secs: u64, task: SyncTask) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                task,
                interval_secs: AtomicU64::new(interval_secs),
                in_progress: AtomicBool::new(false),
                timer: Mutex::new(None),
            }),
        }
    }

    /// Build a scheduler from any closure returning a future.
    pub fn from_fn<F, Fut>(interval_secs: u64, task: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::new(interval_secs, Arc::new(move || task().boxed()))
    }

    /// Whether the repeating timer is armed.
    pub fn is_running(&self) -> bool {
        self.inner.timer().is_some()
    }

    pub fn is_sync_in_progress(&self) -> bool {
        self.inner.in_progress.load(Ordering::Acquire)
    }

    pub fn interval_seconds(&self) -> u64 {
        self.inner.interval_secs.load(Ordering::Acquire)
    }

    /// Runs one sync immediately, then arms the repeating timer.
    ///
    /// An error from the immediate run is returned and the timer is not armed.
    pub async fn start(&self) -> Result<()> {
        if self.is_running() {
            debug!("Sync scheduler already running");
            return Ok(());
        }

        match RunGuard::try_acquire(&self.inner) {
            Some(guard) => {
                info!("Running initial sync...");
                let result = (self.inner.task)().await;
                drop(guard);
                result?;
            }
            None => info!("Initial sync skipped: a sync is already in progress"),
        }

        self.arm_timer();
        Ok(())
    }

    /// Cancels the timer. A run already in progress continues to completion.
    pub fn stop(&self) {
        if let Some(handle) = self.inner.timer().take() {
            handle.abort();
            info!("Sync scheduler stopped");
        }
    }

    /// Changes the period. A running scheduler is restarted, which triggers
    /// an immediate run.
    pub async fn update_interval(&self, interval_secs: u64) -> Result<()> {
        if interval_secs == 0 {
            return Err(Error::Config("sync interval must be at least 1 second".into()));
        }
        self.inner
            .interval_secs
            .store(interval_secs, Ordering::Release);
        info!("Sync interval set to {}s", interval_secs);

        if self.is_running() {
            self.stop();
            self.start().await?;
        }
        Ok(())
    }

    fn arm_timer(&self) {
        let period = Duration::from_secs(self.interval_seconds().max(1));
        let inner = Arc::clone(&self.inner);

        let handle = tokio::spawn(async move {
            // Fixed schedule from the arm time; late ticks are skipped rather
            // than bunched up.
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                run_tick(&inner);
            }
        });

        let mut timer = self.inner.timer();
        if let Some(previous) = timer.replace(handle) {
            previous.abort();
        }
        info!("Sync scheduler started ({}s interval)", period.as_secs());
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.inner.timer().take() {
            handle.abort();
        }
    }
}

fn run_tick(inner: &Arc<SchedulerInner>) {
    let Some(guard) = RunGuard::try_acquire(inner) else {
        info!("Sync already in progress, skipping this tick");
        return;
    };

    let task = Arc::clone(&inner.task);
    tokio::spawn(async move {
        let _guard = guard;
        debug!("Running scheduled sync...");
        match task().await {
            Ok(()) => debug!("Scheduled sync completed"),
            Err(err) => error!("Scheduled sync failed: {}", err),
        }
    });
}
