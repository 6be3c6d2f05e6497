use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::time::{sleep, Duration};

use crate::errors::Error;
use crate::scheduler::SyncScheduler;

/// First call returns immediately; later calls take `run_secs`.
fn slow_after_first(calls: Arc<AtomicUsize>, interval_secs: u64, run_secs: u64) -> SyncScheduler {
    SyncScheduler::from_fn(interval_secs, move || {
        let calls = calls.clone();
        async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n > 1 {
                sleep(Duration::from_secs(run_secs)).await;
            }
            Ok(())
        }
    })
}

#[tokio::test(start_paused = true)]
async fn test_start_runs_immediately_then_arms_timer() {
    let calls = Arc::new(AtomicUsize::new(0));
    let scheduler = slow_after_first(calls.clone(), 10, 0);

    scheduler.start().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(scheduler.is_running());
    assert!(!scheduler.is_sync_in_progress());

    sleep(Duration::from_secs(25)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_tick_is_skipped() {
    let calls = Arc::new(AtomicUsize::new(0));
    let scheduler = slow_after_first(calls.clone(), 1, 5);

    scheduler.start().await.unwrap();

    // t=1.5: the tick at t=1 started a run that lasts until t=6.
    sleep(Duration::from_millis(1_500)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(scheduler.is_sync_in_progress());

    // t=3.5: ticks at t=2 and t=3 found the run active.
    sleep(Duration::from_secs(2)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // t=7.5: the run finished at t=6, the next tick started a new one.
    sleep(Duration::from_secs(4)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_update_interval_restarts_running_scheduler() {
    let calls = Arc::new(AtomicUsize::new(0));
    let scheduler = slow_after_first(calls.clone(), 60, 0);

    scheduler.start().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    scheduler.update_interval(30).await.unwrap();

    assert_eq!(scheduler.interval_seconds(), 30);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(scheduler.is_running());

    sleep(Duration::from_secs(31)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_update_interval_when_idle_only_stores_value() {
    let calls = Arc::new(AtomicUsize::new(0));
    let scheduler = slow_after_first(calls.clone(), 60, 0);

    scheduler.update_interval(15).await.unwrap();

    assert_eq!(scheduler.interval_seconds(), 15);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!scheduler.is_running());
    assert!(matches!(
        scheduler.update_interval(0).await,
        Err(Error::Config(_))
    ));
}

#[tokio::test]
async fn test_failed_initial_run_does_not_arm_timer() {
    let scheduler = SyncScheduler::from_fn(5, || async {
        Err(Error::transfer("device rejected payload"))
    });

    let result = scheduler.start().await;

    assert!(matches!(result, Err(Error::Transfer(_))));
    assert!(!scheduler.is_running());
    assert!(!scheduler.is_sync_in_progress());
}

#[tokio::test(start_paused = true)]
async fn test_tick_failures_are_contained() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let scheduler = SyncScheduler::from_fn(1, move || {
        let counter = counter.clone();
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(())
            } else {
                Err(Error::connection("tv unreachable"))
            }
        }
    });

    scheduler.start().await.unwrap();
    sleep(Duration::from_millis(3_500)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert!(scheduler.is_running());
    assert!(!scheduler.is_sync_in_progress());
}

#[tokio::test(start_paused = true)]
async fn test_stop_does_not_cancel_in_flight_run() {
    let calls = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicBool::new(false));
    let (counter, done) = (calls.clone(), finished.clone());
    let scheduler = SyncScheduler::from_fn(1, move || {
        let counter = counter.clone();
        let done = done.clone();
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) > 0 {
                sleep(Duration::from_secs(3)).await;
                done.store(true, Ordering::SeqCst);
            }
            Ok(())
        }
    });

    scheduler.start().await.unwrap();
    sleep(Duration::from_millis(1_500)).await;
    assert!(scheduler.is_sync_in_progress());

    scheduler.stop();
    assert!(!scheduler.is_running());

    sleep(Duration::from_secs(5)).await;
    assert!(finished.load(Ordering::SeqCst));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!scheduler.is_sync_in_progress());
}
