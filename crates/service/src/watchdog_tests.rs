// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::config::WatchedProcess;
use lf_adapters::FakeHostMonitor;
use lf_core::FakeClock;
use std::sync::atomic::{AtomicU32, Ordering};

const GIB: u64 = 1024 * 1024 * 1024;

fn config(warn: f64, cleanup: f64, abort: f64) -> WatchdogConfig {
    WatchdogConfig { warn_gb: warn, cleanup_gb: cleanup, abort_gb: abort, ..WatchdogConfig::default() }
}

fn watchdog(
    host: &FakeHostMonitor,
    config: &WatchdogConfig,
) -> Watchdog<FakeHostMonitor, FakeClock> {
    Watchdog::new(host.clone(), FakeClock::new(), config, WatchdogStatsHandle::new()).unwrap()
}

#[test]
fn normal_sample_above_all_thresholds() {
    let host = FakeHostMonitor::new(100 * GIB, 50 * GIB);
    let mut dog = watchdog(&host, &config(10.0, 5.0, 2.0));
    assert_eq!(dog.tick(), WatchdogVerdict::Normal);
    let stats = dog.stats().snapshot();
    assert_eq!(stats.min_free_bytes, Some(50 * GIB));
    assert_eq!(stats.warn_count, 0);
}

#[test]
fn warn_sample() {
    let host = FakeHostMonitor::new(100 * GIB, 8 * GIB);
    let mut dog = watchdog(&host, &config(10.0, 5.0, 2.0));
    assert_eq!(dog.tick(), WatchdogVerdict::Warned);
    assert_eq!(dog.stats().snapshot().warn_count, 1);
}

#[test]
fn cleanup_sample_invokes_cache_clear() {
    let host = FakeHostMonitor::new(100 * GIB, 4 * GIB);
    let cleared = Arc::new(AtomicU32::new(0));
    let hook = {
        let cleared = cleared.clone();
        Arc::new(move || {
            cleared.fetch_add(1, Ordering::SeqCst);
        }) as Arc<dyn Fn() + Send + Sync>
    };
    let mut dog = watchdog(&host, &config(10.0, 5.0, 2.0)).with_cache_clear(hook);
    assert_eq!(dog.tick(), WatchdogVerdict::Cleaned);
    assert_eq!(cleared.load(Ordering::SeqCst), 1);
}

#[test]
fn abort_needs_consecutive_samples() {
    let host = FakeHostMonitor::new(100 * GIB, GIB);
    let mut dog = watchdog(&host, &config(10.0, 5.0, 2.0));
    assert_eq!(dog.tick(), WatchdogVerdict::AbortPending);
    assert_eq!(dog.tick(), WatchdogVerdict::Abort);
    assert_eq!(dog.stats().snapshot().abort_count, 2);
}

#[test]
fn recovery_resets_abort_countdown() {
    let host = FakeHostMonitor::new(100 * GIB, GIB);
    let mut dog = watchdog(&host, &config(10.0, 5.0, 2.0));
    assert_eq!(dog.tick(), WatchdogVerdict::AbortPending);

    host.set_free(50 * GIB);
    assert_eq!(dog.tick(), WatchdogVerdict::Normal);

    // A fresh dip starts the countdown over.
    host.set_free(GIB);
    assert_eq!(dog.tick(), WatchdogVerdict::AbortPending);
    assert_eq!(dog.tick(), WatchdogVerdict::Abort);
}

#[test]
fn min_free_tracks_low_water_mark() {
    let host = FakeHostMonitor::new(100 * GIB, 50 * GIB);
    let mut dog = watchdog(&host, &config(0.0, 0.0, 0.0));
    dog.tick();
    host.set_free(20 * GIB);
    dog.tick();
    host.set_free(30 * GIB);
    dog.tick();
    assert_eq!(dog.stats().snapshot().min_free_bytes, Some(20 * GIB));
}

#[test]
fn stats_reset() {
    let host = FakeHostMonitor::new(100 * GIB, 8 * GIB);
    let mut dog = watchdog(&host, &config(10.0, 0.0, 0.0));
    dog.tick();
    let handle = dog.stats();
    assert_eq!(handle.snapshot().warn_count, 1);
    handle.reset();
    assert_eq!(handle.snapshot(), WatchdogStats::default());
}

#[test]
fn process_restart_after_down_periods() {
    let host = FakeHostMonitor::new(100 * GIB, 50 * GIB);
    let mut cfg = config(0.0, 0.0, 0.0);
    cfg.processes.push(WatchedProcess {
        name: "mapper".to_string(),
        restart_command: "systemctl restart mapper".to_string(),
    });
    let mut dog = watchdog(&host, &cfg);

    // Never seen running: absence does not trigger restarts.
    for _ in 0..20 {
        dog.tick();
    }
    assert!(host.restarts().is_empty());

    // Seen running once, then dies.
    host.set_process_running("mapper", true);
    dog.tick();
    host.set_process_running("mapper", false);
    for _ in 0..PROCESS_RESTART_PERIODS - 1 {
        dog.tick();
    }
    assert!(host.restarts().is_empty());
    dog.tick();
    assert_eq!(host.restarts(), vec!["systemctl restart mapper".to_string()]);

    // Still down: another restart after another full countdown.
    for _ in 0..PROCESS_RESTART_PERIODS {
        dog.tick();
    }
    assert_eq!(host.restarts().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn run_returns_abort() {
    let host = FakeHostMonitor::new(100 * GIB, GIB);
    let dog = watchdog(&host, &config(10.0, 5.0, 2.0));
    let verdict = dog.run(CancellationToken::new()).await;
    assert_eq!(verdict, WatchdogVerdict::Abort);
}

#[tokio::test]
async fn run_stops_on_cancel() {
    let host = FakeHostMonitor::new(100 * GIB, 50 * GIB);
    let dog = watchdog(&host, &config(10.0, 5.0, 2.0));
    let cancel = CancellationToken::new();
    cancel.cancel();
    assert_eq!(dog.run(cancel).await, WatchdogVerdict::Normal);
}
