// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Memory watchdog and auxiliary-process supervision.
//!
//! One periodic loop samples free memory against three thresholds
//! (warn / cleanup / abort) and checks the liveness of configured
//! auxiliary processes. Abort is a countdown: only consecutive
//! below-threshold samples terminate the worker.

use crate::config::{Thresholds, WatchdogConfig};
use crate::error::ServiceError;
use lf_adapters::HostMonitor;
use lf_core::Clock;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Exit code used when the watchdog aborts the process.
pub const WATCHDOG_EXIT_CODE: i32 = 10;
/// Consecutive below-abort samples before the process exits.
pub const WATCHDOG_ABORT_PERIODS: u32 = 2;
/// Down samples before a dead auxiliary process is restarted.
pub const PROCESS_RESTART_PERIODS: u32 = 12;

/// Counters sampled by operator tooling; reset when a new message begins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchdogStats {
    pub min_free_bytes: Option<u64>,
    pub min_free_at_ms: u64,
    pub warn_count: u64,
    pub cleanup_count: u64,
    pub abort_count: u64,
}

/// Shared handle to the stats; the service loop resets it per message.
#[derive(Clone, Default)]
pub struct WatchdogStatsHandle {
    inner: Arc<parking_lot::Mutex<WatchdogStats>>,
}

impl WatchdogStatsHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> WatchdogStats {
        self.inner.lock().clone()
    }

    pub fn reset(&self) {
        *self.inner.lock() = WatchdogStats::default();
    }

    fn record_sample(&self, free_bytes: u64, now_ms: u64) {
        let mut stats = self.inner.lock();
        if stats.min_free_bytes.map(|min| free_bytes < min).unwrap_or(true) {
            stats.min_free_bytes = Some(free_bytes);
            stats.min_free_at_ms = now_ms;
        }
    }

    fn bump(&self, f: impl FnOnce(&mut WatchdogStats)) {
        f(&mut self.inner.lock());
    }
}

/// What a single sample concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogVerdict {
    Normal,
    Warned,
    Cleaned,
    /// Below the abort threshold but the countdown has not run out.
    AbortPending,
    Abort,
}

struct ProcessWatch {
    name: String,
    restart_command: String,
    countdown: u32,
    seen_running: bool,
}

/// The watchdog loop.
pub struct Watchdog<H: HostMonitor, C: Clock> {
    host: H,
    clock: C,
    period: Duration,
    thresholds: Thresholds,
    stats: WatchdogStatsHandle,
    cache_clear: Option<Arc<dyn Fn() + Send + Sync>>,
    abort_countdown: u32,
    processes: Vec<ProcessWatch>,
}

impl<H: HostMonitor, C: Clock> Watchdog<H, C> {
    /// Normalize thresholds against the host total and build the loop
    /// state. Fails on a threshold-ordering violation.
    pub fn new(
        host: H,
        clock: C,
        config: &WatchdogConfig,
        stats: WatchdogStatsHandle,
    ) -> Result<Self, ServiceError> {
        let thresholds = config.thresholds(host.total_memory_bytes())?;
        let processes = config
            .processes
            .iter()
            .map(|p| ProcessWatch {
                name: p.name.clone(),
                restart_command: p.restart_command.clone(),
                countdown: PROCESS_RESTART_PERIODS,
                seen_running: false,
            })
            .collect();
        Ok(Self {
            host,
            clock,
            period: config.period,
            thresholds,
            stats,
            cache_clear: None,
            abort_countdown: WATCHDOG_ABORT_PERIODS,
            processes,
        })
    }

    /// Hook invoked on cleanup and abort-pending samples to shed memory
    /// (handler caches, mmap pools).
    pub fn with_cache_clear(mut self, hook: Arc<dyn Fn() + Send + Sync>) -> Self {
        self.cache_clear = Some(hook);
        self
    }

    pub fn stats(&self) -> WatchdogStatsHandle {
        self.stats.clone()
    }

    fn clear_caches(&self) {
        if let Some(hook) = &self.cache_clear {
            hook();
        }
    }

    /// One sample: memory thresholds, then process liveness.
    pub fn tick(&mut self) -> WatchdogVerdict {
        let free = self.host.free_memory_bytes();
        let now_ms = self.clock.epoch_ms();
        self.stats.record_sample(free, now_ms);

        let t = self.thresholds;
        let verdict = if t.abort > 0 && free < t.abort {
            self.stats.bump(|s| s.abort_count += 1);
            self.abort_countdown = self.abort_countdown.saturating_sub(1);
            if self.abort_countdown == 0 {
                tracing::error!(
                    free_bytes = free,
                    abort_bytes = t.abort,
                    "free memory below abort threshold, terminating worker"
                );
                return WatchdogVerdict::Abort;
            }
            tracing::warn!(
                free_bytes = free,
                remaining = self.abort_countdown,
                "free memory below abort threshold"
            );
            self.clear_caches();
            WatchdogVerdict::AbortPending
        } else if t.cleanup > 0 && free < t.cleanup {
            self.stats.bump(|s| s.cleanup_count += 1);
            self.abort_countdown = WATCHDOG_ABORT_PERIODS;
            tracing::info!(free_bytes = free, "free memory below cleanup threshold, clearing caches");
            self.clear_caches();
            WatchdogVerdict::Cleaned
        } else if t.warn > 0 && free < t.warn {
            self.stats.bump(|s| s.warn_count += 1);
            self.abort_countdown = WATCHDOG_ABORT_PERIODS;
            tracing::warn!(free_bytes = free, warn_bytes = t.warn, "free memory low");
            WatchdogVerdict::Warned
        } else {
            self.abort_countdown = WATCHDOG_ABORT_PERIODS;
            WatchdogVerdict::Normal
        };

        self.check_processes();
        verdict
    }

    fn check_processes(&mut self) {
        for watch in &mut self.processes {
            if self.host.process_running(&watch.name) {
                watch.seen_running = true;
                watch.countdown = PROCESS_RESTART_PERIODS;
                continue;
            }
            if !watch.seen_running {
                continue;
            }
            watch.countdown = watch.countdown.saturating_sub(1);
            if watch.countdown == 0 {
                tracing::warn!(
                    process = %watch.name,
                    command = %watch.restart_command,
                    "auxiliary process down, restarting"
                );
                if let Err(e) = self.host.restart_process(&watch.restart_command) {
                    tracing::warn!(process = %watch.name, error = %e, "restart failed");
                }
                watch.countdown = PROCESS_RESTART_PERIODS;
            }
        }
    }

    /// Sample until abort or cancellation.
    pub async fn run(mut self, cancel: CancellationToken) -> WatchdogVerdict {
        loop {
            if self.tick() == WatchdogVerdict::Abort {
                return WatchdogVerdict::Abort;
            }
            tokio::select! {
                () = cancel.cancelled() => return WatchdogVerdict::Normal,
                () = tokio::time::sleep(self.period) => {}
            }
        }
    }
}

#[cfg(test)]
#[path = "watchdog_tests.rs"]
mod tests;
