// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Service configuration and defaults.

use crate::error::ServiceError;
use crate::lifecycle::IdleShutdownMethod;
use lf_core::{MessageKind, DEFAULT_EVENT_PREFIX};
use std::time::Duration;

/// Default visibility timeout requested for owned queues.
pub const DEFAULT_MESSAGE_TIMEOUT_SEC: u32 = 300;
/// Heartbeat cadence as a fraction of the visibility timeout.
pub const DEFAULT_HEARTBEAT_FRACTION: f64 = 1.0 / 3.0;
/// Hard wall-clock budget for a single handler invocation.
pub const DEFAULT_MAX_HANDLER_SEC: u64 = 600;
/// Messages older than this are culled without dispatch.
pub const DEFAULT_MAX_MESSAGE_AGE_SEC: u64 = 86_400;
/// Messages received more often than this are culled without dispatch.
pub const DEFAULT_MAX_RECEIVE_COUNT: u32 = 5;
/// Long-poll interval for dequeue.
pub const DEFAULT_LONG_POLL_SEC: u64 = 20;
/// Idle time before the idle state commits.
pub const DEFAULT_IDLE_SHUTDOWN_SEC: u64 = 300;
/// Idle-committed time after which an OS shutdown fires regardless of method.
pub const DEFAULT_IDLE_FAILSAFE_SEC: u64 = 3_600;
/// Throttle between idle-event emissions while idle-committed.
pub const IDLE_EVENT_THROTTLE_SEC: u64 = 60;
/// Back-off after an error escapes a service-loop iteration.
pub const SERVICE_LOOP_THROTTLE_SEC: u64 = 60;
/// Watchdog sampling period.
pub const DEFAULT_WATCHDOG_PERIOD_SEC: u64 = 5;
/// Suffix appended to the primary queue name for the auto fail queue.
pub const FAIL_QUEUE_SUFFIX: &str = "-fail";

/// Total-memory reference above which watchdog thresholds are absolute GiB.
pub const MEMORY_REFERENCE_BYTES: u64 = 80 * GIB;
const GIB: u64 = 1024 * 1024 * 1024;

/// Fail-queue selection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FailQueueMode {
    /// No fail queue; failed messages are dropped after deletion.
    None,
    /// Primary queue name + [`FAIL_QUEUE_SUFFIX`].
    #[default]
    Auto,
    /// Explicit sibling queue name.
    Named(String),
}

impl FailQueueMode {
    /// Resolve to a concrete queue name, if any.
    pub fn resolve(&self, primary: &str) -> Option<String> {
        match self {
            FailQueueMode::None => None,
            FailQueueMode::Auto => Some(format!("{primary}{FAIL_QUEUE_SUFFIX}")),
            FailQueueMode::Named(name) => Some(name.clone()),
        }
    }
}

/// An auxiliary process the watchdog keeps alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedProcess {
    /// Process name as it appears in the process table.
    pub name: String,
    /// Shell command that restarts it.
    pub restart_command: String,
}

/// Watchdog thresholds and supervision settings.
///
/// Threshold values are in gigabytes as configured; [`WatchdogConfig::thresholds`]
/// normalizes them against the host's total memory. A zero disables that
/// threshold.
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    pub period: Duration,
    pub warn_gb: f64,
    pub cleanup_gb: f64,
    pub abort_gb: f64,
    pub processes: Vec<WatchedProcess>,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(DEFAULT_WATCHDOG_PERIOD_SEC),
            warn_gb: 0.0,
            cleanup_gb: 0.0,
            abort_gb: 0.0,
            processes: Vec::new(),
        }
    }
}

/// Normalized thresholds in bytes; zero means disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub warn: u64,
    pub cleanup: u64,
    pub abort: u64,
}

impl WatchdogConfig {
    /// Normalize configured gigabyte values against the host total.
    ///
    /// Fractions below 1 are fractions of total memory. Whole values are
    /// absolute GiB on hosts at or above [`MEMORY_REFERENCE_BYTES`] and are
    /// scaled down proportionally on smaller hosts.
    pub fn thresholds(&self, total_bytes: u64) -> Result<Thresholds, ServiceError> {
        let normalize = |gb: f64| -> u64 {
            if gb <= 0.0 {
                0
            } else if gb < 1.0 {
                (gb * total_bytes as f64) as u64
            } else if total_bytes >= MEMORY_REFERENCE_BYTES {
                (gb * GIB as f64) as u64
            } else {
                (gb * GIB as f64 * total_bytes as f64 / MEMORY_REFERENCE_BYTES as f64) as u64
            }
        };
        let thresholds = Thresholds {
            warn: normalize(self.warn_gb),
            cleanup: normalize(self.cleanup_gb),
            abort: normalize(self.abort_gb),
        };
        let enabled = |v: u64| v > 0;
        if enabled(thresholds.abort)
            && enabled(thresholds.cleanup)
            && thresholds.abort > thresholds.cleanup
        {
            return Err(ServiceError::InvalidConfig(format!(
                "watchdog abort threshold ({}) exceeds cleanup threshold ({})",
                thresholds.abort, thresholds.cleanup
            )));
        }
        if enabled(thresholds.cleanup)
            && enabled(thresholds.warn)
            && thresholds.cleanup > thresholds.warn
        {
            return Err(ServiceError::InvalidConfig(format!(
                "watchdog cleanup threshold ({}) exceeds warn threshold ({})",
                thresholds.cleanup, thresholds.warn
            )));
        }
        if enabled(thresholds.abort) && enabled(thresholds.warn) && thresholds.abort > thresholds.warn
        {
            return Err(ServiceError::InvalidConfig(
                "watchdog abort threshold exceeds warn threshold".to_string(),
            ));
        }
        Ok(thresholds)
    }
}

/// Everything the service chassis is told at construction.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Primary work queue name.
    pub queue_name: String,
    pub fail_queue: FailQueueMode,
    /// Whether this fleet owns the primary queue (allows auto-create and
    /// visibility updates).
    pub owned_queue: bool,
    pub owned_fail_queue: bool,
    /// Payload variant the codec expects.
    pub message_kind: MessageKind,
    /// Storage-event name prefix required by the codec.
    pub event_prefix: String,
    /// Visibility timeout requested for owned queues, seconds.
    pub message_timeout_sec: u32,
    pub heartbeat_fraction: f64,
    pub max_handler_sec: u64,
    pub max_message_age_sec: u64,
    pub max_receive_count: u32,
    /// Drop (rather than fail-forward) messages whose handler was killed.
    pub drop_poison_messages: bool,
    /// On failure, re-enqueue a recycled copy at the tail instead of
    /// forwarding to the fail queue.
    pub deprioritize_retries: bool,
    /// Log rejections at debug instead of info.
    pub suppress_rejections: bool,
    pub long_poll_sec: u64,
    /// Minimum wall-clock per iteration, milliseconds.
    pub throttle_ms: u64,
    /// Idle time before committing the idle state; `None` disables idle
    /// shutdown.
    pub idle_shutdown_sec: Option<u64>,
    pub idle_shutdown_failsafe_sec: u64,
    pub idle_shutdown_method: IdleShutdownMethod,
    /// Autoscaling group, required by the ASG-facing shutdown methods.
    pub auto_scale_group: Option<String>,
    /// Credential refresh period; `None` disables scheduled refresh.
    pub credential_refresh_sec: Option<u64>,
    pub watchdog: WatchdogConfig,
    /// Back-off after a service-loop iteration error (overridable in tests).
    pub loop_throttle: Duration,
    /// Idle-event emission throttle (overridable in tests).
    pub idle_event_throttle: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            queue_name: String::new(),
            fail_queue: FailQueueMode::Auto,
            owned_queue: false,
            owned_fail_queue: false,
            message_kind: MessageKind::Generic,
            event_prefix: DEFAULT_EVENT_PREFIX.to_string(),
            message_timeout_sec: DEFAULT_MESSAGE_TIMEOUT_SEC,
            heartbeat_fraction: DEFAULT_HEARTBEAT_FRACTION,
            max_handler_sec: DEFAULT_MAX_HANDLER_SEC,
            max_message_age_sec: DEFAULT_MAX_MESSAGE_AGE_SEC,
            max_receive_count: DEFAULT_MAX_RECEIVE_COUNT,
            drop_poison_messages: false,
            deprioritize_retries: false,
            suppress_rejections: false,
            long_poll_sec: DEFAULT_LONG_POLL_SEC,
            throttle_ms: 0,
            idle_shutdown_sec: None,
            idle_shutdown_failsafe_sec: DEFAULT_IDLE_FAILSAFE_SEC,
            idle_shutdown_method: IdleShutdownMethod::None,
            auto_scale_group: None,
            credential_refresh_sec: None,
            watchdog: WatchdogConfig::default(),
            loop_throttle: Duration::from_secs(SERVICE_LOOP_THROTTLE_SEC),
            idle_event_throttle: Duration::from_secs(IDLE_EVENT_THROTTLE_SEC),
        }
    }
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.queue_name.is_empty() {
            return Err(ServiceError::InvalidConfig("queue name is required".to_string()));
        }
        if self.idle_shutdown_method.requires_group() && self.auto_scale_group.is_none() {
            return Err(ServiceError::InvalidConfig(format!(
                "idle-shutdown-method {} requires an auto-scale-group",
                self.idle_shutdown_method
            )));
        }
        if !(0.0..=1.0).contains(&self.heartbeat_fraction) || self.heartbeat_fraction == 0.0 {
            return Err(ServiceError::InvalidConfig(
                "heartbeat fraction must be in (0, 1]".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolved fail-queue name, if a fail queue is configured.
    pub fn fail_queue_name(&self) -> Option<String> {
        self.fail_queue.resolve(&self.queue_name)
    }

    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_secs_f64(f64::from(self.message_timeout_sec) * self.heartbeat_fraction)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
