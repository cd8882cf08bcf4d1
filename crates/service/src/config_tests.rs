// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

const GIB: u64 = 1024 * 1024 * 1024;

fn watchdog(warn: f64, cleanup: f64, abort: f64) -> WatchdogConfig {
    WatchdogConfig { warn_gb: warn, cleanup_gb: cleanup, abort_gb: abort, ..WatchdogConfig::default() }
}

#[test]
fn thresholds_absolute_on_large_host() {
    let t = watchdog(10.0, 5.0, 2.0).thresholds(100 * GIB).unwrap();
    assert_eq!(t.warn, 10 * GIB);
    assert_eq!(t.cleanup, 5 * GIB);
    assert_eq!(t.abort, 2 * GIB);
}

#[test]
fn thresholds_scale_down_on_small_host() {
    // 16 GiB host: values scale by 16/80.
    let t = watchdog(10.0, 5.0, 2.0).thresholds(16 * GIB).unwrap();
    assert_eq!(t.warn, 2 * GIB);
    assert_eq!(t.cleanup, GIB);
    assert_eq!(t.abort, (2 * GIB) / 5);
}

#[test]
fn fractional_thresholds_are_fractions_of_total() {
    let t = watchdog(0.5, 0.25, 0.1).thresholds(100 * GIB).unwrap();
    assert_eq!(t.warn, 50 * GIB);
    assert_eq!(t.cleanup, 25 * GIB);
    assert_eq!(t.abort, 10 * GIB);
}

#[test]
fn zero_threshold_is_disabled() {
    let t = watchdog(10.0, 0.0, 2.0).thresholds(100 * GIB).unwrap();
    assert_eq!(t.cleanup, 0);
    assert_eq!(t.warn, 10 * GIB);
}

#[parameterized(
    abort_above_cleanup = { 10.0, 2.0, 5.0 },
    cleanup_above_warn = { 2.0, 5.0, 1.0 },
    abort_above_warn = { 2.0, 0.0, 5.0 },
)]
fn threshold_ordering_enforced(warn: f64, cleanup: f64, abort: f64) {
    assert!(watchdog(warn, cleanup, abort).thresholds(100 * GIB).is_err());
}

#[test]
fn fail_queue_resolution() {
    assert_eq!(FailQueueMode::None.resolve("work"), None);
    assert_eq!(FailQueueMode::Auto.resolve("work"), Some("work-fail".to_string()));
    assert_eq!(
        FailQueueMode::Named("other".to_string()).resolve("work"),
        Some("other".to_string())
    );
}

#[test]
fn validate_requires_queue_name() {
    let config = ServiceConfig::default();
    assert!(config.validate().is_err());
}

#[test]
fn validate_requires_group_for_asg_methods() {
    let config = ServiceConfig {
        queue_name: "work".to_string(),
        idle_shutdown_method: IdleShutdownMethod::ScaleToZero,
        ..ServiceConfig::default()
    };
    assert!(config.validate().is_err());

    let config = ServiceConfig {
        auto_scale_group: Some("fleet".to_string()),
        ..config
    };
    config.validate().unwrap();
}

#[test]
fn heartbeat_period_is_fraction_of_visibility() {
    let config = ServiceConfig {
        queue_name: "work".to_string(),
        message_timeout_sec: 30,
        heartbeat_fraction: 1.0 / 3.0,
        ..ServiceConfig::default()
    };
    assert!((config.heartbeat_period().as_secs_f64() - 10.0).abs() < 1e-6);
}
