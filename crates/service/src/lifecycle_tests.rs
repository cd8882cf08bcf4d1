// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use lf_adapters::{FakeInstanceControl, InstanceCall};
use lf_core::FakeClock;
use yare::parameterized;

const IDLE_AFTER: Duration = Duration::from_secs(60);
const FAILSAFE: Duration = Duration::from_secs(3600);
const THROTTLE: Duration = Duration::from_secs(60);

async fn controller(
    method: IdleShutdownMethod,
    control: FakeInstanceControl,
    clock: FakeClock,
) -> LifecycleController<FakeInstanceControl, FakeClock> {
    LifecycleController::init(
        control,
        clock,
        method,
        Some("fleet".to_string()),
        Some(IDLE_AFTER),
        FAILSAFE,
        THROTTLE,
    )
    .await
}

fn commit(lifecycle: &LifecycleController<FakeInstanceControl, FakeClock>, clock: &FakeClock) {
    assert!(!lifecycle.note_empty()); // starts pending timer
    clock.advance(IDLE_AFTER + Duration::from_secs(1));
    assert!(lifecycle.note_empty());
    assert!(lifecycle.is_committed());
}

#[parameterized(
    none = { "None", IdleShutdownMethod::None },
    stop = { "StopInstance", IdleShutdownMethod::StopInstance },
    stop_or_shutdown = { "stopinstanceorshutdown", IdleShutdownMethod::StopInstanceOrShutdown },
    scale = { "ScaleToZero", IdleShutdownMethod::ScaleToZero },
    log_protected = { "LogIdleProtected", IdleShutdownMethod::LogIdleProtected },
)]
fn method_from_str(name: &str, expected: IdleShutdownMethod) {
    assert_eq!(name.parse::<IdleShutdownMethod>().unwrap(), expected);
}

#[test]
fn method_from_str_rejects_unknown() {
    assert!("Sideways".parse::<IdleShutdownMethod>().is_err());
}

#[tokio::test]
async fn activity_resets_pending_timer() {
    let clock = FakeClock::new();
    let lifecycle =
        controller(IdleShutdownMethod::LogIdle, FakeInstanceControl::new("i-1"), clock.clone())
            .await;

    assert!(!lifecycle.note_empty());
    clock.advance(Duration::from_secs(50));
    lifecycle.note_activity();
    clock.advance(Duration::from_secs(50));
    // Timer restarted: 50s < 60s threshold.
    assert!(!lifecycle.note_empty());
    clock.advance(Duration::from_secs(61));
    assert!(lifecycle.note_empty());
}

#[tokio::test]
async fn unknown_instance_id_disarms_idle_tracking() {
    let clock = FakeClock::new();
    let lifecycle =
        controller(IdleShutdownMethod::LogIdle, FakeInstanceControl::anonymous(), clock.clone())
            .await;
    assert!(!lifecycle.note_empty());
    clock.advance(Duration::from_secs(3600));
    assert!(!lifecycle.note_empty());
    assert!(!lifecycle.is_committed());
}

#[tokio::test]
async fn scale_to_zero_initiates_exactly_once() {
    let clock = FakeClock::new();
    let control = FakeInstanceControl::new("i-1");
    let lifecycle =
        controller(IdleShutdownMethod::ScaleToZero, control.clone(), clock.clone()).await;
    commit(&lifecycle, &clock);

    lifecycle.on_idle_tick().await;
    clock.advance(THROTTLE + Duration::from_secs(1));
    lifecycle.on_idle_tick().await;
    clock.advance(THROTTLE + Duration::from_secs(1));
    lifecycle.on_idle_tick().await;

    let group_calls: Vec<_> = control
        .calls()
        .into_iter()
        .filter(|c| matches!(c, InstanceCall::GroupSize { .. }))
        .collect();
    assert_eq!(
        group_calls,
        vec![InstanceCall::GroupSize {
            group: "fleet".to_string(),
            min: None,
            desired: Some(0),
            max: None
        }]
    );
}

#[tokio::test]
async fn idle_events_are_throttled() {
    let clock = FakeClock::new();
    let control = FakeInstanceControl::new("i-1");
    let lifecycle = controller(IdleShutdownMethod::StopInstance, control.clone(), clock.clone())
        .await;
    commit(&lifecycle, &clock);

    lifecycle.on_idle_tick().await;
    // Within the throttle window: no new initiation attempt even though the
    // first one succeeded, and no duplicate event.
    clock.advance(Duration::from_secs(5));
    lifecycle.on_idle_tick().await;
    assert_eq!(control.calls().len(), 1);
}

#[tokio::test]
async fn control_failure_retries_on_next_idle_event() {
    let clock = FakeClock::new();
    let control = FakeInstanceControl::new("i-1");
    control.fail_all(true);
    let lifecycle = controller(IdleShutdownMethod::StopInstance, control.clone(), clock.clone())
        .await;
    commit(&lifecycle, &clock);

    lifecycle.on_idle_tick().await;
    assert_eq!(control.calls().len(), 1);

    control.fail_all(false);
    clock.advance(THROTTLE + Duration::from_secs(1));
    lifecycle.on_idle_tick().await;
    assert_eq!(control.calls().len(), 2);

    // Now initiated: further ticks only re-emit the marker.
    clock.advance(THROTTLE + Duration::from_secs(1));
    lifecycle.on_idle_tick().await;
    assert_eq!(control.calls().len(), 2);
}

#[tokio::test]
async fn stop_or_shutdown_falls_back() {
    let clock = FakeClock::new();
    let control = FakeInstanceControl::new("i-1");
    control.fail_stop(true);
    let lifecycle =
        controller(IdleShutdownMethod::StopInstanceOrShutdown, control.clone(), clock.clone())
            .await;
    commit(&lifecycle, &clock);

    lifecycle.on_idle_tick().await;
    let calls = control.calls();
    assert!(matches!(calls[0], InstanceCall::Stop { .. }));
    assert!(matches!(calls[1], InstanceCall::OsShutdown));
}

#[tokio::test]
async fn failsafe_requests_os_shutdown() {
    let clock = FakeClock::new();
    let control = FakeInstanceControl::new("i-1");
    let lifecycle = controller(IdleShutdownMethod::LogIdle, control.clone(), clock.clone()).await;
    commit(&lifecycle, &clock);

    lifecycle.on_idle_tick().await; // initiates LogIdle (no control calls)
    assert!(control.calls().is_empty());

    clock.advance(FAILSAFE + Duration::from_secs(1));
    lifecycle.on_idle_tick().await;
    assert_eq!(control.calls(), vec![InstanceCall::OsShutdown]);
}

#[tokio::test]
async fn log_idle_protected_handshake_and_release() {
    let clock = FakeClock::new();
    let control = FakeInstanceControl::new("i-1");
    let lifecycle =
        controller(IdleShutdownMethod::LogIdleProtected, control.clone(), clock.clone()).await;

    // Service-entry handshake enables protection.
    assert_eq!(
        control.calls(),
        vec![InstanceCall::ScaleInProtection {
            group: "fleet".to_string(),
            instance_id: "i-1".to_string(),
            enabled: true
        }]
    );

    commit(&lifecycle, &clock);
    lifecycle.on_idle_tick().await;
    assert_eq!(
        control.calls()[1],
        InstanceCall::ScaleInProtection {
            group: "fleet".to_string(),
            instance_id: "i-1".to_string(),
            enabled: false
        }
    );
}
