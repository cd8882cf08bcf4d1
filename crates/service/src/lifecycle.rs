// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Idle detection and shutdown-method selection.
//!
//! Once the idle state commits it never un-commits; the worker keeps
//! re-emitting the idle marker on a throttle so the autoscaler retries
//! scale-in, and a failsafe OS shutdown fires if the host is still alive
//! well past the commit.

use lf_adapters::InstanceControl;
use lf_core::Clock;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Canonical idle marker; fleet tooling greps for this exact string.
pub const IDLE_MARKER: &str = "worker idle: no work available";

/// What to do once the worker commits to being idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdleShutdownMethod {
    /// Do nothing.
    #[default]
    None,
    /// Ask the control plane to stop this instance.
    StopInstance,
    /// OS-level shutdown of the host.
    Shutdown,
    /// Try stop, fall back to OS shutdown.
    StopInstanceOrShutdown,
    /// Set the autoscaling group's desired size to zero.
    ScaleToZero,
    /// Only log the idle marker.
    LogIdle,
    /// Drop scale-in protection, then log the idle marker.
    LogIdleProtected,
}

impl IdleShutdownMethod {
    /// ASG-facing methods require a configured autoscaling group.
    pub fn requires_group(&self) -> bool {
        matches!(self, IdleShutdownMethod::ScaleToZero | IdleShutdownMethod::LogIdleProtected)
    }
}

impl fmt::Display for IdleShutdownMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IdleShutdownMethod::None => "None",
            IdleShutdownMethod::StopInstance => "StopInstance",
            IdleShutdownMethod::Shutdown => "Shutdown",
            IdleShutdownMethod::StopInstanceOrShutdown => "StopInstanceOrShutdown",
            IdleShutdownMethod::ScaleToZero => "ScaleToZero",
            IdleShutdownMethod::LogIdle => "LogIdle",
            IdleShutdownMethod::LogIdleProtected => "LogIdleProtected",
        };
        write!(f, "{name}")
    }
}

impl FromStr for IdleShutdownMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(IdleShutdownMethod::None),
            "stopinstance" => Ok(IdleShutdownMethod::StopInstance),
            "shutdown" => Ok(IdleShutdownMethod::Shutdown),
            "stopinstanceorshutdown" => Ok(IdleShutdownMethod::StopInstanceOrShutdown),
            "scaletozero" => Ok(IdleShutdownMethod::ScaleToZero),
            "logidle" => Ok(IdleShutdownMethod::LogIdle),
            "logidleprotected" => Ok(IdleShutdownMethod::LogIdleProtected),
            other => Err(format!("unknown idle-shutdown method: {other}")),
        }
    }
}

#[derive(Default)]
struct IdleState {
    pending_since_ms: Option<u64>,
    committed_since_ms: Option<u64>,
    last_event_ms: Option<u64>,
    shutdown_initiated: bool,
    failsafe_fired: bool,
}

/// Tracks idleness and drives the configured shutdown method.
pub struct LifecycleController<I: InstanceControl, C: Clock> {
    control: I,
    clock: C,
    method: IdleShutdownMethod,
    group: Option<String>,
    idle_after: Option<Duration>,
    failsafe: Duration,
    event_throttle: Duration,
    instance_id: Option<String>,
    state: parking_lot::Mutex<IdleState>,
}

impl<I: InstanceControl, C: Clock> LifecycleController<I, C> {
    /// Resolve the instance identity and perform the service-entry
    /// handshake (eager scale-in protection for `LogIdleProtected`).
    #[allow(clippy::too_many_arguments)]
    pub async fn init(
        control: I,
        clock: C,
        method: IdleShutdownMethod,
        group: Option<String>,
        idle_after: Option<Duration>,
        failsafe: Duration,
        event_throttle: Duration,
    ) -> Self {
        let instance_id = control.self_instance_id().await;
        match &instance_id {
            Some(id) => tracing::info!(instance = %id, %method, "instance identity resolved"),
            None => tracing::info!(%method, "instance identity unknown, idle shutdown disarmed"),
        }

        if method == IdleShutdownMethod::LogIdleProtected {
            if let (Some(group), Some(id)) = (&group, &instance_id) {
                match control.set_scale_in_protection(group, id, true).await {
                    Ok(()) => tracing::info!(%group, "scale-in protection enabled"),
                    Err(e) => tracing::warn!(%group, error = %e, "scale-in protection enable failed"),
                }
            }
        }

        Self {
            control,
            clock,
            method,
            group,
            idle_after,
            failsafe,
            event_throttle,
            instance_id,
            state: parking_lot::Mutex::new(IdleState::default()),
        }
    }

    fn armed(&self) -> bool {
        self.method != IdleShutdownMethod::None
            && self.idle_after.is_some()
            && self.instance_id.is_some()
    }

    /// A message arrived: reset the idle-pending timer.
    pub fn note_activity(&self) {
        self.state.lock().pending_since_ms = None;
    }

    /// A dequeue came back empty. Returns true when this call committed the
    /// idle state.
    pub fn note_empty(&self) -> bool {
        if !self.armed() {
            return false;
        }
        let Some(idle_after) = self.idle_after else { return false };
        let now_ms = self.clock.epoch_ms();
        let mut state = self.state.lock();
        if state.committed_since_ms.is_some() {
            return false;
        }
        match state.pending_since_ms {
            None => {
                state.pending_since_ms = Some(now_ms);
                false
            }
            Some(pending_since) => {
                if now_ms.saturating_sub(pending_since) > idle_after.as_millis() as u64 {
                    state.committed_since_ms = Some(now_ms);
                    tracing::info!(
                        idle_sec = idle_after.as_secs(),
                        "idle threshold exceeded, committing idle state"
                    );
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn is_committed(&self) -> bool {
        self.state.lock().committed_since_ms.is_some()
    }

    /// One idle-committed tick: throttled marker emission, failsafe check,
    /// and (at most once) shutdown initiation.
    pub async fn on_idle_tick(&self) {
        let now_ms = self.clock.epoch_ms();
        let (emit, failsafe_due, initiate) = {
            let mut state = self.state.lock();
            let Some(committed_since) = state.committed_since_ms else { return };
            let emit = state
                .last_event_ms
                .map(|last| now_ms.saturating_sub(last) >= self.event_throttle.as_millis() as u64)
                .unwrap_or(true);
            if emit {
                state.last_event_ms = Some(now_ms);
            }
            let failsafe_due = !state.failsafe_fired
                && now_ms.saturating_sub(committed_since) > self.failsafe.as_millis() as u64;
            if failsafe_due {
                state.failsafe_fired = true;
            }
            (emit, failsafe_due, !state.shutdown_initiated)
        };

        if emit {
            tracing::info!(method = %self.method, "{IDLE_MARKER}");
        }

        if failsafe_due {
            tracing::warn!(
                failsafe_sec = self.failsafe.as_secs(),
                "still idle past the failsafe window, requesting OS shutdown"
            );
            if let Err(e) = self.control.request_os_shutdown().await {
                tracing::warn!(error = %e, "failsafe OS shutdown failed");
            }
            return;
        }

        if emit && initiate {
            self.initiate().await;
        }
    }

    /// Run the configured method once. Sets the initiated flag only on
    /// success so a control-plane failure is retried on the next idle event.
    async fn initiate(&self) {
        let outcome = match self.method {
            IdleShutdownMethod::None => return,
            IdleShutdownMethod::LogIdle => Ok(()),
            IdleShutdownMethod::LogIdleProtected => self.disable_protection().await,
            IdleShutdownMethod::ScaleToZero => self.scale_to_zero().await,
            IdleShutdownMethod::StopInstance => self.stop_self().await,
            IdleShutdownMethod::Shutdown => {
                self.control.request_os_shutdown().await.map_err(|e| e.to_string())
            }
            IdleShutdownMethod::StopInstanceOrShutdown => match self.stop_self().await {
                Ok(()) => Ok(()),
                Err(stop_error) => {
                    tracing::warn!(error = %stop_error, "stop failed, falling back to OS shutdown");
                    self.control.request_os_shutdown().await.map_err(|e| e.to_string())
                }
            },
        };

        match outcome {
            Ok(()) => {
                self.state.lock().shutdown_initiated = true;
                tracing::info!(method = %self.method, "idle shutdown initiated");
            }
            Err(e) => {
                tracing::warn!(method = %self.method, error = %e, "idle shutdown failed, will retry");
            }
        }
    }

    async fn stop_self(&self) -> Result<(), String> {
        let id = self.instance_id.as_deref().ok_or("instance id unknown")?;
        self.control.stop_instance(id).await.map_err(|e| e.to_string())
    }

    async fn scale_to_zero(&self) -> Result<(), String> {
        let group = self.group.as_deref().ok_or("no autoscaling group configured")?;
        self.control
            .set_group_size(group, None, Some(0), None)
            .await
            .map_err(|e| e.to_string())
    }

    async fn disable_protection(&self) -> Result<(), String> {
        let group = self.group.as_deref().ok_or("no autoscaling group configured")?;
        let id = self.instance_id.as_deref().ok_or("instance id unknown")?;
        self.control
            .set_scale_in_protection(group, id, false)
            .await
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
