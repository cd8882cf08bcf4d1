// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Visibility-lease heartbeat and handler wall-clock enforcement.
//!
//! Runs at a fraction of the visibility timeout. While a message is in
//! flight it either extends the lease (under `cred → del`, after
//! re-confirming the slot) or, once the handler has overrun its budget,
//! cancels the handler's token. The lock-free slot read is only a hint;
//! the re-check under `del` is what makes extension and deletion mutually
//! exclusive.

use crate::credentials::ServiceQueues;
use crate::locks::{acquire, Monitors};
use crate::slot::InFlightSlot;
use arc_swap::ArcSwap;
use lf_adapters::QueueBackend;
use lf_core::Clock;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Floor for the heartbeat period so a tiny visibility timeout cannot turn
/// this loop into a busy spin.
const MIN_PERIOD: Duration = Duration::from_millis(100);

pub struct Heartbeat<B: QueueBackend, C: Clock> {
    queues: Arc<ArcSwap<ServiceQueues<B>>>,
    slot: Arc<InFlightSlot>,
    monitors: Arc<Monitors>,
    clock: C,
    max_handler: Duration,
    fraction: f64,
}

impl<B: QueueBackend, C: Clock> Heartbeat<B, C> {
    pub fn new(
        queues: Arc<ArcSwap<ServiceQueues<B>>>,
        slot: Arc<InFlightSlot>,
        monitors: Arc<Monitors>,
        clock: C,
        max_handler: Duration,
        fraction: f64,
    ) -> Self {
        Self { queues, slot, monitors, clock, max_handler, fraction }
    }

    fn period(&self, visibility_sec: u32) -> Duration {
        Duration::from_secs_f64(f64::from(visibility_sec) * self.fraction).max(MIN_PERIOD)
    }

    /// One heartbeat step; returns how long to sleep before the next.
    pub(crate) async fn tick(&self) -> Duration {
        let visibility_sec = self.queues.load().main.visibility_timeout_sec();
        let period = self.period(visibility_sec);

        let Some(in_flight) = self.slot.load() else {
            return period;
        };

        let now_ms = self.clock.epoch_ms();
        let elapsed_ms = now_ms.saturating_sub(in_flight.started_at_ms);
        if elapsed_ms > self.max_handler.as_millis() as u64 {
            if in_flight.mark_killed() {
                tracing::warn!(
                    message = %in_flight.message.message_id,
                    url = %in_flight.description,
                    elapsed_sec = elapsed_ms / 1000,
                    budget_sec = self.max_handler.as_secs(),
                    "handler exceeded wall-clock budget, cancelling"
                );
                in_flight.cancel.cancel();
            }
            in_flight.clear_heartbeat();
            return period;
        }

        let Some(_cred) = acquire(&self.monitors.cred, "cred").await else {
            return period;
        };
        let Some(_del) = acquire(&self.monitors.del, "del").await else {
            return period;
        };

        // Re-confirm under the deletion monitor: the service loop may have
        // deleted the message and cleared the slot since the hint read.
        let Some(current) = self.slot.load() else {
            return period;
        };
        if !Arc::ptr_eq(&current, &in_flight) {
            return period;
        }

        let queues = self.queues.load();
        match queues.main.extend_visibility(&current.message.receipt_handle).await {
            Ok(()) => {
                let since = current.last_heartbeat_ms().unwrap_or(current.started_at_ms);
                let interval_ms = now_ms.saturating_sub(since);
                if interval_ms > u64::from(visibility_sec) * 1000 {
                    tracing::warn!(
                        message = %current.message.message_id,
                        interval_sec = interval_ms / 1000,
                        visibility_sec,
                        "heartbeat interval exceeded the visibility timeout"
                    );
                }
                current.record_heartbeat(now_ms);
                tracing::debug!(
                    message = %current.message.message_id,
                    extended_sec = visibility_sec,
                    "visibility lease extended"
                );
            }
            Err(e) => {
                tracing::warn!(
                    message = %current.message.message_id,
                    error = %e,
                    "visibility extension failed"
                );
            }
        }
        period
    }

    pub async fn run(self, cancel: CancellationToken) {
        loop {
            let sleep = self.tick().await;
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(sleep) => {}
            }
        }
    }
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
