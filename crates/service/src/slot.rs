// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The single-slot in-flight message reference.
//!
//! Written by the service loop, read lock-free by the heartbeat. Non-empty
//! only between handler entry and handler exit. The heartbeat must
//! re-confirm the slot under the deletion monitor before extending a lease;
//! the lock-free read alone is only a hint.

use arc_swap::ArcSwapOption;
use lf_core::QueueMessage;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The in-flight message and its dispatch bookkeeping.
#[derive(Debug)]
pub struct InFlight {
    pub message: QueueMessage,
    /// Canonical description for log lines.
    pub description: String,
    pub started_at_ms: u64,
    /// Epoch-ms of the last visibility extension; 0 = none yet.
    last_heartbeat_ms: AtomicU64,
    /// Cancelled when the handler overruns its wall-clock budget.
    pub cancel: CancellationToken,
    killed: AtomicBool,
}

impl InFlight {
    pub fn new(message: QueueMessage, description: String, started_at_ms: u64) -> Self {
        Self {
            message,
            description,
            started_at_ms,
            last_heartbeat_ms: AtomicU64::new(0),
            cancel: CancellationToken::new(),
            killed: AtomicBool::new(false),
        }
    }

    pub fn last_heartbeat_ms(&self) -> Option<u64> {
        match self.last_heartbeat_ms.load(Ordering::Acquire) {
            0 => None,
            ms => Some(ms),
        }
    }

    pub fn record_heartbeat(&self, now_ms: u64) {
        self.last_heartbeat_ms.store(now_ms, Ordering::Release);
    }

    pub fn clear_heartbeat(&self) {
        self.last_heartbeat_ms.store(0, Ordering::Release);
    }

    /// Mark killed; returns true on the first call only.
    pub fn mark_killed(&self) -> bool {
        !self.killed.swap(true, Ordering::AcqRel)
    }

    pub fn was_killed(&self) -> bool {
        self.killed.load(Ordering::Acquire)
    }
}

/// Atomic single-slot holder for the in-flight message.
#[derive(Default)]
pub struct InFlightSlot {
    current: ArcSwapOption<InFlight>,
}

impl InFlightSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, in_flight: Arc<InFlight>) {
        self.current.store(Some(in_flight));
    }

    pub fn load(&self) -> Option<Arc<InFlight>> {
        self.current.load_full()
    }

    pub fn clear(&self) {
        self.current.store(None);
    }

    pub fn is_occupied(&self) -> bool {
        self.current.load().is_some()
    }
}

#[cfg(test)]
#[path = "slot_tests.rs"]
mod tests;
