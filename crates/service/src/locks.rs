// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The shared monitors and their ordering discipline.
//!
//! Three async mutexes coordinate the concurrent activities:
//!
//! - `cred` — held for the duration of any cloud call.
//! - `del` — serializes message deletion against visibility extension.
//! - `long` — held by the service loop around handler invocation so a
//!   credential swap never lands mid-message.
//!
//! Acquisition order is strict: `cred → del` and `cred → long`. Never take
//! `cred` while holding either of the others.

use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

/// Bounded wait for any monitor acquisition.
pub const LOCK_WAIT: Duration = Duration::from_secs(5);

/// The monitor set shared by the service loop, heartbeat, and credential
/// manager.
#[derive(Default)]
pub struct Monitors {
    pub cred: Mutex<()>,
    pub del: Mutex<()>,
    pub long: Mutex<()>,
}

impl Monitors {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Acquire a monitor with the bounded wait; `None` means the caller should
/// log-and-skip its critical section and retry on its next tick.
pub async fn acquire<'a>(lock: &'a Mutex<()>, name: &'static str) -> Option<MutexGuard<'a, ()>> {
    match tokio::time::timeout(LOCK_WAIT, lock.lock()).await {
        Ok(guard) => Some(guard),
        Err(_) => {
            tracing::warn!(lock = name, wait = ?LOCK_WAIT, "monitor wait timed out, skipping");
            None
        }
    }
}

#[cfg(test)]
#[path = "locks_tests.rs"]
mod tests;
