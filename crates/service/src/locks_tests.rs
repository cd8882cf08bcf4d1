// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::Arc;

#[tokio::test]
async fn acquire_returns_guard_when_free() {
    let monitors = Monitors::new();
    let guard = acquire(&monitors.cred, "cred").await;
    assert!(guard.is_some());
}

#[tokio::test(start_paused = true)]
async fn acquire_times_out_when_held() {
    let monitors = Arc::new(Monitors::new());
    let holder = monitors.clone();
    let _held = holder.del.lock().await;

    let waiter = tokio::spawn({
        let monitors = monitors.clone();
        async move { acquire(&monitors.del, "del").await.is_none() }
    });
    // Paused time auto-advances through the bounded wait.
    assert!(waiter.await.unwrap());
}

#[tokio::test]
async fn monitors_are_independent() {
    let monitors = Monitors::new();
    let _cred = monitors.cred.lock().await;
    // del and long remain acquirable while cred is held.
    assert!(acquire(&monitors.del, "del").await.is_some());
    assert!(acquire(&monitors.long, "long").await.is_some());
}
