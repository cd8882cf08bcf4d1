// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator commands: bounded queue surgery and host checks.
//!
//! Each runs to completion and returns; none of them may run alongside
//! service mode.

use crate::error::ServiceError;
use crate::queue::WorkQueue;
use chrono::DateTime;
use lf_adapters::{HostMonitor, QueueBackend};
use lf_core::{describe_body, Clock, ResourceUrl};
use std::time::Duration;

/// Dequeue batch size for the bounded operations.
const BATCH: usize = 10;
/// Visibility override for peeks, so peeked messages reappear quickly.
const PEEK_VISIBILITY_SEC: u32 = 1;

/// One peeked message, ready for display.
#[derive(Debug, Clone)]
pub struct PeekedMessage {
    pub message_id: String,
    pub url: String,
    pub body: String,
    pub sent_at_ms: u64,
    pub age_ms: u64,
    pub receive_count: u32,
}

impl PeekedMessage {
    /// Human-readable sent timestamp.
    pub fn sent_at(&self) -> String {
        DateTime::from_timestamp_millis(self.sent_at_ms as i64)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| format!("@{}ms", self.sent_at_ms))
    }
}

/// Look at up to `count` messages without consuming them. Uses a short
/// visibility override so the peek lease lapses almost immediately.
pub async fn peek<B: QueueBackend, C: Clock>(
    queue: &WorkQueue<B>,
    count: usize,
    clock: &C,
) -> Result<Vec<PeekedMessage>, ServiceError> {
    let now_ms = clock.epoch_ms();
    let mut peeked = Vec::new();
    while peeked.len() < count {
        let batch = queue
            .dequeue(BATCH.min(count - peeked.len()), Duration::ZERO, Some(PEEK_VISIBILITY_SEC))
            .await?;
        if batch.is_empty() {
            break;
        }
        for message in batch {
            let entry = PeekedMessage {
                url: describe_body(&message.body),
                message_id: message.message_id,
                body: message.body,
                sent_at_ms: message.sent_at_ms,
                age_ms: now_ms.saturating_sub(message.sent_at_ms),
                receive_count: message.receive_count,
            };
            tracing::info!(
                queue = %queue.name(),
                message = %entry.message_id,
                url = %entry.url,
                sent = %entry.sent_at(),
                receives = entry.receive_count,
                "peek"
            );
            peeked.push(entry);
        }
    }
    Ok(peeked)
}

/// Dequeue and delete up to `count` messages. Returns how many went away.
pub async fn drop_messages<B: QueueBackend>(
    queue: &WorkQueue<B>,
    count: usize,
) -> Result<usize, ServiceError> {
    let mut dropped = 0;
    while dropped < count {
        let batch = queue.dequeue(BATCH.min(count - dropped), Duration::ZERO, None).await?;
        if batch.is_empty() {
            break;
        }
        for message in batch {
            queue.delete(&message.receipt_handle).await?;
            tracing::info!(queue = %queue.name(), message = %message.message_id, "dropped");
            dropped += 1;
        }
    }
    Ok(dropped)
}

/// Move up to `count` messages from one queue to its sibling. Used for
/// both `retry` (fail → main) and `fail` (main → fail).
pub async fn move_messages<B: QueueBackend>(
    from: &WorkQueue<B>,
    to: &WorkQueue<B>,
    count: usize,
) -> Result<usize, ServiceError> {
    let mut moved = 0;
    while moved < count {
        let batch = from.dequeue(BATCH.min(count - moved), Duration::ZERO, None).await?;
        if batch.is_empty() {
            break;
        }
        for message in batch {
            to.enqueue(&message.body).await?;
            from.delete(&message.receipt_handle).await?;
            tracing::info!(
                from = %from.name(),
                to = %to.name(),
                message = %message.message_id,
                "moved"
            );
            moved += 1;
        }
    }
    Ok(moved)
}

/// Build the payload for `send`: a bare URL becomes a generic message, any
/// other argument is read as a payload file.
pub fn build_send_payload(arg: &str) -> Result<String, ServiceError> {
    if ResourceUrl::looks_like_url(arg) {
        return Ok(serde_json::json!({ "url": arg }).to_string());
    }
    let path = arg.strip_prefix('@').unwrap_or(arg);
    std::fs::read_to_string(path)
        .map_err(|e| ServiceError::InvalidConfig(format!("cannot read payload file {path}: {e}")))
}

/// Enqueue a constructed or file-loaded payload.
pub async fn send<B: QueueBackend>(
    queue: &WorkQueue<B>,
    arg: &str,
) -> Result<String, ServiceError> {
    let payload = build_send_payload(arg)?;
    let message_id = queue.enqueue(&payload).await?;
    tracing::info!(queue = %queue.name(), message = %message_id, "sent");
    Ok(message_id)
}

/// Delete the main and fail queues. Both must be owned.
pub async fn delete_queues<B: QueueBackend>(
    main: &WorkQueue<B>,
    fail: Option<&WorkQueue<B>>,
) -> Result<(), ServiceError> {
    main.delete_queue().await?;
    tracing::info!(queue = %main.name(), "queue deleted");
    if let Some(fail) = fail {
        fail.delete_queue().await?;
        tracing::info!(queue = %fail.name(), "queue deleted");
    }
    Ok(())
}

/// Report liveness for each named process.
pub fn check_processes<M: HostMonitor>(host: &M, names: &[String]) -> Vec<(String, bool)> {
    names
        .iter()
        .map(|name| {
            let running = host.process_running(name);
            tracing::info!(process = %name, running, "process check");
            (name.clone(), running)
        })
        .collect()
}

/// Allocate and touch `gib` gibibytes so the watchdog sees real pressure.
/// The caller holds the returned buffers while the watchdog samples.
pub fn allocate_gib(gib: usize) -> Vec<Vec<u8>> {
    const CHUNK: usize = 1024 * 1024 * 1024;
    (0..gib)
        .map(|i| {
            let mut chunk = vec![0u8; CHUNK];
            // Touch a byte per page so the memory is actually committed.
            for page in chunk.chunks_mut(4096) {
                page[0] = 1;
            }
            tracing::info!(allocated_gib = i + 1, "leak-test allocation");
            chunk
        })
        .collect()
}

#[cfg(test)]
#[path = "ops_tests.rs"]
mod tests;
