// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory queue backend.
//!
//! A complete at-least-once queue with visibility leases, receive counts,
//! and opportunistic FIFO group ordering, driven entirely by the injected
//! [`Clock`]. Used by unit and integration tests and by local development
//! runs; it is also the reference semantics for cloud backends.

use crate::queue::{QueueBackend, QueueError};
use async_trait::async_trait;
use lf_core::{Clock, QueueMessage};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const POLL_SLICE: Duration = Duration::from_millis(20);

#[derive(Clone)]
struct Stored {
    message_id: String,
    body: String,
    group_id: Option<String>,
    sent_at_ms: u64,
    first_received_at_ms: Option<u64>,
    receive_count: u32,
}

struct Leased {
    message: Stored,
    group_id: Option<String>,
    expires_at_ms: u64,
}

struct MemQueue {
    visibility_sec: u32,
    fifo: bool,
    ready: VecDeque<Stored>,
    leased: HashMap<String, Leased>,
}

impl MemQueue {
    /// Return expired leases to the front of the ready queue, oldest first.
    fn reap_expired(&mut self, now_ms: u64) {
        let expired: Vec<String> = self
            .leased
            .iter()
            .filter(|(_, l)| l.expires_at_ms <= now_ms)
            .map(|(receipt, _)| receipt.clone())
            .collect();
        let mut returned: Vec<Stored> = expired
            .into_iter()
            .filter_map(|receipt| self.leased.remove(&receipt))
            .map(|l| l.message)
            .collect();
        returned.sort_by_key(|m| m.sent_at_ms);
        for message in returned.into_iter().rev() {
            self.ready.push_front(message);
        }
    }

    fn locked_groups(&self) -> HashSet<String> {
        self.leased.values().filter_map(|l| l.group_id.clone()).collect()
    }
}

struct Storage {
    queues: HashMap<String, MemQueue>,
}

/// Thread-safe in-memory queue service.
#[derive(Clone)]
pub struct MemoryQueueBackend<C: Clock> {
    storage: Arc<Mutex<Storage>>,
    clock: C,
}

impl<C: Clock> MemoryQueueBackend<C> {
    pub fn new(clock: C) -> Self {
        Self { storage: Arc::new(Mutex::new(Storage { queues: HashMap::new() })), clock }
    }

    /// Number of messages currently leased (test observability).
    pub fn leased_count(&self, name: &str) -> usize {
        self.storage.lock().queues.get(name).map(|q| q.leased.len()).unwrap_or(0)
    }

    fn with_queue<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut MemQueue, u64) -> Result<T, QueueError>,
    ) -> Result<T, QueueError> {
        let now_ms = self.clock.epoch_ms();
        let mut storage = self.storage.lock();
        let queue =
            storage.queues.get_mut(name).ok_or_else(|| QueueError::NotFound(name.to_string()))?;
        f(queue, now_ms)
    }

    fn try_receive(
        &self,
        name: &str,
        max: usize,
        visibility_override_sec: Option<u32>,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        self.with_queue(name, |queue, now_ms| {
            queue.reap_expired(now_ms);
            let lease_sec = visibility_override_sec.unwrap_or(queue.visibility_sec);
            let mut locked = if queue.fifo { queue.locked_groups() } else { HashSet::new() };
            let mut received = Vec::new();
            let mut skipped: VecDeque<Stored> = VecDeque::new();
            while received.len() < max {
                let Some(mut message) = queue.ready.pop_front() else { break };
                let group_locked = message
                    .group_id
                    .as_deref()
                    .is_some_and(|g| locked.contains(g));
                if group_locked {
                    skipped.push_back(message);
                    continue;
                }
                message.receive_count += 1;
                let first_received_at_ms = *message.first_received_at_ms.get_or_insert(now_ms);
                let receipt_handle = Uuid::new_v4().to_string();
                received.push(QueueMessage {
                    message_id: message.message_id.clone(),
                    receipt_handle: receipt_handle.clone(),
                    body: message.body.clone(),
                    sent_at_ms: message.sent_at_ms,
                    first_received_at_ms,
                    receive_count: message.receive_count,
                });
                let group_id = message.group_id.clone();
                if queue.fifo {
                    if let Some(group) = group_id.clone() {
                        locked.insert(group);
                    }
                }
                queue.leased.insert(
                    receipt_handle,
                    Leased {
                        message,
                        group_id,
                        expires_at_ms: now_ms + u64::from(lease_sec) * 1000,
                    },
                );
            }
            // Skipped same-group messages keep their position at the front.
            while let Some(message) = skipped.pop_back() {
                queue.ready.push_front(message);
            }
            Ok(received)
        })
    }
}

#[async_trait]
impl<C: Clock> QueueBackend for MemoryQueueBackend<C> {
    async fn create_queue(
        &self,
        name: &str,
        visibility_timeout_sec: u32,
        fifo: bool,
    ) -> Result<(), QueueError> {
        let mut storage = self.storage.lock();
        if storage.queues.contains_key(name) {
            return Err(QueueError::Backend(format!("queue already exists: {name}")));
        }
        storage.queues.insert(
            name.to_string(),
            MemQueue {
                visibility_sec: visibility_timeout_sec,
                fifo,
                ready: VecDeque::new(),
                leased: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn queue_exists(&self, name: &str) -> Result<bool, QueueError> {
        Ok(self.storage.lock().queues.contains_key(name))
    }

    async fn visibility_timeout(&self, name: &str) -> Result<u32, QueueError> {
        self.with_queue(name, |queue, _| Ok(queue.visibility_sec))
    }

    async fn set_visibility_timeout(&self, name: &str, seconds: u32) -> Result<(), QueueError> {
        self.with_queue(name, |queue, _| {
            queue.visibility_sec = seconds;
            Ok(())
        })
    }

    async fn send(
        &self,
        name: &str,
        body: &str,
        group_id: Option<&str>,
    ) -> Result<String, QueueError> {
        let message_id = Uuid::new_v4().to_string();
        self.with_queue(name, |queue, now_ms| {
            if queue.fifo && group_id.is_none() {
                return Err(QueueError::Backend("fifo queue requires a group id".to_string()));
            }
            queue.ready.push_back(Stored {
                message_id: message_id.clone(),
                body: body.to_string(),
                group_id: group_id.map(str::to_string),
                sent_at_ms: now_ms,
                first_received_at_ms: None,
                receive_count: 0,
            });
            Ok(())
        })?;
        Ok(message_id)
    }

    async fn receive(
        &self,
        name: &str,
        max: usize,
        wait: Duration,
        visibility_override_sec: Option<u32>,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let received = self.try_receive(name, max, visibility_override_sec)?;
            if !received.is_empty() || tokio::time::Instant::now() >= deadline {
                return Ok(received);
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            tokio::time::sleep(POLL_SLICE.min(remaining)).await;
        }
    }

    async fn change_visibility(
        &self,
        name: &str,
        receipt_handle: &str,
        seconds: u32,
    ) -> Result<(), QueueError> {
        self.with_queue(name, |queue, now_ms| {
            queue.reap_expired(now_ms);
            match queue.leased.get_mut(receipt_handle) {
                Some(lease) => {
                    lease.expires_at_ms = now_ms + u64::from(seconds) * 1000;
                    Ok(())
                }
                None => Err(QueueError::ReceiptInvalid),
            }
        })
    }

    async fn delete(&self, name: &str, receipt_handle: &str) -> Result<(), QueueError> {
        self.with_queue(name, |queue, _| {
            queue.leased.remove(receipt_handle);
            Ok(())
        })
    }

    async fn purge(&self, name: &str) -> Result<(), QueueError> {
        self.with_queue(name, |queue, _| {
            queue.ready.clear();
            queue.leased.clear();
            Ok(())
        })
    }

    async fn approx_size(&self, name: &str, include_invisible: bool) -> Result<usize, QueueError> {
        self.with_queue(name, |queue, now_ms| {
            queue.reap_expired(now_ms);
            let mut size = queue.ready.len();
            if include_invisible {
                size += queue.leased.len();
            }
            Ok(size)
        })
    }

    async fn delete_queue(&self, name: &str) -> Result<(), QueueError> {
        let mut storage = self.storage.lock();
        storage
            .queues
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| QueueError::NotFound(name.to_string()))
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
