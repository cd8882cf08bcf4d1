// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The queue-service seam.
//!
//! One trait covers everything the chassis needs from a distributed queue
//! with at-least-once delivery, visibility leases, and receipt handles.
//! Cloud bindings implement this; [`crate::MemoryQueueBackend`] is the
//! in-process implementation used by tests and local runs.

use async_trait::async_trait;
use lf_core::QueueMessage;
use std::time::Duration;
use thiserror::Error;

/// Errors from queue-backend operations.
///
/// The taxonomy is deliberately small: the service loop only distinguishes
/// "the queue does not exist", "this lease is gone", and "try again later".
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue not found: {0}")]
    NotFound(String),
    #[error("receipt handle invalid or lease expired")]
    ReceiptInvalid,
    #[error("transient queue failure: {0}")]
    Transient(String),
    #[error("queue backend failure: {0}")]
    Backend(String),
}

impl QueueError {
    pub fn is_transient(&self) -> bool {
        matches!(self, QueueError::Transient(_))
    }
}

/// Adapter over the distributed queue service.
#[async_trait]
pub trait QueueBackend: Clone + Send + Sync + 'static {
    /// Create a queue with the given default visibility timeout. Creating an
    /// existing queue is an error; callers check [`queue_exists`] first.
    ///
    /// [`queue_exists`]: QueueBackend::queue_exists
    async fn create_queue(
        &self,
        name: &str,
        visibility_timeout_sec: u32,
        fifo: bool,
    ) -> Result<(), QueueError>;

    async fn queue_exists(&self, name: &str) -> Result<bool, QueueError>;

    /// The queue's configured default visibility timeout.
    async fn visibility_timeout(&self, name: &str) -> Result<u32, QueueError>;

    async fn set_visibility_timeout(&self, name: &str, seconds: u32) -> Result<(), QueueError>;

    /// Append a payload; returns the queue-assigned message id. FIFO queues
    /// require a message-group id.
    async fn send(
        &self,
        name: &str,
        body: &str,
        group_id: Option<&str>,
    ) -> Result<String, QueueError>;

    /// Long-poll receive. Returns early when messages are available,
    /// otherwise returns empty after `wait`. Each message carries its
    /// attributes and a fresh receipt handle.
    async fn receive(
        &self,
        name: &str,
        max: usize,
        wait: Duration,
        visibility_override_sec: Option<u32>,
    ) -> Result<Vec<QueueMessage>, QueueError>;

    /// Refresh the lease behind a receipt handle.
    async fn change_visibility(
        &self,
        name: &str,
        receipt_handle: &str,
        seconds: u32,
    ) -> Result<(), QueueError>;

    /// Remove the message behind a receipt handle. Idempotent: deleting an
    /// already-deleted message succeeds.
    async fn delete(&self, name: &str, receipt_handle: &str) -> Result<(), QueueError>;

    async fn purge(&self, name: &str) -> Result<(), QueueError>;

    /// Approximate message count; with `include_invisible`, in-flight
    /// messages are counted too.
    async fn approx_size(&self, name: &str, include_invisible: bool) -> Result<usize, QueueError>;

    async fn delete_queue(&self, name: &str) -> Result<(), QueueError>;
}
