// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The work-queue adapter: the only component that talks to the queue
//! backend.
//!
//! Opening resolves ownership and visibility-timeout policy; after that the
//! handle exposes the narrow operation set the rest of the chassis uses.

use crate::error::ServiceError;
use lf_adapters::{QueueBackend, QueueError};
use lf_core::QueueMessage;
use std::time::Duration;

/// Message-group id attached to sends on FIFO queues.
pub const MESSAGE_GROUP: &str = "landform";
/// Queue-name suffix that marks a FIFO queue.
pub const FIFO_SUFFIX: &str = ".fifo";

const OPEN_RETRIES: u32 = 2;
const OPEN_BACKOFF: Duration = Duration::from_secs(60);

/// How to open a queue.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    pub name: String,
    /// Default visibility timeout to request, seconds.
    pub visibility_timeout_sec: u32,
    /// This fleet owns the queue: may auto-create it and update its
    /// visibility timeout.
    pub owned: bool,
    /// Create the queue when owned and absent.
    pub auto_create: bool,
}

/// An opened queue handle.
#[derive(Clone)]
pub struct WorkQueue<B: QueueBackend> {
    backend: B,
    name: String,
    visibility_timeout_sec: u32,
    fifo: bool,
    owned: bool,
}

impl<B: QueueBackend> WorkQueue<B> {
    /// Open (and possibly create) a queue per the ownership policy.
    ///
    /// Transient backend errors are retried a bounded number of times with
    /// a coarse backoff before giving up.
    pub async fn open(backend: B, options: QueueOptions) -> Result<Self, ServiceError> {
        Self::open_with_backoff(backend, options, OPEN_BACKOFF).await
    }

    pub(crate) async fn open_with_backoff(
        backend: B,
        options: QueueOptions,
        backoff: Duration,
    ) -> Result<Self, ServiceError> {
        let mut attempt = 0;
        loop {
            match Self::open_once(&backend, &options).await {
                Ok(queue) => return Ok(queue),
                Err(QueueError::NotFound(name)) => {
                    return Err(ServiceError::QueueNotFound(name));
                }
                Err(e) if e.is_transient() && attempt < OPEN_RETRIES => {
                    attempt += 1;
                    tracing::warn!(
                        queue = %options.name,
                        attempt,
                        error = %e,
                        "transient error opening queue, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn open_once(backend: &B, options: &QueueOptions) -> Result<WorkQueue<B>, QueueError> {
        let fifo = options.name.ends_with(FIFO_SUFFIX);
        let exists = backend.queue_exists(&options.name).await?;

        let visibility_timeout_sec = if exists {
            let current = backend.visibility_timeout(&options.name).await?;
            if current != options.visibility_timeout_sec {
                if options.owned {
                    backend
                        .set_visibility_timeout(&options.name, options.visibility_timeout_sec)
                        .await?;
                    tracing::info!(
                        queue = %options.name,
                        from = current,
                        to = options.visibility_timeout_sec,
                        "updated visibility timeout on owned queue"
                    );
                    options.visibility_timeout_sec
                } else {
                    tracing::warn!(
                        queue = %options.name,
                        configured = options.visibility_timeout_sec,
                        adopted = current,
                        "unowned queue has a different visibility timeout, adopting it"
                    );
                    current
                }
            } else {
                current
            }
        } else {
            if !options.owned || !options.auto_create {
                return Err(QueueError::NotFound(options.name.clone()));
            }
            backend
                .create_queue(&options.name, options.visibility_timeout_sec, fifo)
                .await?;
            tracing::info!(queue = %options.name, fifo, "created owned queue");
            options.visibility_timeout_sec
        };

        Ok(WorkQueue {
            backend: backend.clone(),
            name: options.name.clone(),
            visibility_timeout_sec,
            fifo,
            owned: options.owned,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn visibility_timeout_sec(&self) -> u32 {
        self.visibility_timeout_sec
    }

    pub fn is_owned(&self) -> bool {
        self.owned
    }

    pub async fn enqueue(&self, body: &str) -> Result<String, QueueError> {
        let group = self.fifo.then_some(MESSAGE_GROUP);
        self.backend.send(&self.name, body, group).await
    }

    /// Dequeue up to `max` messages with long-polling.
    pub async fn dequeue(
        &self,
        max: usize,
        long_poll: Duration,
        visibility_override_sec: Option<u32>,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        self.backend.receive(&self.name, max, long_poll, visibility_override_sec).await
    }

    /// Refresh the lease for a receipt by the queue's own visibility
    /// timeout.
    pub async fn extend_visibility(&self, receipt_handle: &str) -> Result<(), QueueError> {
        self.backend
            .change_visibility(&self.name, receipt_handle, self.visibility_timeout_sec)
            .await
    }

    pub async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError> {
        self.backend.delete(&self.name, receipt_handle).await
    }

    pub async fn purge(&self) -> Result<(), QueueError> {
        self.backend.purge(&self.name).await
    }

    pub async fn size_estimate(&self, include_invisible: bool) -> Result<usize, QueueError> {
        self.backend.approx_size(&self.name, include_invisible).await
    }

    /// Delete the queue itself. Refused for unowned queues.
    pub async fn delete_queue(&self) -> Result<(), ServiceError> {
        if !self.owned {
            return Err(ServiceError::InvalidConfig(format!(
                "refusing to delete unowned queue {}",
                self.name
            )));
        }
        self.backend.delete_queue(&self.name).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
