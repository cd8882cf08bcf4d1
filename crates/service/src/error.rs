// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Service-level error taxonomy.

use lf_adapters::{CredentialError, QueueError};
use thiserror::Error;

/// Errors surfaced by the service chassis.
///
/// Only two are fatal: `QueueNotFound` (at service init) and
/// `WatchdogAbort`. Everything else is caught at the top of the loop that
/// produced it, logged, and throttled.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("queue not found: {0}")]
    QueueNotFound(String),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error("free memory stayed below the abort threshold")]
    WatchdogAbort,

    #[error("handler cannot construct a recycled copy for this payload")]
    RecycleUnsupported,
}
