// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The contract application code plugs into.
//!
//! The chassis consumes five capabilities: accept, handle, describe,
//! alternate-parse, and recycle-construct. Domain types never cross this
//! boundary; the handler sees only the canonical URL and the raw payload.

use async_trait::async_trait;
use lf_core::{ParsedMessage, QueueMessage};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Application failure surfaced through [`MessageHandler::handle`].
#[derive(Debug, Error)]
#[error("handler failure: {0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Admission decision from [`MessageHandler::accept`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acceptance {
    Accept,
    Reject(String),
}

/// One unit of work: the received message plus its parsed canonical form.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub message: QueueMessage,
    pub parsed: ParsedMessage,
}

/// How the service loop disposed of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Handler succeeded; message deleted.
    Handled,
    /// Handler declined the message; deleted without fail-queue forward.
    Rejected(String),
    /// Handler threw (or returned `false`); `killed` marks a time-budget
    /// cancellation.
    Failed { error: String, killed: bool },
    /// Culled before dispatch: message age exceeded the limit.
    TooOld,
    /// Culled before dispatch: receive count exceeded the limit.
    OverRetry,
    /// Payload did not parse as any accepted shape.
    Malformed(String),
}

/// The application-supplied message handler.
///
/// `handle` runs on the service loop's task and must observe the
/// cancellation token: when the wall-clock budget expires the token is
/// cancelled and any external work (child processes, remote jobs) the
/// handler started is expected to be torn down through it.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Fast, non-blocking admission check. Must not fail.
    fn accept(&self, parsed: &ParsedMessage) -> Acceptance;

    /// Process one unit of work. `Ok(false)` is treated as a failure.
    async fn handle(
        &self,
        work: &WorkItem,
        cancel: CancellationToken,
    ) -> Result<bool, HandlerError>;

    /// One-line description for logs. Must not fail.
    fn describe(&self, parsed: &ParsedMessage, _verbose: bool) -> String {
        parsed.url.to_string()
    }

    /// Optional payload-shape override, consulted before the configured
    /// variant. Returning `Some` overrides parsing for that one message.
    fn alternate_parse(&self, _body: &str) -> Option<ParsedMessage> {
        None
    }

    /// Construct a fresh payload body equivalent to this work item, for
    /// re-enqueueing at the tail of the queue. Required when retry
    /// deprioritization is enabled; `None` downgrades recycling to the
    /// fail path.
    fn recycled_copy(&self, _work: &WorkItem) -> Option<String> {
        None
    }
}
