// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in echo handler for the bare worker binary.
//!
//! Pipeline commands embed the chassis with their own handler; the binary
//! ships this one so `--service` runs end to end on its own: it accepts
//! every message, logs the canonical URL, and succeeds.

use async_trait::async_trait;
use lf_core::ParsedMessage;
use lf_service::{Acceptance, HandlerError, MessageHandler, WorkItem};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct LogHandler;

#[async_trait]
impl MessageHandler for LogHandler {
    fn accept(&self, _parsed: &ParsedMessage) -> Acceptance {
        Acceptance::Accept
    }

    async fn handle(
        &self,
        work: &WorkItem,
        cancel: CancellationToken,
    ) -> Result<bool, HandlerError> {
        if cancel.is_cancelled() {
            return Err(HandlerError::new("cancelled before start"));
        }
        tracing::info!(url = %work.parsed.url, "echo handler processed message");
        Ok(true)
    }

    fn recycled_copy(&self, work: &WorkItem) -> Option<String> {
        Some(work.message.body.clone())
    }
}
