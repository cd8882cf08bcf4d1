// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound payload codec.
//!
//! Three wire shapes are recognized:
//!
//! - **Generic** — `{"url": "scheme://..."}` or a bare URL line.
//! - **StorageEvent** — the object-store notification record
//!   (`{"Records": [{"eventName": ..., "s3": {...}}]}`).
//! - **WrappedNotification** — a pub/sub envelope whose `Message` field is
//!   an inner storage-event JSON string.
//!
//! Every accepted shape reduces to one canonical [`ResourceUrl`].

use crate::url::{percent_decode, ResourceUrl};
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// Event-name prefix a storage-event record must carry unless the caller
/// overrides it.
pub const DEFAULT_EVENT_PREFIX: &str = "ObjectCreated";

/// Payload variant selected by configuration (`message-type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Generic,
    StorageEvent,
    WrappedNotification,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Generic => "Generic",
            MessageKind::StorageEvent => "S3Event",
            MessageKind::WrappedNotification => "SNSWrappedS3Event",
        };
        write!(f, "{name}")
    }
}

impl FromStr for MessageKind {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "generic" => Ok(MessageKind::Generic),
            "s3event" => Ok(MessageKind::StorageEvent),
            "snswrappeds3event" => Ok(MessageKind::WrappedNotification),
            _ => Err(CodecError::UnknownKind(s.to_string())),
        }
    }
}

/// Errors from payload parsing.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("unknown message type: {0}")]
    UnknownKind(String),
}

/// A payload reduced to its canonical resource URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    pub url: ResourceUrl,
    pub kind: MessageKind,
}

/// A received queue message with its queue-side metadata.
///
/// Immutable after receipt; dropped when deleted from the queue or when its
/// handler completes.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
    pub sent_at_ms: u64,
    pub first_received_at_ms: u64,
    pub receive_count: u32,
}

impl QueueMessage {
    /// Age measured from first send.
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.sent_at_ms)
    }
}

/// Parse a raw body as the configured variant.
pub fn parse_body(
    kind: MessageKind,
    body: &str,
    event_prefix: &str,
) -> Result<ParsedMessage, CodecError> {
    let url = match kind {
        MessageKind::Generic => parse_generic(body)?,
        MessageKind::StorageEvent => parse_storage_event(body, event_prefix)?,
        MessageKind::WrappedNotification => parse_wrapped(body, event_prefix)?,
    };
    Ok(ParsedMessage { url, kind })
}

fn parse_generic(body: &str) -> Result<ResourceUrl, CodecError> {
    let trimmed = body.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if let Some(url) = value.get("url").and_then(Value::as_str) {
            return ResourceUrl::parse(url)
                .map_err(|e| CodecError::Malformed(format!("bad url field: {e}")));
        }
        // JSON without a url field is malformed even if a bare-line parse
        // would have succeeded on the raw text.
        if value.is_object() {
            return Err(CodecError::Malformed("generic object missing 'url'".to_string()));
        }
    }
    ResourceUrl::parse(trimmed).map_err(|e| CodecError::Malformed(format!("not a url line: {e}")))
}

fn parse_storage_event(body: &str, event_prefix: &str) -> Result<ResourceUrl, CodecError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| CodecError::Malformed(format!("storage event is not JSON: {e}")))?;
    storage_event_url(&value, event_prefix)
}

fn storage_event_url(value: &Value, event_prefix: &str) -> Result<ResourceUrl, CodecError> {
    let records = value
        .get("Records")
        .and_then(Value::as_array)
        .ok_or_else(|| CodecError::Malformed("storage event missing Records".to_string()))?;
    if records.len() != 1 {
        return Err(CodecError::Malformed(format!(
            "expected exactly one record, got {}",
            records.len()
        )));
    }
    let record = &records[0];
    let event_name = record
        .get("eventName")
        .and_then(Value::as_str)
        .ok_or_else(|| CodecError::Malformed("record missing eventName".to_string()))?;
    if !event_name.starts_with(event_prefix) {
        return Err(CodecError::Malformed(format!(
            "event '{event_name}' does not match prefix '{event_prefix}'"
        )));
    }
    let s3 = record
        .get("s3")
        .ok_or_else(|| CodecError::Malformed("record missing s3 section".to_string()))?;
    let bucket = s3
        .get("bucket")
        .and_then(|b| b.get("name"))
        .and_then(Value::as_str)
        .ok_or_else(|| CodecError::Malformed("record missing bucket name".to_string()))?;
    let key = s3
        .get("object")
        .and_then(|o| o.get("key"))
        .and_then(Value::as_str)
        .ok_or_else(|| CodecError::Malformed("record missing object key".to_string()))?;
    ResourceUrl::new("s3", bucket, &percent_decode(key))
        .map_err(|e| CodecError::Malformed(format!("bad record url: {e}")))
}

fn parse_wrapped(body: &str, event_prefix: &str) -> Result<ResourceUrl, CodecError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| CodecError::Malformed(format!("notification is not JSON: {e}")))?;
    let kind = value.get("Type").and_then(Value::as_str);
    if kind != Some("Notification") {
        return Err(CodecError::Malformed(format!("unexpected notification Type: {kind:?}")));
    }
    let inner = value
        .get("Message")
        .and_then(Value::as_str)
        .ok_or_else(|| CodecError::Malformed("notification missing Message".to_string()))?;
    parse_storage_event(inner, event_prefix)
}

#[allow(clippy::unwrap_used)] // literal pattern
fn storage_event_gate() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""Records"\s*:\s*\["#).unwrap())
}

/// Shape-sniffing fallback chain: bare URL, then generic JSON, then
/// storage-event JSON (regex-gated so arbitrary JSON is not force-fed
/// through the record parser). Total: `None` means no shape matched.
pub fn try_alternate(body: &str) -> Option<ParsedMessage> {
    let trimmed = body.trim();
    if let Ok(url) = ResourceUrl::parse(trimmed) {
        return Some(ParsedMessage { url, kind: MessageKind::Generic });
    }
    if let Ok(parsed) = parse_body(MessageKind::Generic, trimmed, DEFAULT_EVENT_PREFIX) {
        return Some(parsed);
    }
    if storage_event_gate().is_match(trimmed) {
        if let Ok(url) = parse_storage_event(trimmed, DEFAULT_EVENT_PREFIX) {
            return Some(ParsedMessage { url, kind: MessageKind::StorageEvent });
        }
    }
    None
}

/// Best-effort description of a raw body for logs; never fails.
pub fn describe_body(body: &str) -> String {
    if let Some(parsed) = try_alternate(body) {
        return parsed.url.to_string();
    }
    if let Ok(parsed) = parse_body(MessageKind::WrappedNotification, body, DEFAULT_EVENT_PREFIX) {
        return parsed.url.to_string();
    }
    let preview: String = body.chars().take(48).collect();
    format!("<unparsed payload: {preview}...>")
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
