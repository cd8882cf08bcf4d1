// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! lf-core: message codec, resource URLs, and time abstraction for the
//! Landform worker chassis.

pub mod clock;
pub mod message;
pub mod url;

pub use clock::{Clock, FakeClock, SystemClock};
pub use message::{
    describe_body, parse_body, try_alternate, CodecError, MessageKind, ParsedMessage, QueueMessage,
    DEFAULT_EVENT_PREFIX,
};
pub use url::{GlobOptions, ResourceUrl, UrlError, UrlGlob};
