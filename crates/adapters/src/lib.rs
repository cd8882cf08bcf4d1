// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! lf-adapters: narrow seams to the worker's external collaborators.
//!
//! The service core never talks to a cloud SDK directly; it consumes the
//! traits defined here. Each trait ships with a production-shaped
//! implementation and, under the `test-support` feature, a recording fake.

pub mod credentials;
pub mod host;
pub mod instance;
pub mod memory;
pub mod queue;

pub use credentials::{CredentialError, CredentialSource, Credentials, EnvCredentialSource};
pub use host::{HostError, HostMonitor, SysinfoMonitor};
pub use instance::{HostInstanceControl, InstanceControl, InstanceError};
pub use memory::MemoryQueueBackend;
pub use queue::{QueueBackend, QueueError};

#[cfg(any(test, feature = "test-support"))]
pub use credentials::FakeCredentialSource;
#[cfg(any(test, feature = "test-support"))]
pub use host::FakeHostMonitor;
#[cfg(any(test, feature = "test-support"))]
pub use instance::{FakeInstanceControl, InstanceCall};
