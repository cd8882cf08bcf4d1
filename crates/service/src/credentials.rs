// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduled credential refresh with lock discipline.
//!
//! Refreshing swaps the credential bundle and re-creates the queue handles
//! through the registered factory, all while holding `L_cred` then `L_long`
//! so no cloud call and no in-flight handler sees a half-rotated world. A
//! bounded wait on either monitor turns the refresh into a no-op; the next
//! check retries.

use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::locks::{acquire, Monitors};
use crate::queue::{QueueOptions, WorkQueue};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use lf_adapters::{CredentialSource, Credentials, QueueBackend};
use lf_core::Clock;
use std::sync::Arc;
use std::time::Duration;

/// The primary queue handle plus the optional fail-queue sibling.
pub struct ServiceQueues<B: QueueBackend> {
    pub main: WorkQueue<B>,
    pub fail: Option<WorkQueue<B>>,
}

/// Builds queue handles for a credential bundle.
///
/// Cloud backends construct clients keyed on the token; rotation disposes
/// the old handles by swapping the [`ArcSwap`] the chassis reads through.
#[async_trait]
pub trait ClientFactory<B: QueueBackend>: Send + Sync + 'static {
    async fn build(&self, credentials: &Credentials) -> Result<ServiceQueues<B>, ServiceError>;
}

/// Factory that reopens queues against a fixed backend handle.
///
/// Suits backends whose connection does not embed credentials (the memory
/// backend, profile-based clients).
pub struct ReopenFactory<B: QueueBackend> {
    backend: B,
    main: QueueOptions,
    fail: Option<QueueOptions>,
}

impl<B: QueueBackend> ReopenFactory<B> {
    pub fn new(backend: B, main: QueueOptions, fail: Option<QueueOptions>) -> Self {
        Self { backend, main, fail }
    }

    /// Derive the queue options from a service configuration.
    pub fn from_config(backend: B, config: &ServiceConfig) -> Self {
        let main = QueueOptions {
            name: config.queue_name.clone(),
            visibility_timeout_sec: config.message_timeout_sec,
            owned: config.owned_queue,
            auto_create: config.owned_queue,
        };
        let fail = config.fail_queue_name().map(|name| QueueOptions {
            name,
            visibility_timeout_sec: config.message_timeout_sec,
            owned: config.owned_fail_queue,
            auto_create: config.owned_fail_queue,
        });
        Self::new(backend, main, fail)
    }
}

#[async_trait]
impl<B: QueueBackend> ClientFactory<B> for ReopenFactory<B> {
    async fn build(&self, _credentials: &Credentials) -> Result<ServiceQueues<B>, ServiceError> {
        let main = WorkQueue::open(self.backend.clone(), self.main.clone()).await?;
        let fail = match &self.fail {
            Some(options) => Some(WorkQueue::open(self.backend.clone(), options.clone()).await?),
            None => None,
        };
        Ok(ServiceQueues { main, fail })
    }
}

/// Outcome of a refresh check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStatus {
    /// Not due yet (or scheduled refresh disabled).
    Fresh,
    /// Credentials reloaded and queue handles rebuilt.
    Refreshed,
    /// A monitor wait timed out; retry next tick.
    LockBusy,
    /// The source or the factory failed; retry next tick.
    Failed,
}

struct CredState {
    last_refresh_ms: u64,
    current: Credentials,
}

/// Owns the credential bundle and the rotation schedule.
pub struct CredentialManager<S: CredentialSource, C: Clock, B: QueueBackend> {
    source: S,
    clock: C,
    period: Option<Duration>,
    monitors: Arc<Monitors>,
    factory: Arc<dyn ClientFactory<B>>,
    queues: Arc<ArcSwap<ServiceQueues<B>>>,
    state: parking_lot::Mutex<CredState>,
}

impl<S: CredentialSource, C: Clock, B: QueueBackend> CredentialManager<S, C, B> {
    /// Load the initial bundle and build the initial queue handles.
    ///
    /// A failed initial load is tolerated with an empty bundle (backends
    /// that need no credentials, e.g. the memory backend, still come up);
    /// a failed initial queue build is fatal.
    pub async fn init(
        source: S,
        clock: C,
        period: Option<Duration>,
        monitors: Arc<Monitors>,
        factory: Arc<dyn ClientFactory<B>>,
    ) -> Result<Self, ServiceError> {
        let current = match source.load().await {
            Ok(credentials) => credentials,
            Err(e) => {
                tracing::warn!(error = %e, "initial credential load failed, starting with empty bundle");
                Credentials::default()
            }
        };
        let queues = Arc::new(ArcSwap::from_pointee(factory.build(&current).await?));
        let last_refresh_ms = clock.epoch_ms();
        Ok(Self {
            source,
            clock,
            period,
            monitors,
            factory,
            queues,
            state: parking_lot::Mutex::new(CredState { last_refresh_ms, current }),
        })
    }

    /// Shared queue-handle cell; the service loop and heartbeat read
    /// through this so rotation swaps under them.
    pub fn queues(&self) -> Arc<ArcSwap<ServiceQueues<B>>> {
        self.queues.clone()
    }

    pub fn current_credentials(&self) -> Credentials {
        self.state.lock().current.clone()
    }

    fn due(&self) -> bool {
        let Some(period) = self.period else { return false };
        let last = self.state.lock().last_refresh_ms;
        self.clock.epoch_ms().saturating_sub(last) >= period.as_millis() as u64
    }

    /// Refresh when due (or forced), under `L_cred → L_long`.
    pub async fn check_and_refresh(&self, force: bool) -> RefreshStatus {
        if !force && !self.due() {
            return RefreshStatus::Fresh;
        }

        let Some(_cred_guard) = acquire(&self.monitors.cred, "cred").await else {
            return RefreshStatus::LockBusy;
        };
        let Some(_long_guard) = acquire(&self.monitors.long, "long").await else {
            return RefreshStatus::LockBusy;
        };

        let credentials = match self.source.load().await {
            Ok(credentials) => credentials,
            Err(e) => {
                tracing::warn!(error = %e, "credential refresh failed");
                return RefreshStatus::Failed;
            }
        };
        match self.factory.build(&credentials).await {
            Ok(rebuilt) => {
                self.queues.store(Arc::new(rebuilt));
            }
            Err(e) => {
                tracing::warn!(error = %e, "queue rebuild after credential refresh failed");
                return RefreshStatus::Failed;
            }
        }

        let now_ms = self.clock.epoch_ms();
        {
            let mut state = self.state.lock();
            state.current = credentials;
            state.last_refresh_ms = now_ms;
        }
        tracing::info!("credentials refreshed and queue clients rebuilt");
        RefreshStatus::Refreshed
    }
}

#[cfg(test)]
#[path = "credentials_tests.rs"]
mod tests;
