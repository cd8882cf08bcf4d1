// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The dispatch state machine.
//!
//! Per iteration: credential check, idle branch, dequeue, age cull,
//! accept/reject, handler dispatch, outcome routing. Errors escaping an
//! iteration are caught at the top of the loop and throttled.
//!
//! Dequeue runs without the `cred` monitor on purpose: the credential
//! refresh runs on this same task, so a swap can never overlap the long
//! poll, and holding `cred` for up to the long-poll interval would starve
//! the heartbeat.

use crate::config::ServiceConfig;
use crate::credentials::{ClientFactory, CredentialManager, ServiceQueues};
use crate::error::ServiceError;
use crate::handler::{Acceptance, Disposition, MessageHandler, WorkItem};
use crate::heartbeat::Heartbeat;
use crate::lifecycle::LifecycleController;
use crate::locks::{acquire, Monitors};
use crate::slot::{InFlight, InFlightSlot};
use crate::watchdog::{Watchdog, WatchdogStatsHandle, WatchdogVerdict};
use lf_adapters::{CredentialSource, HostMonitor, InstanceControl, QueueBackend};
use lf_core::{parse_body, Clock, ParsedMessage, QueueMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Sleep between iterations while idle-committed.
const IDLE_TICK: Duration = Duration::from_secs(1);

/// The assembled worker service.
pub struct Service<B, I, S, M, C>
where
    B: QueueBackend,
    I: InstanceControl,
    S: CredentialSource,
    M: HostMonitor,
    C: Clock,
{
    config: ServiceConfig,
    handler: Arc<dyn MessageHandler>,
    monitors: Arc<Monitors>,
    slot: Arc<InFlightSlot>,
    credentials: Arc<CredentialManager<S, C, B>>,
    queues: Arc<arc_swap::ArcSwap<ServiceQueues<B>>>,
    lifecycle: Arc<LifecycleController<I, C>>,
    watchdog_stats: WatchdogStatsHandle,
    cache_clear: Option<Arc<dyn Fn() + Send + Sync>>,
    host: M,
    clock: C,
}

impl<B, I, S, M, C> Service<B, I, S, M, C>
where
    B: QueueBackend,
    I: InstanceControl,
    S: CredentialSource,
    M: HostMonitor,
    C: Clock,
{
    /// Open queues, resolve instance identity, and assemble the service.
    ///
    /// Fails fast on invalid configuration and on a missing unowned queue.
    pub async fn init(
        config: ServiceConfig,
        factory: Arc<dyn ClientFactory<B>>,
        handler: Arc<dyn MessageHandler>,
        control: I,
        source: S,
        host: M,
        clock: C,
    ) -> Result<Self, ServiceError> {
        config.validate()?;
        let monitors = Arc::new(Monitors::new());
        let credentials = Arc::new(
            CredentialManager::init(
                source,
                clock.clone(),
                config.credential_refresh_sec.map(Duration::from_secs),
                monitors.clone(),
                factory,
            )
            .await?,
        );
        let queues = credentials.queues();
        let lifecycle = Arc::new(
            LifecycleController::init(
                control,
                clock.clone(),
                config.idle_shutdown_method,
                config.auto_scale_group.clone(),
                config.idle_shutdown_sec.map(Duration::from_secs),
                Duration::from_secs(config.idle_shutdown_failsafe_sec),
                config.idle_event_throttle,
            )
            .await,
        );
        Ok(Self {
            config,
            handler,
            monitors,
            slot: Arc::new(InFlightSlot::new()),
            credentials,
            queues,
            lifecycle,
            watchdog_stats: WatchdogStatsHandle::new(),
            cache_clear: None,
            host,
            clock,
        })
    }

    /// Memory-shedding hook forwarded to the watchdog.
    pub fn with_cache_clear(mut self, hook: Arc<dyn Fn() + Send + Sync>) -> Self {
        self.cache_clear = Some(hook);
        self
    }

    pub fn watchdog_stats(&self) -> WatchdogStatsHandle {
        self.watchdog_stats.clone()
    }

    /// Run until the watchdog aborts. Spawns the heartbeat and watchdog
    /// loops; the dispatch loop runs on this task.
    pub async fn run(&self) -> Result<(), ServiceError> {
        let cancel = CancellationToken::new();

        let heartbeat = Heartbeat::new(
            self.queues.clone(),
            self.slot.clone(),
            self.monitors.clone(),
            self.clock.clone(),
            Duration::from_secs(self.config.max_handler_sec),
            self.config.heartbeat_fraction,
        );
        let heartbeat_task = tokio::spawn(heartbeat.run(cancel.child_token()));

        let mut watchdog = Watchdog::new(
            self.host.clone(),
            self.clock.clone(),
            &self.config.watchdog,
            self.watchdog_stats.clone(),
        )?;
        if let Some(hook) = &self.cache_clear {
            watchdog = watchdog.with_cache_clear(hook.clone());
        }
        let watchdog_task = tokio::spawn(watchdog.run(cancel.child_token()));

        let result = tokio::select! {
            verdict = watchdog_task => {
                match verdict {
                    Ok(WatchdogVerdict::Abort) => {
                        if let Some(in_flight) = self.slot.load() {
                            tracing::warn!(
                                message = %in_flight.message.message_id,
                                "watchdog abort, cancelling in-flight handler"
                            );
                            in_flight.cancel.cancel();
                        }
                        Err(ServiceError::WatchdogAbort)
                    }
                    _ => Ok(()),
                }
            }
            () = self.dispatch_loop() => Ok(()),
        };

        cancel.cancel();
        heartbeat_task.abort();
        result
    }

    async fn dispatch_loop(&self) {
        loop {
            if let Err(e) = self.iteration().await {
                tracing::error!(error = %e, throttle = ?self.config.loop_throttle, "service loop error");
                tokio::time::sleep(self.config.loop_throttle).await;
            }
        }
    }

    /// One pass of the dispatch state machine.
    pub(crate) async fn iteration(&self) -> Result<(), ServiceError> {
        let started = self.clock.now();
        self.credentials.check_and_refresh(false).await;

        if self.lifecycle.is_committed() {
            self.lifecycle.on_idle_tick().await;
            tokio::time::sleep(IDLE_TICK).await;
            return Ok(());
        }

        let queues = self.queues.load_full();
        let received = queues
            .main
            .dequeue(1, Duration::from_secs(self.config.long_poll_sec), None)
            .await?;

        match received.into_iter().next() {
            Some(message) => {
                self.lifecycle.note_activity();
                self.process_message(&queues, message).await?;
            }
            None => {
                self.lifecycle.note_empty();
            }
        }

        let elapsed = self.clock.now().saturating_duration_since(started);
        let throttle = Duration::from_millis(self.config.throttle_ms);
        if elapsed < throttle {
            tokio::time::sleep(throttle - elapsed).await;
        }
        Ok(())
    }

    /// Classify, dispatch, and dispose of one received message.
    pub(crate) async fn process_message(
        &self,
        queues: &ServiceQueues<B>,
        message: QueueMessage,
    ) -> Result<Disposition, ServiceError> {
        let now_ms = self.clock.epoch_ms();
        let age_ms = message.age_ms(now_ms);

        if self.config.max_message_age_sec > 0 && age_ms > self.config.max_message_age_sec * 1000 {
            tracing::warn!(
                message = %message.message_id,
                age_ms,
                limit_sec = self.config.max_message_age_sec,
                "message too old, culling"
            );
            self.cull(queues, &message).await;
            return Ok(Disposition::TooOld);
        }
        if self.config.max_receive_count > 0 && message.receive_count > self.config.max_receive_count
        {
            tracing::warn!(
                message = %message.message_id,
                receives = message.receive_count,
                limit = self.config.max_receive_count,
                "receive count exceeded, culling"
            );
            self.cull(queues, &message).await;
            return Ok(Disposition::OverRetry);
        }

        let parsed = match self.parse(&message.body) {
            Ok(parsed) => parsed,
            Err(reason) => {
                tracing::warn!(message = %message.message_id, %reason, "malformed payload, dropping");
                self.cull(queues, &message).await;
                return Ok(Disposition::Malformed(reason));
            }
        };

        if let Acceptance::Reject(reason) = self.handler.accept(&parsed) {
            if self.config.suppress_rejections {
                tracing::debug!(url = %parsed.url, %reason, "message rejected");
            } else {
                tracing::info!(url = %parsed.url, %reason, "message rejected");
            }
            self.delete_only(queues, &message).await;
            return Ok(Disposition::Rejected(reason));
        }

        self.dispatch(queues, message, parsed).await
    }

    fn parse(&self, body: &str) -> Result<ParsedMessage, String> {
        if let Some(parsed) = self.handler.alternate_parse(body) {
            return Ok(parsed);
        }
        parse_body(self.config.message_kind, body, &self.config.event_prefix)
            .map_err(|e| e.to_string())
    }

    async fn dispatch(
        &self,
        queues: &ServiceQueues<B>,
        message: QueueMessage,
        parsed: ParsedMessage,
    ) -> Result<Disposition, ServiceError> {
        let description = self.handler.describe(&parsed, false);
        tracing::info!(message = %message.message_id, url = %description, "handling message");

        self.watchdog_stats.reset();
        let in_flight =
            Arc::new(InFlight::new(message.clone(), description, self.clock.epoch_ms()));
        self.slot.put(in_flight.clone());

        let work = WorkItem { message, parsed };
        let result = {
            // Held for the whole handler run so a credential swap cannot
            // land mid-message. The refresh gives up after its bounded
            // wait and retries later, so this never deadlocks it.
            let _long = self.monitors.long.lock().await;
            self.handler.handle(&work, in_flight.cancel.clone()).await
        };

        let disposition = match result {
            Ok(true) => Disposition::Handled,
            Ok(false) => Disposition::Failed {
                error: "handler returned false".to_string(),
                killed: in_flight.was_killed(),
            },
            Err(e) => Disposition::Failed { error: e.to_string(), killed: in_flight.was_killed() },
        };

        self.route_outcome(queues, &work, &disposition).await;
        Ok(disposition)
    }

    /// Delete / recycle / fail-forward per the outcome, then clear the
    /// in-flight slot. All queue mutation happens under `cred → del` so it
    /// never overlaps a heartbeat extension.
    async fn route_outcome(
        &self,
        queues: &ServiceQueues<B>,
        work: &WorkItem,
        disposition: &Disposition,
    ) {
        let Some(_cred) = acquire(&self.monitors.cred, "cred").await else {
            self.slot.clear();
            return;
        };
        let Some(_del) = acquire(&self.monitors.del, "del").await else {
            self.slot.clear();
            return;
        };

        let message = &work.message;
        match disposition {
            Disposition::Handled => {
                self.delete_logged(queues, message).await;
                tracing::info!(message = %message.message_id, "handled");
            }
            Disposition::Failed { error, killed } => {
                if *killed && self.config.drop_poison_messages {
                    self.delete_logged(queues, message).await;
                    tracing::warn!(
                        message = %message.message_id,
                        %error,
                        "poison message dropped without retry"
                    );
                } else if self.config.deprioritize_retries {
                    match self.handler.recycled_copy(work) {
                        Some(body) => {
                            self.delete_logged(queues, message).await;
                            match queues.main.enqueue(&body).await {
                                Ok(id) => tracing::info!(
                                    message = %message.message_id,
                                    recycled = %id,
                                    %error,
                                    "failed message recycled to queue tail"
                                ),
                                Err(e) => tracing::error!(
                                    message = %message.message_id,
                                    error = %e,
                                    "recycle enqueue failed, message lost from main queue"
                                ),
                            }
                        }
                        None => {
                            tracing::error!(
                                message = %message.message_id,
                                %error,
                                problem = %ServiceError::RecycleUnsupported,
                                "recycle unavailable, failing instead"
                            );
                            self.delete_logged(queues, message).await;
                            self.forward_to_fail(queues, message).await;
                        }
                    }
                } else {
                    self.delete_logged(queues, message).await;
                    self.forward_to_fail(queues, message).await;
                    tracing::warn!(message = %message.message_id, %error, "handler failed");
                }
            }
            // Rejected / culled messages never reach this path.
            _ => {}
        }

        self.slot.clear();
    }

    async fn delete_logged(&self, queues: &ServiceQueues<B>, message: &QueueMessage) {
        if let Err(e) = queues.main.delete(&message.receipt_handle).await {
            tracing::warn!(message = %message.message_id, error = %e, "delete failed");
        }
    }

    async fn forward_to_fail(&self, queues: &ServiceQueues<B>, message: &QueueMessage) {
        match &queues.fail {
            Some(fail) => {
                if let Err(e) = fail.enqueue(&message.body).await {
                    tracing::warn!(message = %message.message_id, error = %e, "fail-queue forward failed");
                }
            }
            None => {
                tracing::debug!(message = %message.message_id, "no fail queue configured, dropping");
            }
        }
    }

    /// Remove a message that never reached the handler (cull or malformed):
    /// delete from main, then forward to the fail queue when configured.
    async fn cull(&self, queues: &ServiceQueues<B>, message: &QueueMessage) {
        let Some(_cred) = acquire(&self.monitors.cred, "cred").await else { return };
        let Some(_del) = acquire(&self.monitors.del, "del").await else { return };
        self.delete_logged(queues, message).await;
        self.forward_to_fail(queues, message).await;
    }

    /// Delete without fail-queue forwarding (rejections).
    async fn delete_only(&self, queues: &ServiceQueues<B>, message: &QueueMessage) {
        let Some(_cred) = acquire(&self.monitors.cred, "cred").await else { return };
        let Some(_del) = acquire(&self.monitors.del, "del").await else { return };
        self.delete_logged(queues, message).await;
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
