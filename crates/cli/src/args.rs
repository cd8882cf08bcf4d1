// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker CLI surface and option resolution.

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use lf_core::MessageKind;
use lf_service::config::{
    FailQueueMode, ServiceConfig, WatchdogConfig, DEFAULT_IDLE_FAILSAFE_SEC,
    DEFAULT_WATCHDOG_PERIOD_SEC,
};
use lf_service::{IdleShutdownMethod, WatchedProcess};
use std::time::Duration;

use crate::env;

/// Verb used for `LANDFORM_<VERB>_<OPT>` environment lookups.
pub const ENV_VERB: &str = "worker";

/// Site-default agents behind the literal `mission` option value.
const MISSION_SSM_PROCESS: &str = "amazon-ssm-agent";
const MISSION_SSM_COMMAND: &str = "systemctl restart amazon-ssm-agent";
const MISSION_CLOUDWATCH_PROCESS: &str = "amazon-cloudwatch-agent";
const MISSION_CLOUDWATCH_COMMAND: &str = "systemctl restart amazon-cloudwatch-agent";

#[derive(Parser, Debug, Default)]
#[command(name = "lfworker", about = "Landform pipeline worker service")]
pub struct WorkerArgs {
    /// Run as a persistent service worker (mutually exclusive with the
    /// operator modes below)
    #[arg(long)]
    pub service: bool,

    /// Primary work queue name
    #[arg(long)]
    pub queuename: Option<String>,

    /// Fail queue: a name, "none", or "auto" (primary + "-fail")
    #[arg(long)]
    pub failqueuename: Option<String>,

    /// This fleet owns the primary queue (allows auto-create)
    #[arg(long, alias = "landform-owned-queues")]
    pub landform_owned_queue: bool,

    /// This fleet owns the fail queue
    #[arg(long)]
    pub landform_owned_fail_queue: bool,

    /// Payload variant: Generic, S3Event, or SNSWrappedS3Event
    #[arg(long)]
    pub message_type: Option<String>,

    /// Queue visibility timeout, seconds
    #[arg(long)]
    pub message_timeout_sec: Option<u32>,

    /// Handler wall-clock budget, seconds
    #[arg(long)]
    pub max_handler_sec: Option<u64>,

    /// Cull messages older than this, seconds
    #[arg(long)]
    pub max_message_age_sec: Option<u64>,

    /// Cull messages received more than this many times
    #[arg(long)]
    pub max_receive_count: Option<u32>,

    /// Drop killed (time-budget) messages without retry
    #[arg(long)]
    pub drop_poison_messages: bool,

    /// Re-enqueue failed messages at the tail instead of fail-forwarding
    #[arg(long)]
    pub deprioritize_retries: bool,

    /// Log handler rejections at debug instead of info
    #[arg(long)]
    pub suppress_rejections: bool,

    /// Commit to idle after this many seconds without work
    #[arg(long)]
    pub idle_shutdown_sec: Option<u64>,

    /// OS shutdown failsafe after this long idle-committed, seconds
    #[arg(long)]
    pub idle_shutdown_failsafe_sec: Option<u64>,

    /// None, StopInstance, Shutdown, StopInstanceOrShutdown, ScaleToZero,
    /// LogIdle, or LogIdleProtected
    #[arg(long)]
    pub idle_shutdown_method: Option<String>,

    /// Autoscaling group for the ASG-facing shutdown methods
    #[arg(long)]
    pub auto_scale_group: Option<String>,

    /// Watchdog sampling period, seconds
    #[arg(long)]
    pub watchdog_period: Option<u64>,

    /// Free-memory warn threshold, GB (fractions of total below 1)
    #[arg(long)]
    pub watchdog_warn_gb: Option<f64>,

    /// Free-memory cache-clear threshold, GB
    #[arg(long)]
    pub watchdog_action_gb: Option<f64>,

    /// Free-memory abort threshold, GB
    #[arg(long)]
    pub watchdog_abort_gb: Option<f64>,

    /// Watched SSM agent process name; empty disables, "mission" uses the
    /// site default
    #[arg(long)]
    pub watchdog_ssm_process: Option<String>,

    /// Restart command for the SSM agent
    #[arg(long)]
    pub watchdog_ssm_command: Option<String>,

    /// Watched CloudWatch agent process name
    #[arg(long)]
    pub watchdog_cloudwatch_process: Option<String>,

    /// Restart command for the CloudWatch agent
    #[arg(long)]
    pub watchdog_cloudwatch_command: Option<String>,

    /// Allocate this many GiB to exercise the watchdog, then exit
    #[arg(long)]
    pub watchdog_leak_test: Option<usize>,

    /// Report liveness of the named processes (comma-separated) and exit
    #[arg(long, value_delimiter = ',')]
    pub check_processes: Option<Vec<String>>,

    /// Look at up to N messages on the main queue without consuming them
    #[arg(long)]
    pub peek: Option<usize>,

    /// Look at up to N messages on the fail queue
    #[arg(long)]
    pub peek_fail: Option<usize>,

    /// Dequeue and delete up to N messages from the main queue
    #[arg(long)]
    pub drop: Option<usize>,

    /// Dequeue and delete up to N messages from the fail queue
    #[arg(long)]
    pub drop_fail: Option<usize>,

    /// Move up to N messages from the fail queue back to the main queue
    #[arg(long)]
    pub retry: Option<usize>,

    /// Move up to N messages from the main queue to the fail queue
    #[arg(long)]
    pub fail: Option<usize>,

    /// Enqueue a payload: a resource URL or a payload file path
    #[arg(long)]
    pub send: Option<String>,

    /// Delete the main and fail queues (owned queues only)
    #[arg(long)]
    pub delete_queues: bool,
}

/// The one thing this invocation does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Service,
    Peek { count: usize, fail_queue: bool },
    Drop { count: usize, fail_queue: bool },
    Retry(usize),
    Fail(usize),
    Send(String),
    DeleteQueues,
    CheckProcesses(Vec<String>),
    LeakTest(usize),
}

impl WorkerArgs {
    /// Fill unset options from `LANDFORM_*` environment variables.
    pub fn apply_env_defaults(&mut self) {
        let verb = ENV_VERB;
        macro_rules! default_opt {
            ($field:ident, $opt:literal) => {
                if self.$field.is_none() {
                    self.$field = env::parse(verb, $opt);
                }
            };
        }
        macro_rules! default_flag {
            ($field:ident, $opt:literal) => {
                if !self.$field {
                    self.$field = env::flag(verb, $opt).unwrap_or(false);
                }
            };
        }

        default_opt!(queuename, "queuename");
        default_opt!(failqueuename, "failqueuename");
        default_opt!(message_type, "message-type");
        default_opt!(message_timeout_sec, "message-timeout-sec");
        default_opt!(max_handler_sec, "max-handler-sec");
        default_opt!(max_message_age_sec, "max-message-age-sec");
        default_opt!(max_receive_count, "max-receive-count");
        default_opt!(idle_shutdown_sec, "idle-shutdown-sec");
        default_opt!(idle_shutdown_failsafe_sec, "idle-shutdown-failsafe-sec");
        default_opt!(idle_shutdown_method, "idle-shutdown-method");
        default_opt!(auto_scale_group, "auto-scale-group");
        default_opt!(watchdog_period, "watchdog-period");
        default_opt!(watchdog_warn_gb, "watchdog-warn-gb");
        default_opt!(watchdog_action_gb, "watchdog-action-gb");
        default_opt!(watchdog_abort_gb, "watchdog-abort-gb");
        default_opt!(watchdog_ssm_process, "watchdog-ssm-process");
        default_opt!(watchdog_ssm_command, "watchdog-ssm-command");
        default_opt!(watchdog_cloudwatch_process, "watchdog-cloudwatch-process");
        default_opt!(watchdog_cloudwatch_command, "watchdog-cloudwatch-command");
        default_flag!(landform_owned_queue, "landform-owned-queue");
        default_flag!(landform_owned_fail_queue, "landform-owned-fail-queue");
        default_flag!(drop_poison_messages, "drop-poison-messages");
        default_flag!(deprioritize_retries, "deprioritize-retries");
        default_flag!(suppress_rejections, "suppress-rejections");
    }

    /// Resolve the (single) mode of this invocation.
    pub fn mode(&self) -> Result<Mode> {
        let mut modes: Vec<Mode> = Vec::new();
        if self.service {
            modes.push(Mode::Service);
        }
        if let Some(n) = self.peek {
            modes.push(Mode::Peek { count: n, fail_queue: false });
        }
        if let Some(n) = self.peek_fail {
            modes.push(Mode::Peek { count: n, fail_queue: true });
        }
        if let Some(n) = self.drop {
            modes.push(Mode::Drop { count: n, fail_queue: false });
        }
        if let Some(n) = self.drop_fail {
            modes.push(Mode::Drop { count: n, fail_queue: true });
        }
        if let Some(n) = self.retry {
            modes.push(Mode::Retry(n));
        }
        if let Some(n) = self.fail {
            modes.push(Mode::Fail(n));
        }
        if let Some(arg) = &self.send {
            modes.push(Mode::Send(arg.clone()));
        }
        if self.delete_queues {
            modes.push(Mode::DeleteQueues);
        }
        if let Some(names) = &self.check_processes {
            modes.push(Mode::CheckProcesses(names.clone()));
        }
        if let Some(gib) = self.watchdog_leak_test {
            modes.push(Mode::LeakTest(gib));
        }

        match modes.len() {
            0 => bail!("no mode selected; pass --service or one operator mode"),
            1 => Ok(modes.remove(0)),
            _ => bail!("modes are mutually exclusive: {modes:?}"),
        }
    }

    fn fail_queue_mode(&self) -> FailQueueMode {
        match self.failqueuename.as_deref() {
            None | Some("auto") => FailQueueMode::Auto,
            Some("") | Some("none") => FailQueueMode::None,
            Some(name) => FailQueueMode::Named(name.to_string()),
        }
    }

    pub(crate) fn watchdog_config(&self) -> Result<WatchdogConfig> {
        let mut processes = Vec::new();
        let mut add = |process: &Option<String>,
                       command: &Option<String>,
                       default_process: &str,
                       default_command: &str| {
            let Some(name) = process.as_deref() else { return };
            if name.is_empty() {
                return;
            }
            let name = if name == "mission" { default_process } else { name };
            let restart_command = match command.as_deref() {
                None | Some("mission") => default_command.to_string(),
                Some("") => return,
                Some(custom) => custom.to_string(),
            };
            processes.push(WatchedProcess { name: name.to_string(), restart_command });
        };
        add(
            &self.watchdog_ssm_process,
            &self.watchdog_ssm_command,
            MISSION_SSM_PROCESS,
            MISSION_SSM_COMMAND,
        );
        add(
            &self.watchdog_cloudwatch_process,
            &self.watchdog_cloudwatch_command,
            MISSION_CLOUDWATCH_PROCESS,
            MISSION_CLOUDWATCH_COMMAND,
        );

        Ok(WatchdogConfig {
            period: Duration::from_secs(self.watchdog_period.unwrap_or(DEFAULT_WATCHDOG_PERIOD_SEC)),
            warn_gb: self.watchdog_warn_gb.unwrap_or(0.0),
            cleanup_gb: self.watchdog_action_gb.unwrap_or(0.0),
            abort_gb: self.watchdog_abort_gb.unwrap_or(0.0),
            processes,
        })
    }

    /// Build the service configuration. Queue name is required for every
    /// queue-touching mode.
    pub fn service_config(&self) -> Result<ServiceConfig> {
        let queue_name = self
            .queuename
            .clone()
            .ok_or_else(|| anyhow!("--queuename is required"))?;
        let message_kind: MessageKind = self
            .message_type
            .as_deref()
            .unwrap_or("Generic")
            .parse()
            .map_err(|e| anyhow!("{e}"))?;
        let idle_shutdown_method: IdleShutdownMethod = self
            .idle_shutdown_method
            .as_deref()
            .unwrap_or("None")
            .parse()
            .map_err(|e| anyhow!("{e}"))?;

        let defaults = ServiceConfig::default();
        Ok(ServiceConfig {
            queue_name,
            fail_queue: self.fail_queue_mode(),
            owned_queue: self.landform_owned_queue,
            owned_fail_queue: self.landform_owned_fail_queue,
            message_kind,
            message_timeout_sec: self.message_timeout_sec.unwrap_or(defaults.message_timeout_sec),
            max_handler_sec: self.max_handler_sec.unwrap_or(defaults.max_handler_sec),
            max_message_age_sec: self
                .max_message_age_sec
                .unwrap_or(defaults.max_message_age_sec),
            max_receive_count: self.max_receive_count.unwrap_or(defaults.max_receive_count),
            drop_poison_messages: self.drop_poison_messages,
            deprioritize_retries: self.deprioritize_retries,
            suppress_rejections: self.suppress_rejections,
            idle_shutdown_sec: self.idle_shutdown_sec,
            idle_shutdown_failsafe_sec: self
                .idle_shutdown_failsafe_sec
                .unwrap_or(DEFAULT_IDLE_FAILSAFE_SEC),
            idle_shutdown_method,
            auto_scale_group: self.auto_scale_group.clone(),
            watchdog: self.watchdog_config()?,
            ..defaults
        })
    }
}

#[cfg(test)]
#[path = "args_tests.rs"]
mod tests;
