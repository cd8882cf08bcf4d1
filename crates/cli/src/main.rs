// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! lfworker: the Landform worker binary.
//!
//! Runs the service chassis with the built-in echo handler, or one of the
//! bounded operator modes. Exit codes: 0 normal, 1 unhandled error, 10
//! watchdog abort.

mod args;
mod env;
mod handler;

use anyhow::{bail, Context, Result};
use args::{Mode, WorkerArgs};
use clap::Parser;
use handler::LogHandler;
use lf_adapters::{EnvCredentialSource, HostInstanceControl, MemoryQueueBackend, SysinfoMonitor};
use lf_core::SystemClock;
use lf_service::credentials::ReopenFactory;
use lf_service::{
    ops, QueueOptions, Service, ServiceConfig, ServiceError, Watchdog, WatchdogStatsHandle,
    WatchdogVerdict, WorkQueue, WATCHDOG_EXIT_CODE,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

type Backend = MemoryQueueBackend<SystemClock>;

fn init_tracing() {
    let filter = EnvFilter::try_from_env("LANDFORM_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let code = match run().await {
        Ok(()) => 0,
        Err(e) => {
            if matches!(e.downcast_ref::<ServiceError>(), Some(ServiceError::WatchdogAbort)) {
                tracing::error!("watchdog abort");
                WATCHDOG_EXIT_CODE
            } else {
                tracing::error!(error = %e, "worker failed");
                1
            }
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<()> {
    let mut args = WorkerArgs::parse();
    args.apply_env_defaults();
    let mode = args.mode()?;

    match mode {
        Mode::Service => run_service(&args).await,
        Mode::CheckProcesses(names) => {
            let host = SysinfoMonitor::new();
            for (name, running) in ops::check_processes(&host, &names) {
                println!("{name}: {}", if running { "running" } else { "not running" });
            }
            Ok(())
        }
        Mode::LeakTest(gib) => run_leak_test(&args, gib).await,
        queue_mode => run_queue_mode(&args, queue_mode).await,
    }
}

async fn run_service(args: &WorkerArgs) -> Result<()> {
    let config = args.service_config()?;
    let backend: Backend = MemoryQueueBackend::new(SystemClock);
    let factory = Arc::new(ReopenFactory::from_config(backend, &config));
    let service = Service::init(
        config,
        factory,
        Arc::new(LogHandler),
        HostInstanceControl::new(),
        EnvCredentialSource,
        SysinfoMonitor::new(),
        SystemClock,
    )
    .await?;
    tracing::info!("entering service mode");
    service.run().await.map_err(Into::into)
}

async fn run_queue_mode(args: &WorkerArgs, mode: Mode) -> Result<()> {
    let config = args.service_config()?;
    let backend: Backend = MemoryQueueBackend::new(SystemClock);
    let (main, fail) = open_queues(&config, &backend).await?;
    let clock = SystemClock;

    match mode {
        Mode::Peek { count, fail_queue } => {
            let queue = pick(&main, &fail, fail_queue)?;
            let peeked = ops::peek(queue, count, &clock).await?;
            for entry in &peeked {
                println!(
                    "{}  {}  sent {}  receives {}",
                    entry.message_id,
                    entry.url,
                    entry.sent_at(),
                    entry.receive_count
                );
            }
            println!("{} message(s)", peeked.len());
        }
        Mode::Drop { count, fail_queue } => {
            let queue = pick(&main, &fail, fail_queue)?;
            let dropped = ops::drop_messages(queue, count).await?;
            println!("dropped {dropped} message(s)");
        }
        Mode::Retry(count) => {
            let fail = fail.as_ref().context("retry requires a fail queue")?;
            let moved = ops::move_messages(fail, &main, count).await?;
            println!("retried {moved} message(s)");
        }
        Mode::Fail(count) => {
            let fail = fail.as_ref().context("fail requires a fail queue")?;
            let moved = ops::move_messages(&main, fail, count).await?;
            println!("failed {moved} message(s)");
        }
        Mode::Send(arg) => {
            let message_id = ops::send(&main, &arg).await?;
            println!("sent {message_id}");
        }
        Mode::DeleteQueues => {
            ops::delete_queues(&main, fail.as_ref()).await?;
            println!("queues deleted");
        }
        other => bail!("not a queue mode: {other:?}"),
    }
    Ok(())
}

async fn run_leak_test(args: &WorkerArgs, gib: usize) -> Result<()> {
    let watchdog_config = args.watchdog_config()?;
    let watchdog = Watchdog::new(
        SysinfoMonitor::new(),
        SystemClock,
        &watchdog_config,
        WatchdogStatsHandle::new(),
    )?;

    tracing::info!(gib, "starting watchdog leak test");
    let ballast = ops::allocate_gib(gib);
    let verdict = tokio::time::timeout(
        Duration::from_secs(60),
        watchdog.run(CancellationToken::new()),
    )
    .await;
    drop(ballast);

    match verdict {
        Ok(WatchdogVerdict::Abort) => Err(ServiceError::WatchdogAbort.into()),
        _ => {
            tracing::info!("leak test finished without abort");
            Ok(())
        }
    }
}

async fn open_queues(
    config: &ServiceConfig,
    backend: &Backend,
) -> Result<(WorkQueue<Backend>, Option<WorkQueue<Backend>>)> {
    let main = WorkQueue::open(
        backend.clone(),
        QueueOptions {
            name: config.queue_name.clone(),
            visibility_timeout_sec: config.message_timeout_sec,
            owned: config.owned_queue,
            auto_create: config.owned_queue,
        },
    )
    .await?;
    let fail = match config.fail_queue_name() {
        Some(name) => Some(
            WorkQueue::open(
                backend.clone(),
                QueueOptions {
                    name,
                    visibility_timeout_sec: config.message_timeout_sec,
                    owned: config.owned_fail_queue,
                    auto_create: config.owned_fail_queue,
                },
            )
            .await?,
        ),
        None => None,
    };
    Ok((main, fail))
}

fn pick<'a>(
    main: &'a WorkQueue<Backend>,
    fail: &'a Option<WorkQueue<Backend>>,
    use_fail: bool,
) -> Result<&'a WorkQueue<Backend>> {
    if use_fail {
        fail.as_ref().context("no fail queue configured")
    } else {
        Ok(main)
    }
}
