// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use clap::Parser;
use lf_core::MessageKind;
use serial_test::serial;
use yare::parameterized;

fn parse(argv: &[&str]) -> WorkerArgs {
    let mut full = vec!["lfworker"];
    full.extend(argv);
    WorkerArgs::parse_from(full)
}

#[test]
fn service_mode() {
    let args = parse(&["--service", "--queuename", "work"]);
    assert_eq!(args.mode().unwrap(), Mode::Service);
}

#[test]
fn no_mode_is_an_error() {
    let args = parse(&["--queuename", "work"]);
    assert!(args.mode().is_err());
}

#[test]
fn modes_are_mutually_exclusive() {
    let args = parse(&["--service", "--peek", "3", "--queuename", "work"]);
    assert!(args.mode().is_err());
}

#[parameterized(
    peek = { &["--peek", "3"], Mode::Peek { count: 3, fail_queue: false } },
    peek_fail = { &["--peek-fail", "2"], Mode::Peek { count: 2, fail_queue: true } },
    drop = { &["--drop", "1"], Mode::Drop { count: 1, fail_queue: false } },
    retry = { &["--retry", "5"], Mode::Retry(5) },
    fail = { &["--fail", "4"], Mode::Fail(4) },
    delete = { &["--delete-queues"], Mode::DeleteQueues },
    leak = { &["--watchdog-leak-test", "8"], Mode::LeakTest(8) },
)]
fn operator_modes(argv: &[&str], expected: Mode) {
    let mut full = vec!["--queuename", "work"];
    full.extend(argv);
    assert_eq!(parse(&full).mode().unwrap(), expected);
}

#[test]
fn check_processes_splits_list() {
    let args = parse(&["--check-processes", "mapper,renderer"]);
    assert_eq!(
        args.mode().unwrap(),
        Mode::CheckProcesses(vec!["mapper".to_string(), "renderer".to_string()])
    );
}

#[test]
fn config_defaults() {
    let args = parse(&["--service", "--queuename", "work"]);
    let config = args.service_config().unwrap();
    assert_eq!(config.queue_name, "work");
    assert_eq!(config.fail_queue, FailQueueMode::Auto);
    assert_eq!(config.message_kind, MessageKind::Generic);
    assert!(!config.owned_queue);
    assert_eq!(config.max_handler_sec, 600);
}

#[parameterized(
    auto = { "auto", FailQueueMode::Auto },
    none = { "none", FailQueueMode::None },
    named = { "other-fail", FailQueueMode::Named(String::from("other-fail")) },
)]
fn fail_queue_modes(value: &str, expected: FailQueueMode) {
    let args = parse(&["--service", "--queuename", "work", "--failqueuename", value]);
    assert_eq!(args.service_config().unwrap().fail_queue, expected);
}

#[test]
fn message_type_parses() {
    let args =
        parse(&["--service", "--queuename", "work", "--message-type", "S3Event"]);
    assert_eq!(args.service_config().unwrap().message_kind, MessageKind::StorageEvent);
}

#[test]
fn bad_message_type_errors() {
    let args = parse(&["--service", "--queuename", "work", "--message-type", "Pigeon"]);
    assert!(args.service_config().is_err());
}

#[test]
fn watchdog_mission_defaults() {
    let args = parse(&[
        "--service",
        "--queuename",
        "work",
        "--watchdog-ssm-process",
        "mission",
        "--watchdog-cloudwatch-process",
        "custom-agent",
        "--watchdog-cloudwatch-command",
        "restart custom-agent",
    ]);
    let config = args.service_config().unwrap();
    assert_eq!(config.watchdog.processes.len(), 2);
    assert_eq!(config.watchdog.processes[0].name, "amazon-ssm-agent");
    assert_eq!(
        config.watchdog.processes[0].restart_command,
        "systemctl restart amazon-ssm-agent"
    );
    assert_eq!(config.watchdog.processes[1].name, "custom-agent");
    assert_eq!(config.watchdog.processes[1].restart_command, "restart custom-agent");
}

#[test]
fn empty_watchdog_process_disables() {
    let args = parse(&["--service", "--queuename", "work", "--watchdog-ssm-process", ""]);
    let config = args.service_config().unwrap();
    assert!(config.watchdog.processes.is_empty());
}

#[test]
#[serial]
fn env_defaults_fill_unset_options() {
    std::env::set_var("LANDFORM_WORKER_QUEUENAME", "env-queue");
    std::env::set_var("LANDFORM_MAX_RECEIVE_COUNT", "9");
    std::env::set_var("LANDFORM_DEPRIORITIZE_RETRIES", "true");

    let mut args = parse(&["--service"]);
    args.apply_env_defaults();
    let config = args.service_config().unwrap();
    assert_eq!(config.queue_name, "env-queue");
    assert_eq!(config.max_receive_count, 9);
    assert!(config.deprioritize_retries);

    std::env::remove_var("LANDFORM_WORKER_QUEUENAME");
    std::env::remove_var("LANDFORM_MAX_RECEIVE_COUNT");
    std::env::remove_var("LANDFORM_DEPRIORITIZE_RETRIES");
}

#[test]
#[serial]
fn cli_value_beats_env() {
    std::env::set_var("LANDFORM_QUEUENAME", "env-queue");
    let mut args = parse(&["--service", "--queuename", "cli-queue"]);
    args.apply_env_defaults();
    assert_eq!(args.service_config().unwrap().queue_name, "cli-queue");
    std::env::remove_var("LANDFORM_QUEUENAME");
}
