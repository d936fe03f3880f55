//! Integration tests for the `warden` binary entry point.

use std::net::{Ipv4Addr, TcpListener};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::str::contains;
use tempfile::TempDir;

fn closed_port() -> String {
    TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port().to_string())
        .expect("reserve port")
}

#[test]
fn info_with_an_unknown_pid_reports_not_running() {
    let mut command = cargo_bin_cmd!("warden");
    command.args(["info", "--pid", "99999999"]);
    command
        .assert()
        .success()
        .stdout(contains("Service not running"));
}

#[test]
fn stop_with_an_unknown_pid_fails() {
    let mut command = cargo_bin_cmd!("warden");
    command.args(["stop", "--pid", "99999999"]);
    command
        .assert()
        .failure()
        .stderr(contains("no such process"));
}

#[test]
fn stop_without_a_lock_file_fails() {
    let dir = TempDir::new().expect("temp dir");
    let lock = dir.path().join("wardend.pid");
    let mut command = cargo_bin_cmd!("warden");
    command.arg("--lock-file").arg(&lock).arg("stop");
    command
        .assert()
        .failure()
        .stderr(contains("no PID provided, and no service detected"));
}

#[test]
fn methods_without_a_daemon_fails() {
    let mut command = cargo_bin_cmd!("warden");
    command.args(["--port", &closed_port(), "methods"]);
    command
        .assert()
        .failure()
        .stderr(contains("Server does not seem to be running"));
}

#[test]
fn start_with_a_missing_daemon_binary_fails() {
    let mut command = cargo_bin_cmd!("warden");
    command.env("WARDEND_BIN", "/nonexistent/wardend").arg("start");
    command
        .assert()
        .failure()
        .stderr(contains("failed to spawn wardend binary"));
}
