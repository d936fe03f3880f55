//! Behavioural tests covering daemon launch, locking, and shutdown.

use std::cell::RefCell;
use std::fs;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::{Value, json};

use warden_daemon_types::{METHOD_NOT_FOUND, RpcReply};

use crate::process::{LaunchError, LaunchMode, LockError, PrivilegeError, ShutdownState};
use crate::tests::support::{ProcessWorld, StepResult};

#[fixture]
fn world() -> RefCell<ProcessWorld> {
    RefCell::new(ProcessWorld::new())
}

#[given("a fresh daemon process world")]
fn given_world(world: &RefCell<ProcessWorld>) {
    let _ = world;
}

#[given("the run-as user is \"{user}\"")]
fn given_user(world: &RefCell<ProcessWorld>, user: String) {
    world.borrow_mut().set_user(&user);
}

#[when("the daemon starts in background mode")]
fn when_starts_background(world: &RefCell<ProcessWorld>) -> StepResult {
    world.borrow_mut().start(LaunchMode::Background)
}

#[when("the daemon starts in debug mode")]
fn when_starts_debug(world: &RefCell<ProcessWorld>) -> StepResult {
    world.borrow_mut().start(LaunchMode::Debug)
}

#[when("the daemon is launched to completion in background mode")]
fn when_runs_to_completion(world: &RefCell<ProcessWorld>) {
    world.borrow_mut().run_to_completion(LaunchMode::Background);
}

#[when("shutdown is requested")]
fn when_shutdown_requested(world: &RefCell<ProcessWorld>) {
    world.borrow().request_shutdown();
}

#[when("the daemon run completes")]
fn when_run_completes(world: &RefCell<ProcessWorld>) -> StepResult {
    world.borrow_mut().join()
}

#[then("the lock file records the current pid")]
fn then_lock_records_pid(world: &RefCell<ProcessWorld>) {
    let content = fs::read_to_string(world.borrow().lock_path()).expect("lock file is readable");
    let pid: u32 = content.trim().parse().expect("lock file holds a pid");
    assert_eq!(pid, std::process::id());
}

#[then("daemonisation was requested")]
fn then_daemonised(world: &RefCell<ProcessWorld>) {
    assert_eq!(world.borrow().daemonizer_calls(), 1);
}

#[then("daemonisation was not requested")]
fn then_not_daemonised(world: &RefCell<ProcessWorld>) {
    assert_eq!(world.borrow().daemonizer_calls(), 0);
}

#[then("calling \"{method}\" returns true")]
fn then_call_returns_true(world: &RefCell<ProcessWorld>, method: String) {
    let reply = world.borrow().call(&method, json!([])).expect("call succeeds");
    assert_eq!(reply, RpcReply::result(Value::Bool(true)));
}

#[then("calling \"{method}\" fails with method not found")]
fn then_call_not_found(world: &RefCell<ProcessWorld>, method: String) {
    let reply = world
        .borrow()
        .call(&method, json!(["hello"]))
        .expect("call completes");
    assert_eq!(reply, RpcReply::from(METHOD_NOT_FOUND.fault()));
}

#[then("calling \"{method}\" with \"{argument}\" returns \"{expected}\"")]
fn then_call_echoes(
    world: &RefCell<ProcessWorld>,
    method: String,
    argument: String,
    expected: String,
) {
    let reply = world
        .borrow()
        .call(&method, json!([argument]))
        .expect("call succeeds");
    assert_eq!(reply, RpcReply::result(json!(expected)));
}

#[then("a second start fails because the lock is busy")]
fn then_second_start_busy(world: &RefCell<ProcessWorld>) {
    let error = world
        .borrow()
        .start_again()
        .expect_err("second launch must not take the lock");
    match error {
        LaunchError::Lock(LockError::Busy { holder, .. }) => {
            assert_eq!(holder, Some(std::process::id()));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[then("the launch failed because the user is unknown")]
fn then_unknown_user(world: &RefCell<ProcessWorld>) {
    let binding = world.borrow();
    let error = binding
        .result()
        .and_then(|result| result.as_ref().err())
        .expect("launch should have failed");
    assert!(
        matches!(error, LaunchError::Privilege(PrivilegeError::UnknownUser { user }) if user == "warden-no-such-user"),
        "unexpected error: {error}"
    );
}

#[then("no lock file was created")]
fn then_no_lock(world: &RefCell<ProcessWorld>) {
    assert!(!world.borrow().lock_path().exists());
}

#[then("the daemon run succeeded")]
fn then_run_succeeded(world: &RefCell<ProcessWorld>) {
    let binding = world.borrow();
    let result = binding.result().expect("a recorded daemon result");
    assert!(result.is_ok(), "daemon run should succeed: {result:?}");
}

#[then("the lock file is removed")]
fn then_lock_removed(world: &RefCell<ProcessWorld>) {
    assert!(!world.borrow().lock_path().exists());
}

#[then("the shutdown state is stopped")]
fn then_state_stopped(world: &RefCell<ProcessWorld>) {
    assert_eq!(world.borrow().shutdown().state(), ShutdownState::Stopped);
}

#[scenario(path = "tests/features/daemon_process.feature", index = 0)]
fn background_daemon_serves_until_terminated(#[from(world)] _: RefCell<ProcessWorld>) {}

#[scenario(path = "tests/features/daemon_process.feature", index = 1)]
fn second_start_is_refused(#[from(world)] _: RefCell<ProcessWorld>) {}

#[scenario(path = "tests/features/daemon_process.feature", index = 2)]
fn unknown_user_aborts_launch(#[from(world)] _: RefCell<ProcessWorld>) {}

#[scenario(path = "tests/features/daemon_process.feature", index = 3)]
fn debug_mode_exposes_debug_procedures(#[from(world)] _: RefCell<ProcessWorld>) {}
