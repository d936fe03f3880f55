//! Unit tests for the CLI runtime.

use std::cell::RefCell;
use std::ffi::OsString;
use std::io::{BufRead, BufReader, Write};
use std::net::{Ipv4Addr, TcpListener};
use std::process::ExitCode;
use std::thread;

use rstest::rstest;
use warden_config::Config;

use crate::config::ConfigLoader;
use crate::errors::AppError;
use crate::run_with_loader;

/// Serves one canned reply line and returns the request it received.
struct FakeDaemon {
    port: u16,
    handle: Option<thread::JoinHandle<String>>,
}

impl FakeDaemon {
    fn spawn(reply: &str) -> Self {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind fake daemon");
        let port = listener.local_addr().expect("local addr").port();
        let reply = format!("{reply}\n");
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream);
            let mut request = String::new();
            reader.read_line(&mut request).expect("read request");
            reader
                .get_mut()
                .write_all(reply.as_bytes())
                .expect("write reply");
            request
        });
        Self {
            port,
            handle: Some(handle),
        }
    }

    fn request(&mut self) -> String {
        self.handle
            .take()
            .expect("request taken once")
            .join()
            .expect("fake daemon thread")
    }
}

/// Hands out a fixed configuration and records the arguments it was given.
struct StaticConfigLoader {
    config: Config,
    seen: RefCell<Vec<OsString>>,
}

impl StaticConfigLoader {
    fn on_port(port: u16) -> Self {
        Self {
            config: Config {
                port,
                lock_file: "/nonexistent/wardend.pid".into(),
                ..Config::default()
            },
            seen: RefCell::new(Vec::new()),
        }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        *self.seen.borrow_mut() = args.to_vec();
        Ok(self.config.clone())
    }
}

fn closed_port() -> u16 {
    TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .expect("reserve port")
}

fn run(loader: &StaticConfigLoader, argv: &[&str]) -> (ExitCode, String, String) {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let code = run_with_loader(
        argv.iter().map(OsString::from),
        &mut stdout,
        &mut stderr,
        loader,
        None,
    );
    (
        code,
        String::from_utf8(stdout).expect("utf8 stdout"),
        String::from_utf8(stderr).expect("utf8 stderr"),
    )
}

#[test]
fn methods_lists_one_name_per_line() {
    let mut daemon = FakeDaemon::spawn(
        r#"{"kind":"result","value":["ping","system.listMethods","system.methodHelp"]}"#,
    );
    let loader = StaticConfigLoader::on_port(daemon.port);
    let (code, stdout, _) = run(&loader, &["warden", "methods"]);
    assert_eq!(code, ExitCode::SUCCESS);
    assert_eq!(stdout, "ping\nsystem.listMethods\nsystem.methodHelp\n");
    assert!(daemon.request().contains("system.listMethods"));
}

#[rstest]
#[case::scalar("\"hi\"", r#""params":["hi"]"#)]
#[case::array("[1,2]", r#""params":[1,2]"#)]
#[case::object("{\"a\":1}", r#""params":{"a":1}"#)]
fn call_sends_structured_params(#[case] params: &str, #[case] expected: &str) {
    let mut daemon = FakeDaemon::spawn(r#"{"kind":"result","value":"hi"}"#);
    let loader = StaticConfigLoader::on_port(daemon.port);
    let (code, stdout, _) = run(&loader, &["warden", "call", "echo", params]);
    assert_eq!(code, ExitCode::SUCCESS);
    assert_eq!(stdout, "\"hi\"\n");
    let request = daemon.request();
    assert!(request.contains(expected), "request was {request}");
}

#[test]
fn public_faults_fail_the_command() {
    let mut daemon =
        FakeDaemon::spawn(r#"{"kind":"fault","code":4,"message":"method not found"}"#);
    let loader = StaticConfigLoader::on_port(daemon.port);
    let (code, _, stderr) = run(&loader, &["warden", "call", "nope"]);
    assert_eq!(code, ExitCode::FAILURE);
    assert_eq!(stderr, "error: fault 4: method not found\n");
    daemon.request();
}

#[test]
fn methods_without_a_daemon_says_so() {
    let loader = StaticConfigLoader::on_port(closed_port());
    let (code, _, stderr) = run(&loader, &["warden", "methods"]);
    assert_eq!(code, ExitCode::FAILURE);
    assert!(stderr.contains("Server does not seem to be running"), "{stderr}");
}

#[test]
fn malformed_params_are_rejected_locally() {
    let loader = StaticConfigLoader::on_port(closed_port());
    let (code, _, stderr) = run(&loader, &["warden", "call", "echo", "{oops"]);
    assert_eq!(code, ExitCode::FAILURE);
    assert!(stderr.contains("not valid JSON"), "{stderr}");
}

#[test]
fn leading_config_flags_reach_the_loader() {
    let loader = StaticConfigLoader::on_port(closed_port());
    let (code, stdout, _) = run(
        &loader,
        &["warden", "--lock-file", "/nonexistent/wardend.pid", "info"],
    );
    assert_eq!(code, ExitCode::SUCCESS);
    assert!(stdout.starts_with("Service not running"));
    assert_eq!(
        *loader.seen.borrow(),
        vec![
            OsString::from("warden"),
            OsString::from("--lock-file"),
            OsString::from("/nonexistent/wardend.pid"),
        ]
    );
}

#[test]
fn help_goes_to_stdout() {
    let loader = StaticConfigLoader::on_port(closed_port());
    let (code, stdout, stderr) = run(&loader, &["warden", "--help"]);
    assert_eq!(code, ExitCode::SUCCESS);
    assert!(stdout.contains("Usage"));
    assert!(stderr.is_empty());
}
