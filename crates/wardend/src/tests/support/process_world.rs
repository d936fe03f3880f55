//! Scenario world that drives `run_daemon_with` on a background thread.

use std::io::{BufRead, BufReader};
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use nix::unistd::{User, getuid};
use serde_json::{Value, json};
use tempfile::TempDir;

use warden_config::Config;
use warden_daemon_types::{RpcReply, RpcRequest};

use crate::process::daemonizer::{DaemonizeError, Daemonizer, DetachPlan};
use crate::process::launch::{LaunchPlan, ProcessControl, run_daemon_with};
use crate::process::privilege::MockPrivilegeDropper;
use crate::process::shutdown::{ShutdownError, ShutdownSource};
use crate::process::{DaemonConfig, LaunchError, LaunchMode, ShutdownController};
use crate::rpc::catalogue;

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(25);

pub(crate) type StepResult = Result<(), String>;

/// Everything a daemon scenario observes.
pub(crate) struct ProcessWorld {
    dir: TempDir,
    port: u16,
    user: String,
    daemonizer: RecordingDaemonizer,
    shutdown: Arc<ShutdownController>,
    handle: Option<thread::JoinHandle<Result<(), LaunchError>>>,
    result: Option<Result<(), LaunchError>>,
}

impl ProcessWorld {
    pub(crate) fn new() -> Self {
        let user = User::from_uid(getuid())
            .ok()
            .flatten()
            .map(|account| account.name)
            .expect("current user should have an account");
        Self {
            dir: TempDir::new().expect("create temporary directory"),
            port: free_port(),
            user,
            daemonizer: RecordingDaemonizer::default(),
            shutdown: Arc::new(ShutdownController::detached()),
            handle: None,
            result: None,
        }
    }

    pub(crate) fn set_user(&mut self, user: &str) {
        user.clone_into(&mut self.user);
    }

    pub(crate) fn lock_path(&self) -> PathBuf {
        self.dir.path().join("run").join("wardend.pid")
    }

    fn config(&self, mode: LaunchMode) -> DaemonConfig {
        let root = Utf8PathBuf::from_path_buf(self.dir.path().to_path_buf())
            .expect("temporary directory should be UTF-8");
        let settings = Config {
            run_as_user: self.user.clone(),
            working_dir: root.clone(),
            log_file: root.join("wardend.log"),
            lock_file: root.join("run").join("wardend.pid"),
            port: self.port,
            ..Config::default()
        };
        DaemonConfig::new(settings, mode)
    }

    fn plan(
        &self,
        mode: LaunchMode,
    ) -> LaunchPlan<RecordingDaemonizer, MockPrivilegeDropper, SharedShutdown> {
        let mut privileges = MockPrivilegeDropper::new();
        match mode {
            LaunchMode::Background => {
                privileges.expect_drop_to().returning(|_| Ok(()));
            }
            LaunchMode::Debug => {
                privileges.expect_drop_to().never();
            }
        }
        LaunchPlan {
            config: self.config(mode),
            process: ProcessControl {
                daemonizer: self.daemonizer.clone(),
                privileges,
                shutdown: SharedShutdown(Arc::clone(&self.shutdown)),
            },
            procedures: catalogue(),
        }
    }

    /// Launches the daemon on a worker thread and waits until it answers.
    pub(crate) fn start(&mut self, mode: LaunchMode) -> StepResult {
        if self.handle.is_some() {
            return Err("daemon already running".to_owned());
        }
        let plan = self.plan(mode);
        self.handle = Some(thread::spawn(move || run_daemon_with(plan)));
        self.wait_for_ready()
    }

    /// Runs a launch on the calling thread and records its result.
    pub(crate) fn run_to_completion(&mut self, mode: LaunchMode) {
        let plan = self.plan(mode);
        self.result = Some(run_daemon_with(plan));
    }

    /// Runs a second background launch against the same lock.
    pub(crate) fn start_again(&self) -> Result<(), LaunchError> {
        let mut settings = self.config(LaunchMode::Background).settings().clone();
        settings.port = free_port();
        let mut privileges = MockPrivilegeDropper::new();
        privileges.expect_drop_to().never();
        run_daemon_with(LaunchPlan {
            config: DaemonConfig::new(settings, LaunchMode::Background),
            process: ProcessControl {
                daemonizer: RecordingDaemonizer::default(),
                privileges,
                shutdown: SharedShutdown(Arc::new(ShutdownController::detached())),
            },
            procedures: catalogue(),
        })
    }

    pub(crate) fn request_shutdown(&self) {
        self.shutdown.request_shutdown();
    }

    pub(crate) fn join(&mut self) -> StepResult {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| "daemon not running".to_owned())?;
        let result = handle
            .join()
            .map_err(|_| "daemon thread panicked".to_owned())?;
        self.result = Some(result);
        Ok(())
    }

    pub(crate) fn result(&self) -> Option<&Result<(), LaunchError>> {
        self.result.as_ref()
    }

    pub(crate) fn shutdown(&self) -> &ShutdownController {
        &self.shutdown
    }

    pub(crate) fn daemonizer_calls(&self) -> usize {
        self.daemonizer.calls()
    }

    /// Performs one call against the running daemon.
    pub(crate) fn call(&self, method: &str, params: Value) -> Result<RpcReply, String> {
        let mut stream = TcpStream::connect((Ipv4Addr::LOCALHOST, self.port))
            .map_err(|error| error.to_string())?;
        RpcRequest::new(method, params)
            .write_jsonl(&mut stream)
            .map_err(|error| error.to_string())?;
        let mut line = String::new();
        BufReader::new(stream)
            .read_line(&mut line)
            .map_err(|error| error.to_string())?;
        RpcReply::parse(&line).map_err(|error| error.to_string())
    }

    fn wait_for_ready(&self) -> StepResult {
        let deadline = Instant::now() + WAIT_TIMEOUT;
        while Instant::now() < deadline {
            if self.call("ping", json!([])).is_ok() {
                return Ok(());
            }
            if self.handle.as_ref().is_some_and(thread::JoinHandle::is_finished) {
                return Err("daemon exited before serving".to_owned());
            }
            thread::sleep(POLL_INTERVAL);
        }
        Err("daemon did not start serving".to_owned())
    }
}

impl Drop for ProcessWorld {
    fn drop(&mut self) {
        self.shutdown.request_shutdown();
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

fn free_port() -> u16 {
    TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .expect("reserve a loopback port")
}

/// Daemoniser that only counts invocations.
#[derive(Clone, Default)]
pub(crate) struct RecordingDaemonizer {
    calls: Arc<AtomicUsize>,
}

impl RecordingDaemonizer {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Daemonizer for RecordingDaemonizer {
    fn daemonize(&self, _plan: &DetachPlan<'_>) -> Result<(), DaemonizeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands every launch the same pre-built controller.
pub(crate) struct SharedShutdown(Arc<ShutdownController>);

impl ShutdownSource for SharedShutdown {
    fn install(&self, _mode: LaunchMode) -> Result<Arc<ShutdownController>, ShutdownError> {
        Ok(Arc::clone(&self.0))
    }
}
