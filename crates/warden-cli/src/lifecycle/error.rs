//! Error types for daemon lifecycle operations.

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

/// Errors raised while executing lifecycle commands.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The daemon binary could not be executed.
    #[error("failed to spawn wardend binary '{}': {source}", binary.to_string_lossy())]
    LaunchDaemon {
        /// Binary that was tried.
        binary: OsString,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Waiting for the launcher process failed.
    #[error("failed to monitor daemon launch: {0}")]
    MonitorChild(#[source] io::Error),
    /// The launcher exited unsuccessfully.
    #[error("daemon failed to start (exit status: {exit_status:?})")]
    StartupFailed {
        /// Launcher exit code, if it exited normally.
        exit_status: Option<i32>,
    },
    /// The launcher succeeded but no live service was found afterwards.
    #[error("Service not running")]
    ServiceNotRunning,
    /// Neither `--pid` nor the lock file named a service.
    #[error("no PID provided, and no service detected")]
    NoService,
    /// The target pid does not exist.
    #[error("no such process")]
    NoSuchProcess {
        /// Target pid.
        pid: u32,
    },
    /// The caller may not signal the target pid.
    #[error("cannot stop service: Operation not permitted")]
    PermissionDenied {
        /// Target pid.
        pid: u32,
    },
    /// Delivering the signal failed for another reason.
    #[error("failed to signal pid {pid}: {source}")]
    SignalFailed {
        /// Target pid.
        pid: u32,
        /// Underlying OS error.
        #[source]
        source: Errno,
    },
    /// The service outlived the stop timeout.
    #[error("Service did not stop, running as pid {pid}")]
    StillRunning {
        /// Pid that is still alive.
        pid: u32,
    },
    /// The pid cannot address a single process.
    #[error("invalid pid {pid}: {reason}")]
    InvalidPid {
        /// Rejected pid.
        pid: u32,
        /// Why it was rejected.
        reason: &'static str,
    },
    /// The lock file could not be read.
    #[error("failed to read lock file {}: {source}", path.display())]
    ReadPid {
        /// Lock file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The lock file did not hold a pid.
    #[error("failed to parse lock file {}: {source}", path.display())]
    ParsePid {
        /// Lock file path.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: std::num::ParseIntError,
    },
    /// Writing lifecycle output failed.
    #[error("failed to write lifecycle output: {0}")]
    Io(#[source] io::Error),
}
