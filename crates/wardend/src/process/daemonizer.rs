//! Implements the detachment backend for the `wardend` process.

use std::ffi::OsStr;
use std::fs::{self, File};
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::path::Path;

use daemonize_me::Daemon;
use nix::fcntl::{FcntlArg, fcntl};
use thiserror::Error;
use tracing::{debug, info};

use super::PROCESS_TARGET;

/// What the detached process keeps from its launch context.
#[derive(Debug)]
pub(crate) struct DetachPlan<'a> {
    pub(crate) working_dir: &'a Path,
    pub(crate) log_file: Option<&'a File>,
    pub(crate) lock_fd: RawFd,
}

impl DetachPlan<'_> {
    /// Descriptors that must still be open once detachment completes.
    fn preserved(&self) -> Vec<RawFd> {
        let mut fds = vec![self.lock_fd];
        fds.extend(self.log_file.map(AsRawFd::as_raw_fd));
        fds.extend(inherited_sockets());
        fds.sort_unstable();
        fds.dedup();
        fds
    }
}

/// Abstraction over daemonisation strategies.
pub(crate) trait Daemonizer: Send + Sync {
    /// Detaches the process into the background.
    fn daemonize(&self, plan: &DetachPlan<'_>) -> Result<(), DaemonizeError>;
}

/// Errors surfaced by the daemonisation backend.
#[derive(Debug, Error)]
pub enum DaemonizeError {
    /// System-level daemonisation failed.
    #[error("{0}")]
    System(#[from] daemonize_me::DaemonError),
    /// Duplicating the log handle for the redirected streams failed.
    #[error("failed to redirect standard streams to the log file: {0}")]
    Redirect(#[source] io::Error),
    /// A descriptor that had to survive detachment was closed.
    #[error("descriptor {fd} was closed during detachment")]
    DescriptorLost {
        /// Raw descriptor number.
        fd: RawFd,
    },
}

/// Daemoniser that delegates to `daemonize-me`.
#[derive(Debug, Default)]
pub(crate) struct SystemDaemonizer;

impl Daemonizer for SystemDaemonizer {
    fn daemonize(&self, plan: &DetachPlan<'_>) -> Result<(), DaemonizeError> {
        info!(
            target: PROCESS_TARGET,
            working_dir = %plan.working_dir.display(),
            "detaching into background"
        );
        let preserved = plan.preserved();
        let mut daemon = Daemon::new()
            .work_dir(plan.working_dir)
            .name(OsStr::new(env!("CARGO_PKG_NAME")));
        if let Some(log) = plan.log_file {
            let stdout = log.try_clone().map_err(DaemonizeError::Redirect)?;
            let stderr = log.try_clone().map_err(DaemonizeError::Redirect)?;
            daemon = daemon.stdout(stdout).stderr(stderr);
        }
        daemon.start()?;
        verify_preserved(&preserved)?;
        info!(
            target: PROCESS_TARGET,
            pid = std::process::id(),
            "detached; continuing in child"
        );
        Ok(())
    }
}

/// Lists inherited socket descriptors so detachment can be checked against them.
pub(crate) fn inherited_sockets() -> Vec<RawFd> {
    let Ok(entries) = fs::read_dir("/proc/self/fd") else {
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let fd = entry.file_name().to_str()?.parse::<RawFd>().ok()?;
            let target = fs::read_link(entry.path()).ok()?;
            target
                .to_string_lossy()
                .starts_with("socket:")
                .then_some(fd)
        })
        .collect()
}

/// Confirms every descriptor in `fds` is still open.
pub(crate) fn verify_preserved(fds: &[RawFd]) -> Result<(), DaemonizeError> {
    for &fd in fds {
        if fcntl(fd, FcntlArg::F_GETFD).is_err() {
            return Err(DaemonizeError::DescriptorLost { fd });
        }
    }
    debug!(
        target: PROCESS_TARGET,
        count = fds.len(),
        "preserved descriptors verified"
    );
    Ok(())
}
