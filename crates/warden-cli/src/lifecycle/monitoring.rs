//! Lock-file reading and liveness probing.

use std::fs;
use std::io;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::unistd::{Pid, getpgid};

use super::error::LifecycleError;

/// Reads the pid recorded in the lock file.
///
/// A missing file, or one whose holder has not written its pid yet, yields
/// `None`.
pub(super) fn read_pid(path: &Path) -> Result<Option<u32>, LifecycleError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(LifecycleError::ReadPid {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse()
        .map(Some)
        .map_err(|source| LifecycleError::ParsePid {
            path: path.to_path_buf(),
            source,
        })
}

/// Converts a pid into one that addresses exactly one process.
pub(super) fn to_pid(pid: u32) -> Result<Pid, LifecycleError> {
    if pid == 0 {
        return Err(LifecycleError::InvalidPid {
            pid,
            reason: "pid 0 addresses the caller's process group",
        });
    }
    i32::try_from(pid)
        .map(Pid::from_raw)
        .map_err(|_| LifecycleError::InvalidPid {
            pid,
            reason: "pid exceeds the platform range",
        })
}

/// Whether `pid` names a live process.
///
/// Uses `getpgid`, which needs no permission over the target; `EPERM` still
/// proves the process exists.
pub(super) fn is_alive(pid: u32) -> bool {
    to_pid(pid).is_ok_and(|target| matches!(getpgid(Some(target)), Ok(_) | Err(Errno::EPERM)))
}

/// Polls until `pid` exits or `timeout` elapses; returns whether it exited.
pub(super) fn wait_for_exit(pid: u32, timeout: Duration, interval: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if !is_alive(pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(interval);
    }
}
