//! Daemon termination.

use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};

use super::error::LifecycleError;
use super::monitoring::{to_pid, wait_for_exit};

pub(super) const STOP_TIMEOUT: Duration = Duration::from_secs(5);
pub(super) const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Sends SIGTERM to `pid`.
///
/// A missing process and a permission failure are reported distinctly.
pub(super) fn signal_daemon(pid: u32) -> Result<(), LifecycleError> {
    kill(to_pid(pid)?, Signal::SIGTERM).map_err(|errno| classify(pid, errno))
}

/// Maps a failed `kill` onto the lifecycle error reported to the operator.
pub(super) fn classify(pid: u32, errno: Errno) -> LifecycleError {
    match errno {
        Errno::ESRCH => LifecycleError::NoSuchProcess { pid },
        Errno::EPERM => LifecycleError::PermissionDenied { pid },
        source => LifecycleError::SignalFailed { pid, source },
    }
}

/// Signals `pid` and waits for it to exit.
pub(super) fn stop_daemon(pid: u32, timeout: Duration) -> Result<(), LifecycleError> {
    signal_daemon(pid)?;
    if wait_for_exit(pid, timeout, POLL_INTERVAL) {
        Ok(())
    } else {
        Err(LifecycleError::StillRunning { pid })
    }
}
