//! Process lifecycle for the daemon.

use std::time::Duration;

pub(crate) mod daemonizer;
mod errors;
pub(crate) mod launch;
pub(crate) mod lock;
pub(crate) mod privilege;
pub(crate) mod shutdown;

pub use daemonizer::DaemonizeError;
pub use errors::LaunchError;
pub use launch::{DaemonConfig, LaunchMode, run_daemon};
pub use lock::{LockError, ServiceLock};
pub use privilege::PrivilegeError;
pub use shutdown::{ShutdownController, ShutdownError, ShutdownState};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
pub(crate) const LOCK_TIMEOUT: Duration = Duration::from_millis(100);
pub(crate) const DEBUG_ENV_VAR: &str = "WARDEN_DEBUG";
pub(crate) const DEBUG_FLAG: &str = "--debug";
