//! Daemon process spawning.

use std::env;
use std::ffi::{OsStr, OsString};
use std::process::{Child, Command, Stdio};

use super::error::LifecycleError;

const DAEMON_BIN_ENV: &str = "WARDEND_BIN";
const DAEMON_BINARY: &str = "wardend";
const DEBUG_FLAG: &str = "--debug";

/// Spawns `wardend`, forwarding the configuration flags.
///
/// Standard streams are inherited so launch diagnostics reach the operator,
/// and in debug mode the daemon keeps them for its whole run.
pub(super) fn spawn_daemon(
    config_arguments: &[OsString],
    debug: bool,
    binary_override: Option<&OsStr>,
) -> Result<Child, LifecycleError> {
    let binary = resolve_daemon_binary(binary_override);
    let mut command = Command::new(&binary);
    command.args(config_arguments.iter().skip(1));
    if debug {
        command.arg(DEBUG_FLAG);
    }
    command
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    command
        .spawn()
        .map_err(|source| LifecycleError::LaunchDaemon { binary, source })
}

/// Override, then `WARDEND_BIN`, then a `wardend` next to this executable,
/// then `wardend` on `PATH`.
fn resolve_daemon_binary(binary_override: Option<&OsStr>) -> OsString {
    binary_override
        .map(OsString::from)
        .or_else(|| env::var_os(DAEMON_BIN_ENV))
        .or_else(sibling_binary)
        .unwrap_or_else(|| OsString::from(DAEMON_BINARY))
}

fn sibling_binary() -> Option<OsString> {
    let current = env::current_exe().ok()?;
    let sibling = current.parent()?.join(DAEMON_BINARY);
    sibling.is_file().then(|| sibling.into_os_string())
}
