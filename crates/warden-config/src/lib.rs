//! Shared configuration for the `wardend` daemon and the `warden` CLI.
//!
//! Values are layered by [`ortho_config`]: built-in defaults first, then a
//! configuration file located through `--config-path`, then `WARDEN_*`
//! environment variables, and finally command-line flags. Both binaries load
//! the same [`Config`] so the CLI can find the lock file and port the daemon
//! uses.

mod defaults;
mod logging;
mod runtime;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_LOCK_FILE, DEFAULT_LOG_FILE, DEFAULT_LOG_FILTER, DEFAULT_PORT, DEFAULT_RUN_AS_USER,
    DEFAULT_WORKING_DIR, default_lock_file, default_log_file, default_log_filter,
    default_log_filter_string, default_log_format, default_run_as_user, default_working_dir,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use runtime::{RuntimeLayout, RuntimeLayoutError};

/// Layered configuration shared by the daemon and its controller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "WARDEN")]
pub struct Config {
    /// Unprivileged account the daemon switches to after detaching.
    #[ortho_config(default = default_run_as_user())]
    pub run_as_user: String,
    /// Optional group override; the user's primary group is used when unset.
    pub run_as_group: Option<String>,
    /// Working directory adopted after detachment.
    #[ortho_config(default = default_working_dir())]
    pub working_dir: Utf8PathBuf,
    /// Append-only daemon log.
    #[ortho_config(default = default_log_file())]
    pub log_file: Utf8PathBuf,
    /// Lock file holding the pid of the running daemon.
    #[ortho_config(default = default_lock_file())]
    pub lock_file: Utf8PathBuf,
    /// Loopback port served by the RPC endpoint.
    #[ortho_config(default = DEFAULT_PORT)]
    pub port: u16,
    /// Tracing filter applied outside debug mode.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format for log lines.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            run_as_user: default_run_as_user(),
            run_as_group: None,
            working_dir: default_working_dir(),
            log_file: default_log_file(),
            lock_file: default_lock_file(),
            port: DEFAULT_PORT,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Account the daemon runs as once privileges are dropped.
    #[must_use]
    pub fn run_as_user(&self) -> &str {
        &self.run_as_user
    }

    /// Group override, if any.
    #[must_use]
    pub fn run_as_group(&self) -> Option<&str> {
        self.run_as_group.as_deref()
    }

    /// Working directory after detachment.
    #[must_use]
    pub fn working_dir(&self) -> &Utf8Path {
        &self.working_dir
    }

    /// Path of the daemon log file.
    #[must_use]
    pub fn log_file(&self) -> &Utf8Path {
        &self.log_file
    }

    /// Path of the lock file.
    #[must_use]
    pub fn lock_file(&self) -> &Utf8Path {
        &self.lock_file
    }

    /// Loopback port for the RPC endpoint.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Selected log line format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}
