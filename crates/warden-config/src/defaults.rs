use camino::Utf8PathBuf;

use crate::logging::LogFormat;

/// Account the daemon drops to when none is configured.
pub const DEFAULT_RUN_AS_USER: &str = "warden";

/// Working directory adopted after detachment.
pub const DEFAULT_WORKING_DIR: &str = "/";

/// Location of the daemon log.
pub const DEFAULT_LOG_FILE: &str = "/var/log/warden/wardend.log";

/// Location of the lock file recording the daemon pid.
pub const DEFAULT_LOCK_FILE: &str = "/var/run/warden/wardend.pid";

/// Loopback port served by the daemon.
pub const DEFAULT_PORT: u16 = 9780;

/// Default log filter expression used by the daemon.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default run-as account.
pub fn default_run_as_user() -> String {
    DEFAULT_RUN_AS_USER.to_owned()
}

/// Default working directory.
pub fn default_working_dir() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_WORKING_DIR)
}

/// Default log file path.
pub fn default_log_file() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_LOG_FILE)
}

/// Default lock file path.
pub fn default_lock_file() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_LOCK_FILE)
}

/// Default log filter expression.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
pub fn default_log_format() -> LogFormat {
    LogFormat::Compact
}
