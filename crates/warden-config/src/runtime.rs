//! Derives the filesystem layout shared by the CLI and daemon.
//!
//! The daemon creates the lock directory and hands it to the run-as account
//! before dropping privileges; the CLI reads the pid back from the same lock
//! file. Both sides go through [`RuntimeLayout`] so they agree on the paths.

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::Config;

/// Paths of runtime artefacts derived from the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeLayout {
    lock_dir: Utf8PathBuf,
    lock_file: Utf8PathBuf,
    log_file: Utf8PathBuf,
}

impl RuntimeLayout {
    /// Derives the layout without touching the filesystem.
    pub fn from_config(config: &Config) -> Result<Self, RuntimeLayoutError> {
        let lock_file = config.lock_file().to_path_buf();
        let lock_dir = lock_file
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .map(Utf8Path::to_path_buf)
            .ok_or_else(|| RuntimeLayoutError::MissingLockParent {
                path: lock_file.clone(),
            })?;
        Ok(Self {
            lock_dir,
            lock_file,
            log_file: config.log_file().to_path_buf(),
        })
    }

    /// Directory that holds the lock file.
    #[must_use]
    pub fn lock_dir(&self) -> &Utf8Path {
        &self.lock_dir
    }

    /// Lock file recording the daemon pid.
    #[must_use]
    pub fn lock_file(&self) -> &Utf8Path {
        &self.lock_file
    }

    /// Daemon log file.
    #[must_use]
    pub fn log_file(&self) -> &Utf8Path {
        &self.log_file
    }
}

/// Errors raised while deriving the runtime layout.
#[derive(Debug, Error)]
pub enum RuntimeLayoutError {
    /// The lock path has no parent directory to prepare.
    #[error("lock file '{path}' has no parent directory")]
    MissingLockParent {
        /// Configured lock file path.
        path: Utf8PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_directory_is_parent_of_lock_file() {
        let config = Config {
            lock_file: Utf8PathBuf::from("/tmp/warden/run/wardend.pid"),
            ..Config::default()
        };
        let layout = RuntimeLayout::from_config(&config).expect("derive layout");
        assert_eq!(layout.lock_dir(), Utf8Path::new("/tmp/warden/run"));
        assert_eq!(layout.lock_file(), config.lock_file());
        assert_eq!(layout.log_file(), config.log_file());
    }

    #[test]
    fn bare_lock_file_name_is_rejected() {
        let config = Config {
            lock_file: Utf8PathBuf::from("wardend.pid"),
            ..Config::default()
        };
        let error = RuntimeLayout::from_config(&config).expect_err("missing parent");
        assert!(matches!(error, RuntimeLayoutError::MissingLockParent { .. }));
    }
}
