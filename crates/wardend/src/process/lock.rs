//! Single-instance enforcement through an exclusively created lock file.
//!
//! The lock is the file itself: creation uses `O_EXCL`, so only one process
//! can ever hold a given path. A lock left behind by a dead holder is never
//! broken automatically; acquisition simply times out with [`LockError::Busy`].

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::{MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::PROCESS_TARGET;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const LOCK_FILE_MODE: u32 = 0o644;

/// Errors surfaced while acquiring or updating the service lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another process holds the lock.
    #[error("'{}' is already locked{}", path.display(), holder_suffix(*holder))]
    Busy {
        /// Lock file path.
        path: PathBuf,
        /// Pid recorded by the holder, when readable.
        holder: Option<u32>,
    },
    /// The lock file could not be created.
    #[error("could not lock '{}', are you root? ({source})", path.display())]
    Failed {
        /// Lock file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Recording the holder pid failed.
    #[error("failed to record pid in '{}': {source}", path.display())]
    Write {
        /// Lock file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

fn holder_suffix(holder: Option<u32>) -> String {
    holder.map_or_else(String::new, |pid| format!(" by pid {pid}"))
}

/// A held lock on a filesystem path.
#[derive(Debug)]
pub struct ServiceLock {
    path: PathBuf,
    file: File,
    identity: (u64, u64),
    released: bool,
}

impl ServiceLock {
    /// Acquires the lock, polling until `timeout` elapses.
    ///
    /// The current pid is written immediately so observers never see an
    /// anonymous lock for longer than the creation window.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, LockError> {
        let deadline = Instant::now() + timeout;
        loop {
            match open_exclusive(path) {
                Ok(file) => return Self::hold(path, file),
                Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        return Err(LockError::Busy {
                            path: path.to_path_buf(),
                            holder: read_holder(path),
                        });
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(source) => {
                    return Err(LockError::Failed {
                        path: path.to_path_buf(),
                        source,
                    });
                }
            }
        }
    }

    fn hold(path: &Path, file: File) -> Result<Self, LockError> {
        let metadata = file.metadata().map_err(|source| LockError::Failed {
            path: path.to_path_buf(),
            source,
        })?;
        let mut lock = Self {
            path: path.to_path_buf(),
            file,
            identity: (metadata.dev(), metadata.ino()),
            released: false,
        };
        lock.record_pid(std::process::id())?;
        info!(
            target: PROCESS_TARGET,
            file = %lock.path.display(),
            "acquired service lock"
        );
        Ok(lock)
    }

    /// Overwrites the recorded pid; called again after the process forks.
    pub fn record_pid(&mut self, pid: u32) -> Result<(), LockError> {
        let path = &self.path;
        let to_error = |source| LockError::Write {
            path: path.clone(),
            source,
        };
        self.file.set_len(0).map_err(to_error)?;
        self.file.seek(SeekFrom::Start(0)).map_err(to_error)?;
        writeln!(self.file, "{pid}").map_err(to_error)?;
        self.file.sync_all().map_err(to_error)?;
        debug!(
            target: PROCESS_TARGET,
            pid,
            file = %path.display(),
            "recorded lock holder"
        );
        Ok(())
    }

    /// Lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether [`ServiceLock::release`] has already run.
    #[must_use]
    pub const fn is_released(&self) -> bool {
        self.released
    }

    pub(crate) fn raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    /// Removes the lock file. Repeated calls are no-ops.
    ///
    /// The file is only removed while it is still the one this holder
    /// created, so a replacement owned by another holder is left alone.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match fs::symlink_metadata(&self.path) {
            Ok(metadata) if (metadata.dev(), metadata.ino()) == self.identity => {}
            Ok(_) => {
                warn!(
                    target: PROCESS_TARGET,
                    file = %self.path.display(),
                    "lock file was replaced; leaving it in place"
                );
                return;
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => return,
            Err(error) => {
                warn!(
                    target: PROCESS_TARGET,
                    file = %self.path.display(),
                    error = %error,
                    "failed to inspect lock file"
                );
                return;
            }
        }
        match fs::remove_file(&self.path) {
            Ok(()) => info!(
                target: PROCESS_TARGET,
                file = %self.path.display(),
                "released service lock"
            ),
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => warn!(
                target: PROCESS_TARGET,
                file = %self.path.display(),
                error = %error,
                "failed to remove lock file"
            ),
        }
    }
}

impl Drop for ServiceLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// Creates the lock file; the mode is applied explicitly so the umask
/// cannot hide the pid from unprivileged readers.
fn open_exclusive(path: &Path) -> io::Result<File> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .mode(LOCK_FILE_MODE)
        .open(path)?;
    file.set_permissions(fs::Permissions::from_mode(LOCK_FILE_MODE))?;
    Ok(file)
}

/// Reads the pid recorded in a lock file, if any.
pub(crate) fn read_holder(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}
