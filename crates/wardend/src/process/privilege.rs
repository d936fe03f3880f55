//! Moves the daemon from its privileged launch context to the run-as account.
//!
//! Everything that needs elevated rights (lock directory ownership, the lock
//! file, the log file) is prepared before [`PrivilegeDropper::drop_to`] runs.
//! Once the drop happens there is no way back.

use std::fs::{self, DirBuilder};
use std::io;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::unistd::{Gid, Group, Uid, User, chown, getegid, geteuid, setgid, setgroups, setuid};
use thiserror::Error;
use tracing::{debug, info};

use super::PROCESS_TARGET;

const LOCK_DIR_MODE: u32 = 0o755;

/// The unprivileged identity the daemon runs as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TargetIdentity {
    pub(crate) user: String,
    pub(crate) uid: Uid,
    pub(crate) gid: Gid,
}

/// Errors raised while resolving or assuming the run-as identity.
#[derive(Debug, Error)]
pub enum PrivilegeError {
    /// The configured user has no account on this host.
    #[error("user '{user}' doesn't exist")]
    UnknownUser {
        /// Configured user name.
        user: String,
    },
    /// The configured group has no entry on this host.
    #[error("group '{group}' doesn't exist")]
    UnknownGroup {
        /// Configured group name.
        group: String,
    },
    /// The account database could not be queried.
    #[error("failed to look up '{name}': {source}")]
    Lookup {
        /// Name being resolved.
        name: String,
        /// Underlying OS error.
        #[source]
        source: Errno,
    },
    /// The lock directory could not be created.
    #[error("failed to create lock directory '{}': {source}", path.display())]
    LockDirectory {
        /// Directory path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Handing the lock directory to the run-as account failed.
    #[error("failed to hand '{}' to user '{user}': {source}", path.display())]
    Ownership {
        /// Directory path.
        path: PathBuf,
        /// Target user name.
        user: String,
        /// Underlying OS error.
        #[source]
        source: Errno,
    },
    /// A credential switch was rejected by the kernel.
    #[error("failed to {step} for user '{user}': {source}")]
    Switch {
        /// Which call failed (`setgroups`, `setgid`, or `setuid`).
        step: &'static str,
        /// Target user name.
        user: String,
        /// Underlying OS error.
        #[source]
        source: Errno,
    },
}

/// Resolves the configured account, failing fast when it is missing.
pub(crate) fn resolve_identity(
    user: &str,
    group: Option<&str>,
) -> Result<TargetIdentity, PrivilegeError> {
    let account = User::from_name(user)
        .map_err(|source| PrivilegeError::Lookup {
            name: user.to_owned(),
            source,
        })?
        .ok_or_else(|| PrivilegeError::UnknownUser {
            user: user.to_owned(),
        })?;
    let gid = match group {
        Some(name) => {
            Group::from_name(name)
                .map_err(|source| PrivilegeError::Lookup {
                    name: name.to_owned(),
                    source,
                })?
                .ok_or_else(|| PrivilegeError::UnknownGroup {
                    group: name.to_owned(),
                })?
                .gid
        }
        None => account.gid,
    };
    Ok(TargetIdentity {
        user: account.name,
        uid: account.uid,
        gid,
    })
}

/// Creates the lock directory and hands it to the run-as account.
///
/// A directory that already exists keeps its mode and owner; only a
/// directory created here gets mode 0755 and the run-as ownership.
pub(crate) fn prepare_lock_directory(
    dir: &Path,
    identity: &TargetIdentity,
) -> Result<(), PrivilegeError> {
    if dir.is_dir() {
        debug!(
            target: PROCESS_TARGET,
            dir = %dir.display(),
            "lock directory already exists"
        );
        return Ok(());
    }
    let to_error = |source| PrivilegeError::LockDirectory {
        path: dir.to_path_buf(),
        source,
    };
    DirBuilder::new()
        .recursive(true)
        .mode(LOCK_DIR_MODE)
        .create(dir)
        .map_err(to_error)?;
    fs::set_permissions(dir, fs::Permissions::from_mode(LOCK_DIR_MODE)).map_err(to_error)?;
    chown(dir, Some(identity.uid), Some(identity.gid)).map_err(|source| {
        PrivilegeError::Ownership {
            path: dir.to_path_buf(),
            user: identity.user.clone(),
            source,
        }
    })?;
    debug!(
        target: PROCESS_TARGET,
        dir = %dir.display(),
        user = %identity.user,
        "prepared lock directory"
    );
    Ok(())
}

/// Abstraction over the irreversible credential switch.
#[cfg_attr(test, mockall::automock)]
pub(crate) trait PrivilegeDropper: Send + Sync {
    /// Assumes `identity`; groups first, then gid, then uid.
    fn drop_to(&self, identity: &TargetIdentity) -> Result<(), PrivilegeError>;
}

/// Dropper backed by `setgroups`/`setgid`/`setuid`.
#[derive(Debug, Default)]
pub(crate) struct SystemPrivilegeDropper;

impl PrivilegeDropper for SystemPrivilegeDropper {
    fn drop_to(&self, identity: &TargetIdentity) -> Result<(), PrivilegeError> {
        if geteuid() == identity.uid && getegid() == identity.gid {
            debug!(
                target: PROCESS_TARGET,
                user = %identity.user,
                "already running as target identity"
            );
            return Ok(());
        }
        let switch = |step: &'static str| {
            move |source| PrivilegeError::Switch {
                step,
                user: identity.user.clone(),
                source,
            }
        };
        setgroups(&[identity.gid]).map_err(switch("setgroups"))?;
        setgid(identity.gid).map_err(switch("setgid"))?;
        setuid(identity.uid).map_err(switch("setuid"))?;
        info!(
            target: PROCESS_TARGET,
            user = %identity.user,
            uid = identity.uid.as_raw(),
            gid = identity.gid.as_raw(),
            "dropped privileges"
        );
        Ok(())
    }
}
