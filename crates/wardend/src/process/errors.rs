//! Defines the unified error surface for daemon launch and supervision.

use std::io;
use std::sync::Arc;

use ortho_config::OrthoError;
use thiserror::Error;

use warden_config::RuntimeLayoutError;

use crate::rpc::RegistryError;
use crate::telemetry::TelemetryError;
use crate::transport::ListenerError;

use super::daemonizer::DaemonizeError;
use super::lock::LockError;
use super::privilege::PrivilegeError;
use super::shutdown::ShutdownError;

/// Errors surfaced while launching or supervising the daemon process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Config {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// The runtime layout could not be derived.
    #[error(transparent)]
    Layout(#[from] RuntimeLayoutError),
    /// The procedure set was invalid.
    #[error("invalid procedure registry: {source}")]
    Registry {
        /// Underlying registry error.
        #[source]
        source: RegistryError,
    },
    /// Resolving or assuming the run-as identity failed.
    #[error(transparent)]
    Privilege(#[from] PrivilegeError),
    /// The service lock could not be taken or updated.
    #[error(transparent)]
    Lock(#[from] LockError),
    /// Structured logging could not be installed.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    /// Installing shutdown handling failed.
    #[error("failed to install shutdown handling: {source}")]
    Shutdown {
        /// Underlying shutdown error.
        #[source]
        source: ShutdownError,
    },
    /// Daemonisation failed.
    #[error("failed to daemonise: {source}")]
    Daemonize {
        /// Underlying daemonisation error.
        #[source]
        source: DaemonizeError,
    },
    /// The RPC endpoint failed.
    #[error("rpc server failed: {source}")]
    Listener {
        /// Underlying listener error.
        #[source]
        source: ListenerError,
    },
    /// The serve loop was interrupted by a signal it does not handle.
    #[error("aborting: received unexpected signal {signal}")]
    UnexpectedSignal {
        /// Signal number.
        signal: i32,
    },
    /// Writing the debug banner failed.
    #[error("failed to write to stdout: {0}")]
    Stdout(#[source] io::Error),
}

impl From<Arc<OrthoError>> for LaunchError {
    fn from(source: Arc<OrthoError>) -> Self {
        Self::Config { source }
    }
}

impl From<RegistryError> for LaunchError {
    fn from(source: RegistryError) -> Self {
        Self::Registry { source }
    }
}

impl From<ShutdownError> for LaunchError {
    fn from(source: ShutdownError) -> Self {
        match source {
            ShutdownError::UnexpectedSignal { signal } => Self::UnexpectedSignal { signal },
            other @ ShutdownError::Install { .. } => Self::Shutdown { source: other },
        }
    }
}

impl From<DaemonizeError> for LaunchError {
    fn from(source: DaemonizeError) -> Self {
        Self::Daemonize { source }
    }
}

impl From<ListenerError> for LaunchError {
    fn from(source: ListenerError) -> Self {
        match source {
            ListenerError::Interrupted { source } => source.into(),
            other => Self::Listener { source: other },
        }
    }
}
