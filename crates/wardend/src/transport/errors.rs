use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::process::ShutdownError;

/// Errors raised by the RPC listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Binding the loopback endpoint failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Switching the listener to non-blocking mode failed.
    #[error("failed to configure listener: {source}")]
    NonBlocking {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The serve loop was stopped by the shutdown controller.
    #[error(transparent)]
    Interrupted {
        /// Underlying shutdown error.
        #[from]
        source: ShutdownError,
    },
}
