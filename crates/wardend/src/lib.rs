//! Lifecycle controller for the `wardend` RPC daemon.
//!
//! Background launches take an exclusive lock file, detach from the
//! terminal, drop privileges to the configured account, and serve JSON Lines
//! calls on loopback until SIGTERM arrives. Debug launches skip all of that
//! and stay attached so the daemon can be driven from a shell.
//!
//! Every call passes through the fault boundary in [`rpc`]: procedures may
//! fail however they like, but callers only ever see one of the stable
//! public faults from [`warden_daemon_types`].

mod process;
pub mod rpc;
mod telemetry;
mod transport;

pub use process::{
    DaemonConfig, DaemonizeError, LaunchError, LaunchMode, LockError, PrivilegeError,
    ServiceLock, ShutdownController, ShutdownError, ShutdownState, run_daemon,
};
pub use telemetry::{LogSink, TelemetryError, TelemetryHandle, initialise as initialise_telemetry};
pub use transport::ListenerError;

#[cfg(test)]
mod tests;
