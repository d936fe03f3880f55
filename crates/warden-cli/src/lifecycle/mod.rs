//! Lifecycle management for `wardend`.
//!
//! - [`types`] defines the command models and output wrapper.
//! - [`error`] captures the error surface exposed to the CLI.
//! - [`spawning`] launches the daemon binary.
//! - [`monitoring`] reads the lock file and probes liveness.
//! - [`shutdown`] signals the daemon and waits for it to exit.
//! - [`controller`] implements the start/stop/restart/info flows.

mod controller;
mod error;
mod monitoring;
mod shutdown;
mod spawning;
mod types;

pub use controller::SystemLifecycle;
pub use error::LifecycleError;
pub use types::{LifecycleCommand, LifecycleContext, LifecycleInvocation, LifecycleOutput};
