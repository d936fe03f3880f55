//! Procedure registry and the fault boundary around every call.
//!
//! Procedures return `anyhow::Result<serde_json::Value>`. Whatever they fail
//! with is classified by the fault layer before it can reach a client, so callers
//! only ever observe a [`warden_daemon_types::PublicFault`].

mod fault;
mod procedures;
mod registry;

pub use fault::{ObjectNotFound, ProtocolFault, TerminationRequested};
pub(crate) use fault::CallOutcome;
pub use procedures::catalogue;
pub use registry::{
    Handler, ProcedureEntry, ProcedureRegistry, RegistryBuilder, RegistryError, Visibility,
};

pub(crate) const RPC_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::rpc");
