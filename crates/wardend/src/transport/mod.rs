//! Loopback TCP transport for the RPC endpoint.

mod errors;
mod handler;
mod listener;

pub use errors::ListenerError;
pub(crate) use handler::{ConnectionHandler, Disposition, RpcConnectionHandler};
pub(crate) use listener::RpcListener;

pub(crate) const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
