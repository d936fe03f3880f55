use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};

use serde_json::Value;
use thiserror::Error;
use tracing::{error, warn};

use warden_daemon_types::{
    GENERIC_INTERNAL_ERROR, GENERIC_RPC_ERROR, OBJECT_NOT_FOUND, PublicFault, RpcReply,
    StableFault,
};

use super::RPC_TARGET;
use super::registry::Handler;

/// Returned by a procedure to stop the serve loop after the current call.
#[derive(Debug, Error)]
#[error("termination requested")]
pub struct TerminationRequested;

/// A procedure referred to something that does not exist.
#[derive(Debug, Error)]
#[error("{what} does not exist")]
pub struct ObjectNotFound {
    /// Description of the missing object.
    pub what: String,
}

impl ObjectNotFound {
    /// Names the missing object.
    pub fn new(what: impl Into<String>) -> Self {
        Self { what: what.into() }
    }
}

/// A lower-level protocol failure that was never meant for callers.
#[derive(Debug, Error)]
#[error("protocol fault {code}: {message}")]
pub struct ProtocolFault {
    /// Code reported by the lower layer.
    pub code: i32,
    /// Message reported by the lower layer.
    pub message: String,
}

/// What the serve loop does with a finished call.
#[derive(Debug)]
pub(crate) enum CallOutcome {
    /// Send this reply to the caller.
    Reply(RpcReply),
    /// Close the connection without replying and stop serving.
    Terminate,
}

enum Translation {
    Expose(PublicFault),
    Propagate,
    Sanitise(StableFault),
}

type Matcher = fn(&anyhow::Error) -> Option<Translation>;

/// Ordered matchers; the first hit wins, and anything left over is an
/// internal error.
const FAULT_CHAIN: &[Matcher] = &[
    declared_fault,
    termination,
    missing_object,
    protocol_fault,
];

fn causes<'a, T>(error: &'a anyhow::Error) -> impl Iterator<Item = &'a T>
where
    T: std::error::Error + Send + Sync + 'static,
{
    error
        .downcast_ref::<T>()
        .into_iter()
        .chain(error.chain().filter_map(|cause| cause.downcast_ref::<T>()))
}

fn declared_fault(error: &anyhow::Error) -> Option<Translation> {
    causes::<PublicFault>(error)
        .next()
        .map(|fault| Translation::Expose(fault.clone()))
}

fn termination(error: &anyhow::Error) -> Option<Translation> {
    causes::<TerminationRequested>(error)
        .next()
        .map(|_| Translation::Propagate)
}

fn missing_object(error: &anyhow::Error) -> Option<Translation> {
    let not_found = causes::<ObjectNotFound>(error).next().is_some()
        || causes::<io::Error>(error).any(|io| io.kind() == io::ErrorKind::NotFound);
    not_found.then_some(Translation::Sanitise(OBJECT_NOT_FOUND))
}

fn protocol_fault(error: &anyhow::Error) -> Option<Translation> {
    let protocol = causes::<ProtocolFault>(error).next().is_some()
        || causes::<serde_json::Error>(error).next().is_some();
    protocol.then_some(Translation::Sanitise(GENERIC_RPC_ERROR))
}

fn classify(error: &anyhow::Error) -> Translation {
    FAULT_CHAIN
        .iter()
        .find_map(|matcher| matcher(error))
        .unwrap_or(Translation::Sanitise(GENERIC_INTERNAL_ERROR))
}

/// Maps a procedure failure onto what the caller may see.
///
/// Sanitised failures are logged in full first; the backtrace is only
/// included in debug mode.
pub(crate) fn translate(method: &str, failure: &anyhow::Error, debug: bool) -> CallOutcome {
    match classify(failure) {
        Translation::Expose(fault) => {
            warn!(
                target: RPC_TARGET,
                method,
                code = fault.code,
                message = %fault.message,
                "procedure raised a public fault"
            );
            CallOutcome::Reply(fault.into())
        }
        Translation::Propagate => CallOutcome::Terminate,
        Translation::Sanitise(stable) => {
            let detail = format!("{failure:#}");
            if debug {
                error!(
                    target: RPC_TARGET,
                    method,
                    code = stable.code,
                    error = %detail,
                    backtrace = %failure.backtrace(),
                    "procedure failed"
                );
            } else {
                error!(
                    target: RPC_TARGET,
                    method,
                    code = stable.code,
                    error = %detail,
                    "procedure failed"
                );
            }
            CallOutcome::Reply(stable.fault().into())
        }
    }
}

/// Runs `handler` behind the fault boundary, panics included.
pub(crate) fn invoke(method: &str, handler: &Handler, params: Value, debug: bool) -> CallOutcome {
    match panic::catch_unwind(AssertUnwindSafe(|| handler(params))) {
        Ok(Ok(value)) => CallOutcome::Reply(RpcReply::result(value)),
        Ok(Err(failure)) => translate(method, &failure, debug),
        Err(payload) => {
            error!(
                target: RPC_TARGET,
                method,
                panic = panic_message(payload.as_ref()),
                "procedure panicked"
            );
            CallOutcome::Reply(GENERIC_INTERNAL_ERROR.fault().into())
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
