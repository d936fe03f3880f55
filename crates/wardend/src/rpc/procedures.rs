//! Procedures shipped with the daemon.

use serde_json::Value;
use tracing::{debug, info};

use super::RPC_TARGET;
use super::registry::ProcedureEntry;

/// The built-in procedure set handed to the registry at startup.
#[must_use]
pub fn catalogue() -> Vec<ProcedureEntry> {
    vec![
        ProcedureEntry::always("ping", "Return true; logs its arguments.", ping),
        ProcedureEntry::debug_only("echo", "Return the given value unchanged.", echo),
    ]
}

fn ping(params: Value) -> anyhow::Result<Value> {
    debug!(target: RPC_TARGET, %params, "ping");
    Ok(Value::Bool(true))
}

fn echo(params: Value) -> anyhow::Result<Value> {
    let value = match params {
        Value::Array(mut items) if items.len() == 1 => items.remove(0),
        other => other,
    };
    info!(target: RPC_TARGET, %value, "echo");
    Ok(value)
}
