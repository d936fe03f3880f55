//! Explicit procedure registration.
//!
//! Entries are collected in a [`RegistryBuilder`], validated for unique names
//! as a whole, and only then filtered by launch mode. A duplicate name is a
//! startup error even when one of the clashing entries would be filtered out.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

use warden_daemon_types::{METHOD_NOT_FOUND, RpcReply, RpcRequest};

use super::RPC_TARGET;
use super::fault::{CallOutcome, ObjectNotFound, invoke};

/// Procedure body; receives the request parameters.
pub type Handler = Box<dyn Fn(Value) -> anyhow::Result<Value> + Send + Sync>;

const LIST_METHODS: &str = "system.listMethods";
const METHOD_HELP: &str = "system.methodHelp";
const RESERVED: [&str; 2] = [LIST_METHODS, METHOD_HELP];

/// When a procedure is exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Registered in every mode.
    Always,
    /// Registered only when the daemon runs in debug mode.
    DebugOnly,
}

/// A named procedure awaiting registration.
pub struct ProcedureEntry {
    name: String,
    summary: String,
    visibility: Visibility,
    handler: Handler,
}

impl ProcedureEntry {
    /// Builds an entry with explicit visibility.
    pub fn new<F>(
        name: impl Into<String>,
        summary: impl Into<String>,
        visibility: Visibility,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            summary: summary.into(),
            visibility,
            handler: Box::new(handler),
        }
    }

    /// Builds an entry registered in every mode.
    pub fn always<F>(name: impl Into<String>, summary: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::new(name, summary, Visibility::Always, handler)
    }

    /// Builds an entry registered only in debug mode.
    pub fn debug_only<F>(name: impl Into<String>, summary: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::new(name, summary, Visibility::DebugOnly, handler)
    }

    /// Procedure name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Visibility of the entry.
    #[must_use]
    pub const fn visibility(&self) -> Visibility {
        self.visibility
    }
}

impl std::fmt::Debug for ProcedureEntry {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ProcedureEntry")
            .field("name", &self.name)
            .field("visibility", &self.visibility)
            .finish_non_exhaustive()
    }
}

/// Errors raised while validating the procedure set.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Two entries share a name.
    #[error("procedure '{name}' is registered more than once")]
    Duplicate {
        /// Clashing name.
        name: String,
    },
    /// An entry uses a name reserved for introspection.
    #[error("procedure name '{name}' is reserved")]
    Reserved {
        /// Reserved name.
        name: String,
    },
}

/// Collects procedure entries before the server is built.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entries: Vec<ProcedureEntry>,
}

impl RegistryBuilder {
    /// Starts an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one entry.
    #[must_use]
    pub fn register(mut self, entry: ProcedureEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Validates the entries and keeps those visible in the given mode.
    pub fn build(self, debug_mode: bool) -> Result<ProcedureRegistry, RegistryError> {
        let mut seen = BTreeSet::new();
        for entry in &self.entries {
            if RESERVED.contains(&entry.name.as_str()) {
                return Err(RegistryError::Reserved {
                    name: entry.name.clone(),
                });
            }
            if !seen.insert(entry.name.as_str()) {
                return Err(RegistryError::Duplicate {
                    name: entry.name.clone(),
                });
            }
        }

        let mut entries: BTreeMap<String, ProcedureEntry> = self
            .entries
            .into_iter()
            .filter(|entry| debug_mode || entry.visibility == Visibility::Always)
            .map(|entry| (entry.name.clone(), entry))
            .collect();

        let mut names: Vec<String> = entries.keys().cloned().collect();
        names.extend(RESERVED.iter().map(|name| (*name).to_owned()));
        names.sort_unstable();
        let mut summaries: BTreeMap<String, String> = entries
            .values()
            .map(|entry| (entry.name.clone(), entry.summary.clone()))
            .collect();
        summaries.insert(LIST_METHODS.to_owned(), "List registered procedures.".to_owned());
        summaries.insert(METHOD_HELP.to_owned(), "Describe a registered procedure.".to_owned());

        let listed = names.clone();
        entries.insert(
            LIST_METHODS.to_owned(),
            ProcedureEntry::always(LIST_METHODS, "List registered procedures.", move |_| {
                Ok(json!(listed))
            }),
        );
        entries.insert(
            METHOD_HELP.to_owned(),
            ProcedureEntry::always(METHOD_HELP, "Describe a registered procedure.", move |params| {
                let name = first_string(&params)
                    .ok_or_else(|| ObjectNotFound::new("procedure name argument"))?;
                summaries
                    .get(name)
                    .map(|summary| json!(summary))
                    .ok_or_else(|| ObjectNotFound::new(format!("procedure '{name}'")).into())
            }),
        );

        debug!(
            target: RPC_TARGET,
            debug_mode,
            procedures = ?names,
            "procedure registry built"
        );
        Ok(ProcedureRegistry {
            entries,
            debug: debug_mode,
        })
    }
}

impl From<Vec<ProcedureEntry>> for RegistryBuilder {
    fn from(entries: Vec<ProcedureEntry>) -> Self {
        Self { entries }
    }
}

fn first_string(params: &Value) -> Option<&str> {
    match params {
        Value::Array(items) => items.first().and_then(Value::as_str),
        Value::Object(fields) => fields.get("name").and_then(Value::as_str),
        Value::String(name) => Some(name),
        _ => None,
    }
}

/// The immutable set of callable procedures.
#[derive(Debug)]
pub struct ProcedureRegistry {
    entries: BTreeMap<String, ProcedureEntry>,
    debug: bool,
}

impl ProcedureRegistry {
    /// Sorted names of every callable procedure, introspection included.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Whether `name` can be called.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Dispatches one request behind the fault boundary.
    ///
    /// Names that are not registered in the current mode, debug-only ones
    /// included, get `METHOD_NOT_FOUND`.
    pub(crate) fn dispatch(&self, request: RpcRequest) -> CallOutcome {
        let RpcRequest { method, params } = request;
        let Some(entry) = self.entries.get(&method) else {
            warn!(
                target: RPC_TARGET,
                method = %method,
                "call to unregistered procedure"
            );
            return CallOutcome::Reply(RpcReply::from(METHOD_NOT_FOUND.fault()));
        };
        debug!(target: RPC_TARGET, method = %method, "dispatching call");
        invoke(&method, &entry.handler, params, self.debug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use warden_daemon_types::{GENERIC_INTERNAL_ERROR, OBJECT_NOT_FOUND};

    fn ok(_: Value) -> anyhow::Result<Value> {
        Ok(Value::Bool(true))
    }

    fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
            .register(ProcedureEntry::always("ping", "Liveness probe.", ok))
            .register(ProcedureEntry::debug_only("echo", "Echo arguments.", ok))
    }

    fn call(registry: &ProcedureRegistry, method: &str, params: Value) -> RpcReply {
        match registry.dispatch(RpcRequest::new(method, params)) {
            CallOutcome::Reply(reply) => reply,
            CallOutcome::Terminate => panic!("unexpected termination"),
        }
    }

    #[rstest]
    #[case::debug(true, true)]
    #[case::background(false, false)]
    fn debug_only_entries_follow_the_mode(#[case] debug: bool, #[case] present: bool) {
        let registry = builder().build(debug).expect("build registry");
        assert!(registry.contains("ping"));
        assert_eq!(registry.contains("echo"), present);
        let listed = call(&registry, LIST_METHODS, Value::Null);
        let RpcReply::Result { value } = listed else {
            panic!("listMethods should succeed");
        };
        let names: Vec<String> = serde_json::from_value(value).expect("names");
        assert_eq!(names.contains(&"echo".to_owned()), present);
        assert!(names.contains(&LIST_METHODS.to_owned()));
    }

    #[test]
    fn hidden_debug_procedures_look_unknown() {
        let registry = builder().build(false).expect("build registry");
        let hidden = call(&registry, "echo", json!([]));
        let unknown = call(&registry, "does.not.exist", json!([]));
        assert_eq!(hidden, RpcReply::from(METHOD_NOT_FOUND.fault()));
        assert_eq!(hidden, unknown);
    }

    #[rstest]
    #[case::same_visibility(Visibility::Always)]
    #[case::filtered_clash(Visibility::DebugOnly)]
    fn duplicate_names_are_rejected(#[case] visibility: Visibility) {
        let error = builder()
            .register(ProcedureEntry::new("ping", "again", visibility, ok))
            .build(false)
            .expect_err("duplicate");
        assert!(matches!(error, RegistryError::Duplicate { name } if name == "ping"));
    }

    #[test]
    fn introspection_names_are_reserved() {
        let error = RegistryBuilder::new()
            .register(ProcedureEntry::always(LIST_METHODS, "shadow", ok))
            .build(true)
            .expect_err("reserved");
        assert!(matches!(error, RegistryError::Reserved { .. }));
    }

    #[test]
    fn method_help_describes_known_procedures() {
        let registry = builder().build(false).expect("build registry");
        assert_eq!(
            call(&registry, METHOD_HELP, json!(["ping"])),
            RpcReply::result(json!("Liveness probe."))
        );
        assert_eq!(
            call(&registry, METHOD_HELP, json!(["echo"])),
            RpcReply::from(OBJECT_NOT_FOUND.fault())
        );
    }

    #[test]
    fn failing_procedures_are_sanitised() {
        let registry = RegistryBuilder::new()
            .register(ProcedureEntry::always("fail", "Always fails.", |_| {
                Err(anyhow::anyhow!("connection string postgres://admin:hunter2@db"))
            }))
            .build(false)
            .expect("build registry");
        assert_eq!(
            call(&registry, "fail", Value::Null),
            RpcReply::from(GENERIC_INTERNAL_ERROR.fault())
        );
    }
}
