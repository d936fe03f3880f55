//! Supervises daemon launch sequencing and runtime orchestration.

use std::env;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::net::SocketAddr;
use std::os::unix::fs::OpenOptionsExt;
use std::sync::Arc;

use camino::Utf8Path;
use tracing::{error, info};

use warden_config::{Config, RuntimeLayout};

use crate::rpc::{ProcedureEntry, ProcedureRegistry, RegistryBuilder, catalogue};
use crate::telemetry::{self, LogSink};
use crate::transport::{RpcConnectionHandler, RpcListener};

use super::daemonizer::{Daemonizer, DetachPlan, SystemDaemonizer};
use super::errors::LaunchError;
use super::lock::ServiceLock;
use super::privilege::{
    PrivilegeDropper, SystemPrivilegeDropper, prepare_lock_directory, resolve_identity,
};
use super::shutdown::{ShutdownController, ShutdownSource, SystemShutdownSource};
use super::{DEBUG_ENV_VAR, DEBUG_FLAG, LOCK_TIMEOUT, PROCESS_TARGET};

/// Launch mode for the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Lock, detach, drop privileges, and log to the configured file.
    Background,
    /// Stay attached with the original streams; no lock, no privilege drop,
    /// verbose logging, and debug-only procedures exposed.
    Debug,
}

impl LaunchMode {
    /// Splits the `--debug` flag out of `args`.
    ///
    /// A non-empty `WARDEN_DEBUG` other than `0` selects debug mode as well.
    /// The remaining arguments are meant for configuration loading.
    pub fn from_args<I>(args: I) -> (Self, Vec<OsString>)
    where
        I: IntoIterator<Item = OsString>,
    {
        Self::from_parts(args, env::var_os(DEBUG_ENV_VAR))
    }

    fn from_parts<I>(args: I, env_flag: Option<OsString>) -> (Self, Vec<OsString>)
    where
        I: IntoIterator<Item = OsString>,
    {
        let mut debug = env_flag.is_some_and(|value| !value.is_empty() && value != "0");
        let remaining = args
            .into_iter()
            .filter(|arg| {
                let is_flag = arg == DEBUG_FLAG;
                debug |= is_flag;
                !is_flag
            })
            .collect();
        let mode = if debug { Self::Debug } else { Self::Background };
        (mode, remaining)
    }
}

/// Configuration fixed for the lifetime of the daemon process.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    settings: Config,
    mode: LaunchMode,
}

impl DaemonConfig {
    /// Pairs loaded settings with the launch mode.
    #[must_use]
    pub const fn new(settings: Config, mode: LaunchMode) -> Self {
        Self { settings, mode }
    }

    /// Layered settings.
    #[must_use]
    pub const fn settings(&self) -> &Config {
        &self.settings
    }

    /// Launch mode.
    #[must_use]
    pub const fn mode(&self) -> LaunchMode {
        self.mode
    }

    /// Whether the daemon runs in debug mode.
    #[must_use]
    pub const fn is_debug(&self) -> bool {
        matches!(self.mode, LaunchMode::Debug)
    }
}

/// Process-level collaborators needed to control daemon lifecycle.
pub(crate) struct ProcessControl<D, P, S> {
    pub(crate) daemonizer: D,
    pub(crate) privileges: P,
    pub(crate) shutdown: S,
}

/// Everything required to launch the daemon runtime.
pub(crate) struct LaunchPlan<D, P, S> {
    pub(crate) config: DaemonConfig,
    pub(crate) process: ProcessControl<D, P, S>,
    pub(crate) procedures: Vec<ProcedureEntry>,
}

/// Runs the daemon using the production collaborators.
pub fn run_daemon(config: DaemonConfig) -> Result<(), LaunchError> {
    let plan = LaunchPlan {
        config,
        process: ProcessControl {
            daemonizer: SystemDaemonizer,
            privileges: SystemPrivilegeDropper,
            shutdown: SystemShutdownSource,
        },
        procedures: catalogue(),
    };
    run_daemon_with(plan)
}

/// Runs the daemon with injected collaborators.
pub(crate) fn run_daemon_with<D, P, S>(plan: LaunchPlan<D, P, S>) -> Result<(), LaunchError>
where
    D: Daemonizer,
    P: PrivilegeDropper,
    S: ShutdownSource,
{
    let LaunchPlan {
        config,
        process,
        procedures,
    } = plan;
    let registry = RegistryBuilder::from(procedures).build(config.is_debug())?;
    match config.mode() {
        LaunchMode::Debug => run_attached(&config, &process.shutdown, &registry),
        LaunchMode::Background => run_detached(&config, &process, &registry),
    }
}

fn run_attached<S: ShutdownSource>(
    config: &DaemonConfig,
    shutdown: &S,
    registry: &ProcedureRegistry,
) -> Result<(), LaunchError> {
    telemetry::initialise(config, LogSink::Stderr)?;
    info!(target: PROCESS_TARGET, mode = ?config.mode(), "starting daemon runtime");
    let shutdown = shutdown.install(config.mode())?;
    let outcome = serve(config, registry, &shutdown, |addr| {
        let mut stdout = io::stdout().lock();
        writeln!(
            stdout,
            "Running in debug mode, pid {} listening on {addr}",
            std::process::id()
        )
        .and_then(|()| stdout.flush())
        .map_err(LaunchError::Stdout)
    });
    finish(None, &shutdown, outcome)
}

fn run_detached<D, P, S>(
    config: &DaemonConfig,
    process: &ProcessControl<D, P, S>,
    registry: &ProcedureRegistry,
) -> Result<(), LaunchError>
where
    D: Daemonizer,
    P: PrivilegeDropper,
    S: ShutdownSource,
{
    let settings = config.settings();
    let identity = resolve_identity(settings.run_as_user(), settings.run_as_group())?;
    let layout = RuntimeLayout::from_config(settings)?;
    prepare_lock_directory(layout.lock_dir().as_std_path(), &identity)?;
    let mut lock = ServiceLock::acquire(layout.lock_file().as_std_path(), LOCK_TIMEOUT)?;

    let log_file = open_log_file(layout.log_file());
    let sink = log_file
        .as_ref()
        .and_then(|file| file.try_clone().ok())
        .map_or(LogSink::Stderr, LogSink::File);
    telemetry::initialise(config, sink)?;
    info!(
        target: PROCESS_TARGET,
        mode = ?config.mode(),
        user = %identity.user,
        "starting daemon runtime"
    );

    let shutdown = process.shutdown.install(config.mode())?;
    process.daemonizer.daemonize(&DetachPlan {
        working_dir: settings.working_dir().as_std_path(),
        log_file: log_file.as_ref(),
        lock_fd: lock.raw_fd(),
    })?;
    lock.record_pid(std::process::id())?;
    process.privileges.drop_to(&identity)?;

    let outcome = serve(config, registry, &shutdown, |_| Ok(()));
    finish(Some(&mut lock), &shutdown, outcome)
}

fn serve<F>(
    config: &DaemonConfig,
    registry: &ProcedureRegistry,
    shutdown: &ShutdownController,
    on_bound: F,
) -> Result<(), LaunchError>
where
    F: FnOnce(SocketAddr) -> Result<(), LaunchError>,
{
    let listener = RpcListener::bind(config.settings().port())?;
    info!(
        target: PROCESS_TARGET,
        pid = std::process::id(),
        endpoint = %listener.local_addr(),
        procedures = ?registry.names(),
        "serving"
    );
    on_bound(listener.local_addr())?;
    listener.serve(&RpcConnectionHandler::new(registry), shutdown)?;
    Ok(())
}

fn finish(
    lock: Option<&mut ServiceLock>,
    shutdown: &Arc<ShutdownController>,
    outcome: Result<(), LaunchError>,
) -> Result<(), LaunchError> {
    if let Err(failure) = &outcome {
        error!(target: PROCESS_TARGET, error = %failure, "daemon runtime failed");
    }
    if let Some(lock) = lock {
        lock.release();
    }
    shutdown.mark_stopped();
    info!(target: PROCESS_TARGET, "Exiting");
    outcome
}

/// Opens the log file for appending, falling back to stderr on failure.
fn open_log_file(path: &Utf8Path) -> Option<File> {
    match OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o640)
        .open(path)
    {
        Ok(file) => Some(file),
        Err(error) => {
            // Telemetry is not installed yet, so stderr is the only channel.
            let mut stderr = io::stderr().lock();
            writeln!(stderr, "cannot open log file '{path}': {error}; logging to stderr").ok();
            None
        }
    }
}
