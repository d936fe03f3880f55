//! Lifecycle command types and output abstractions.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io::Write;

use warden_config::Config;

use super::LifecycleError;

/// Supported lifecycle commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleCommand {
    /// Launch the daemon.
    Start,
    /// Terminate the daemon.
    Stop,
    /// Stop if running, then start.
    Restart,
    /// Report running state.
    Info,
}

impl fmt::Display for LifecycleCommand {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Info => "info",
        })
    }
}

/// Invocation payload forwarded from the CLI runtime.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleInvocation {
    /// Command to run.
    pub command: LifecycleCommand,
    /// Whether the daemon should run attached in debug mode.
    pub debug: bool,
    /// Explicit target pid; otherwise the lock file is consulted.
    pub pid: Option<u32>,
}

/// Shared configuration context available to lifecycle handlers.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleContext<'a> {
    /// Loaded configuration.
    pub config: &'a Config,
    /// Configuration flags (program name first) to forward to the daemon.
    pub config_arguments: &'a [OsString],
    /// Daemon binary override.
    pub daemon_binary: Option<&'a OsStr>,
}

/// Output handle abstracting over stdout/stderr writers.
pub struct LifecycleOutput<W: Write, E: Write> {
    /// Standard output.
    pub stdout: W,
    /// Standard error.
    pub stderr: E,
}

impl<W: Write, E: Write> LifecycleOutput<W, E> {
    /// Wraps the writers.
    pub const fn new(stdout: W, stderr: E) -> Self {
        Self { stdout, stderr }
    }

    /// Writes one line to stdout.
    pub fn stdout_line(&mut self, args: fmt::Arguments<'_>) -> Result<(), LifecycleError> {
        write_line(&mut self.stdout, args)
    }

    /// Writes one line to stderr.
    pub fn stderr_line(&mut self, args: fmt::Arguments<'_>) -> Result<(), LifecycleError> {
        write_line(&mut self.stderr, args)
    }
}

fn write_line<T: Write>(target: &mut T, args: fmt::Arguments<'_>) -> Result<(), LifecycleError> {
    target.write_fmt(args).map_err(LifecycleError::Io)?;
    target.write_all(b"\n").map_err(LifecycleError::Io)?;
    target.flush().map_err(LifecycleError::Io)
}
