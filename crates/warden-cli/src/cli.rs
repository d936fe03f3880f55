//! CLI argument definitions for the `warden` controller.

use clap::{Parser, Subcommand};

/// Command-line interface for the `warden` service controller.
#[derive(Parser, Debug)]
#[command(name = "warden", disable_help_subcommand = true)]
pub(crate) struct Cli {
    /// Runs the daemon attached, with debug procedures and verbose logging.
    #[arg(long, global = true)]
    pub(crate) debug: bool,
    /// Targets this pid instead of the one recorded in the lock file.
    #[arg(long, global = true, value_name = "PID")]
    pub(crate) pid: Option<u32>,
    /// The command to run.
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

/// Commands understood by the controller.
#[derive(Subcommand, Debug, Clone)]
pub(crate) enum CliCommand {
    /// Launches the daemon and reports whether it came up.
    Start,
    /// Sends the termination signal and waits for the daemon to exit.
    Stop,
    /// Stops a running daemon, then starts a new one.
    Restart,
    /// Reports whether the daemon is running, and its pid.
    Info,
    /// Lists the procedures the running daemon exposes.
    Methods,
    /// Calls one procedure and prints its result.
    Call {
        /// Procedure name.
        method: String,
        /// JSON parameters; a scalar is sent as a single positional argument.
        params: Option<String>,
    },
}
