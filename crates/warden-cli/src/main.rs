//! CLI entrypoint for controlling the `wardend` service.
//!
//! The binary delegates to [`warden_cli::run`], which loads configuration,
//! parses the command, and either drives the daemon lifecycle or performs a
//! single RPC call against the running service.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    warden_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
