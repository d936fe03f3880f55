//! Command-line controller for the `wardend` service.
//!
//! `start`, `stop`, `restart`, and `info` drive the daemon lifecycle through
//! the lock file and process signals. `methods` and `call` talk to a running
//! daemon over its loopback endpoint. IO streams and configuration loading
//! are injected so the runtime can be exercised from tests.

use std::ffi::{OsStr, OsString};
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use serde_json::Value;
use warden_config::Config;
use warden_daemon_types::RpcReply;

mod cli;
mod client;
mod config;
mod errors;
mod lifecycle;

use cli::{Cli, CliCommand};
pub use client::{ClientError, call};
use config::{ConfigLoader, OrthoConfigLoader, split_config_arguments};
use errors::AppError;
pub use lifecycle::{
    LifecycleCommand, LifecycleContext, LifecycleError, LifecycleInvocation, LifecycleOutput,
    SystemLifecycle,
};

const LIST_METHODS: &str = "system.listMethods";

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_with_loader(args, stdout, stderr, &OrthoConfigLoader, None)
}

fn run_with_loader<I, W, E, L>(
    args: I,
    stdout: &mut W,
    stderr: &mut E,
    loader: &L,
    daemon_binary: Option<&OsStr>,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let args: Vec<OsString> = args.into_iter().collect();
    let split = split_config_arguments(&args);
    let cli_arguments = split
        .config_arguments
        .first()
        .into_iter()
        .chain(args.iter().skip(split.command_start))
        .cloned();

    let result = Cli::try_parse_from(cli_arguments)
        .map_err(AppError::CliUsage)
        .and_then(|cli| {
            let config = loader.load(&split.config_arguments)?;
            let context = LifecycleContext {
                config: &config,
                config_arguments: &split.config_arguments,
                daemon_binary,
            };
            execute(cli, context, &mut *stdout, &mut *stderr)
        });

    match result {
        Ok(exit_code) => exit_code,
        Err(AppError::CliUsage(error)) if !error.use_stderr() => {
            write!(stdout, "{error}").ok();
            ExitCode::SUCCESS
        }
        Err(error) => {
            writeln!(stderr, "error: {error}").ok();
            ExitCode::FAILURE
        }
    }
}

fn execute<W: Write, E: Write>(
    cli: Cli,
    context: LifecycleContext<'_>,
    stdout: &mut W,
    stderr: &mut E,
) -> Result<ExitCode, AppError> {
    let lifecycle = |command| LifecycleInvocation {
        command,
        debug: cli.debug,
        pid: cli.pid,
    };
    let invocation = match &cli.command {
        CliCommand::Start => lifecycle(LifecycleCommand::Start),
        CliCommand::Stop => lifecycle(LifecycleCommand::Stop),
        CliCommand::Restart => lifecycle(LifecycleCommand::Restart),
        CliCommand::Info => lifecycle(LifecycleCommand::Info),
        CliCommand::Methods => return list_methods(context.config, stdout),
        CliCommand::Call { method, params } => {
            return call_procedure(context.config, method, params.as_deref(), stdout);
        }
    };
    let mut output = LifecycleOutput::new(stdout, stderr);
    Ok(SystemLifecycle.handle(invocation, context, &mut output)?)
}

fn list_methods<W: Write>(config: &Config, stdout: &mut W) -> Result<ExitCode, AppError> {
    let value = expect_result(call(config.port(), LIST_METHODS, Value::Array(Vec::new()))?)?;
    let names: Vec<&str> = value
        .as_array()
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    for name in names {
        writeln!(stdout, "{name}").map_err(AppError::Output)?;
    }
    Ok(ExitCode::SUCCESS)
}

fn call_procedure<W: Write>(
    config: &Config,
    method: &str,
    params: Option<&str>,
    stdout: &mut W,
) -> Result<ExitCode, AppError> {
    let params = match params {
        None => Value::Array(Vec::new()),
        Some(text) => match serde_json::from_str(text).map_err(AppError::InvalidParams)? {
            structured @ (Value::Array(_) | Value::Object(_)) => structured,
            scalar => Value::Array(vec![scalar]),
        },
    };
    let value = expect_result(call(config.port(), method, params)?)?;
    writeln!(stdout, "{value}").map_err(AppError::Output)?;
    Ok(ExitCode::SUCCESS)
}

fn expect_result(reply: RpcReply) -> Result<Value, AppError> {
    match reply {
        RpcReply::Result { value } => Ok(value),
        RpcReply::Fault { code, message } => Err(AppError::Fault { code, message }),
    }
}

#[cfg(test)]
mod tests;
