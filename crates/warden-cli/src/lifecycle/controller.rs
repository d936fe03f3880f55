//! High-level orchestration for daemon lifecycle commands.

use std::io::Write;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use super::error::LifecycleError;
use super::monitoring::{is_alive, read_pid};
use super::shutdown::{STOP_TIMEOUT, stop_daemon};
use super::spawning::spawn_daemon;
use super::types::{LifecycleCommand, LifecycleContext, LifecycleInvocation, LifecycleOutput};

/// Grace period between the launcher exiting and the liveness probe.
const STARTUP_PROBE_DELAY: Duration = Duration::from_millis(500);

/// Production lifecycle controller.
#[derive(Debug, Default)]
pub struct SystemLifecycle;

impl SystemLifecycle {
    /// Runs one lifecycle command.
    pub fn handle<W: Write, E: Write>(
        &mut self,
        invocation: LifecycleInvocation,
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<ExitCode, LifecycleError> {
        match invocation.command {
            LifecycleCommand::Start => Self::start(invocation, context, output),
            LifecycleCommand::Stop => Self::stop(invocation, context, output),
            LifecycleCommand::Restart => Self::restart(invocation, context, output),
            LifecycleCommand::Info => Self::info(invocation, context, output),
        }
    }

    fn start<W: Write, E: Write>(
        invocation: LifecycleInvocation,
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<ExitCode, LifecycleError> {
        let mut child = spawn_daemon(
            context.config_arguments,
            invocation.debug,
            context.daemon_binary,
        )?;
        let status = child.wait().map_err(LifecycleError::MonitorChild)?;
        if invocation.debug {
            // The daemon ran attached; its exit status is the command's.
            return Ok(status
                .code()
                .and_then(|code| u8::try_from(code).ok())
                .map_or(ExitCode::FAILURE, ExitCode::from));
        }
        if !status.success() {
            return Err(LifecycleError::StartupFailed {
                exit_status: status.code(),
            });
        }
        thread::sleep(STARTUP_PROBE_DELAY);
        match read_pid(context.config.lock_file().as_std_path())? {
            Some(pid) if is_alive(pid) => {
                output.stdout_line(format_args!("Service running, pid {pid}"))?;
                Ok(ExitCode::SUCCESS)
            }
            _ => Err(LifecycleError::ServiceNotRunning),
        }
    }

    fn stop<W: Write, E: Write>(
        invocation: LifecycleInvocation,
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<ExitCode, LifecycleError> {
        let pid = target_pid(invocation, context)?.ok_or(LifecycleError::NoService)?;
        stop_daemon(pid, STOP_TIMEOUT)?;
        output.stdout_line(format_args!("Service stopped"))?;
        Ok(ExitCode::SUCCESS)
    }

    fn restart<W: Write, E: Write>(
        invocation: LifecycleInvocation,
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<ExitCode, LifecycleError> {
        if let Some(pid) = target_pid(invocation, context)?.filter(|pid| is_alive(*pid)) {
            stop_daemon(pid, STOP_TIMEOUT)?;
            output.stdout_line(format_args!("Service stopped"))?;
        }
        Self::start(invocation, context, output)
    }

    fn info<W: Write, E: Write>(
        invocation: LifecycleInvocation,
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<ExitCode, LifecycleError> {
        match target_pid(invocation, context)? {
            Some(pid) if is_alive(pid) => {
                output.stdout_line(format_args!("Service running, pid {pid}"))?;
            }
            Some(pid) => {
                output.stdout_line(format_args!("Service not running (pid {pid} not found)"))?;
            }
            None => {
                output.stdout_line(format_args!(
                    "Service not running, or running in debug mode"
                ))?;
            }
        }
        Ok(ExitCode::SUCCESS)
    }
}

/// The explicit `--pid`, else the pid recorded in the lock file.
fn target_pid(
    invocation: LifecycleInvocation,
    context: LifecycleContext<'_>,
) -> Result<Option<u32>, LifecycleError> {
    match invocation.pid {
        Some(pid) => Ok(Some(pid)),
        None => read_pid(context.config.lock_file().as_std_path()),
    }
}
