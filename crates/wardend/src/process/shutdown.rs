//! Signal-driven cooperative shutdown.
//!
//! Signal handlers only store into atomics; the serve loop polls
//! [`ShutdownController::check`] between accepts and unwinds on its own.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use signal_hook::SigId;
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM, SIGUSR1, SIGUSR2};
use signal_hook::flag;
use thiserror::Error;
use tracing::info;

use super::PROCESS_TARGET;
use super::launch::LaunchMode;

/// Observable lifecycle of the serve loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    /// Serving requests.
    Running,
    /// Termination was requested; the loop is unwinding.
    ShutdownRequested,
    /// The loop exited and the lock was released.
    Stopped,
}

/// Errors reported by the shutdown controller.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install handler for signal {signal}: {source}")]
    Install {
        /// Signal number.
        signal: i32,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A signal other than the termination signal arrived.
    #[error("received unexpected signal {signal}")]
    UnexpectedSignal {
        /// Signal number.
        signal: i32,
    },
}

/// Abstraction over how the shutdown controller is obtained.
pub(crate) trait ShutdownSource: Send + Sync {
    /// Installs (or hands out) the controller for the given mode.
    fn install(&self, mode: LaunchMode) -> Result<Arc<ShutdownController>, ShutdownError>;
}

/// Installs real signal handlers.
#[derive(Debug, Default)]
pub(crate) struct SystemShutdownSource;

impl ShutdownSource for SystemShutdownSource {
    fn install(&self, mode: LaunchMode) -> Result<Arc<ShutdownController>, ShutdownError> {
        ShutdownController::install(mode).map(Arc::new)
    }
}

/// Cooperative termination token shared by the signal path and serve loop.
#[derive(Debug, Default)]
pub struct ShutdownController {
    terminate: Arc<AtomicBool>,
    unexpected: Arc<AtomicUsize>,
    stopped: AtomicBool,
    registrations: Vec<SigId>,
}

impl ShutdownController {
    /// Builds a controller with no signal handlers attached.
    #[must_use]
    pub fn detached() -> Self {
        Self::default()
    }

    /// Registers termination and unexpected-signal handlers for `mode`.
    ///
    /// SIGTERM always terminates. In debug mode SIGINT terminates as well so
    /// Ctrl-C works; otherwise it counts as unexpected.
    pub fn install(mode: LaunchMode) -> Result<Self, ShutdownError> {
        let mut controller = Self::detached();
        let (terminating, unexpected) = signal_sets(mode);
        for &signal in terminating {
            let id = flag::register(signal, Arc::clone(&controller.terminate))
                .map_err(|source| ShutdownError::Install { signal, source })?;
            controller.registrations.push(id);
        }
        for &signal in unexpected {
            let id = flag::register_usize(
                signal,
                Arc::clone(&controller.unexpected),
                usize::try_from(signal).unwrap_or_default(),
            )
            .map_err(|source| ShutdownError::Install { signal, source })?;
            controller.registrations.push(id);
        }
        info!(
            target: PROCESS_TARGET,
            ?mode,
            "shutdown handlers installed"
        );
        Ok(controller)
    }

    /// Requests cooperative termination.
    pub fn request_shutdown(&self) {
        self.terminate.store(true, Ordering::SeqCst);
    }

    /// Polls the token: `Ok(true)` once termination was requested.
    ///
    /// An unexpected signal is reported as an error so the caller fails
    /// loudly instead of carrying on.
    pub fn check(&self) -> Result<bool, ShutdownError> {
        let signal = self.unexpected.load(Ordering::SeqCst);
        if signal != 0 {
            return Err(ShutdownError::UnexpectedSignal {
                signal: i32::try_from(signal).unwrap_or(i32::MAX),
            });
        }
        Ok(self.terminate.load(Ordering::SeqCst))
    }

    /// Records that the loop exited and the lock was released.
    pub fn mark_stopped(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ShutdownState {
        if self.stopped.load(Ordering::SeqCst) {
            ShutdownState::Stopped
        } else if self.terminate.load(Ordering::SeqCst) {
            ShutdownState::ShutdownRequested
        } else {
            ShutdownState::Running
        }
    }

    #[cfg(test)]
    pub(crate) fn record_unexpected(&self, signal: i32) {
        self.unexpected
            .store(usize::try_from(signal).unwrap_or_default(), Ordering::SeqCst);
    }
}

impl Drop for ShutdownController {
    fn drop(&mut self) {
        for id in self.registrations.drain(..) {
            signal_hook::low_level::unregister(id);
        }
    }
}

const fn signal_sets(mode: LaunchMode) -> (&'static [i32], &'static [i32]) {
    match mode {
        LaunchMode::Debug => (&[SIGTERM, SIGINT], &[SIGHUP, SIGQUIT, SIGUSR1, SIGUSR2]),
        LaunchMode::Background => (&[SIGTERM], &[SIGHUP, SIGINT, SIGQUIT, SIGUSR1, SIGUSR2]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn starts_running() {
        let controller = ShutdownController::detached();
        assert_eq!(controller.state(), ShutdownState::Running);
        assert!(!controller.check().expect("no unexpected signal"));
    }

    #[test]
    fn walks_the_state_machine() {
        let controller = ShutdownController::detached();
        controller.request_shutdown();
        assert_eq!(controller.state(), ShutdownState::ShutdownRequested);
        assert!(controller.check().expect("termination is not an error"));
        controller.mark_stopped();
        assert_eq!(controller.state(), ShutdownState::Stopped);
    }

    #[test]
    fn unexpected_signals_fail_loudly() {
        let controller = ShutdownController::detached();
        controller.record_unexpected(SIGHUP);
        let error = controller.check().expect_err("unexpected signal");
        assert!(matches!(error, ShutdownError::UnexpectedSignal { signal } if signal == SIGHUP));
    }

    #[rstest]
    #[case::debug(LaunchMode::Debug, true)]
    #[case::background(LaunchMode::Background, false)]
    fn sigint_terminates_only_in_debug_mode(#[case] mode: LaunchMode, #[case] terminates: bool) {
        let (terminating, unexpected) = signal_sets(mode);
        assert_eq!(terminating.contains(&SIGINT), terminates);
        assert_eq!(unexpected.contains(&SIGINT), !terminates);
        assert!(terminating.contains(&SIGTERM));
    }

    #[test]
    fn delivered_signals_reach_the_controller() {
        let controller = ShutdownController::install(LaunchMode::Background).expect("install");
        signal_hook::low_level::raise(SIGTERM).expect("raise SIGTERM");
        assert_eq!(controller.state(), ShutdownState::ShutdownRequested);
        signal_hook::low_level::raise(SIGUSR2).expect("raise SIGUSR2");
        assert!(matches!(
            controller.check(),
            Err(ShutdownError::UnexpectedSignal { signal }) if signal == SIGUSR2
        ));
    }
}
