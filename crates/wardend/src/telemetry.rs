//! Structured telemetry initialisation for the daemon.
//!
//! Log lines carry an RFC 3339 UTC timestamp, a level tag, and the emitting
//! target. Debug mode forces the `debug` filter; otherwise the configured
//! filter applies beneath an `INFO` ceiling, so debug lines never appear
//! outside debug mode.

use std::fs::File;
use std::io::{self, IsTerminal};
use std::sync::Mutex;

use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::{self, MakeWriter, time::UtcTime};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use warden_config::LogFormat;

use crate::process::DaemonConfig;

const DEBUG_FILTER: &str = "debug";
const BACKGROUND_CEILING: LevelFilter = LevelFilter::INFO;

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

type OutputLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Handle returned when telemetry has been initialised.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Where log lines are written.
#[derive(Debug)]
pub enum LogSink {
    /// The configured log file, opened for append before privileges drop.
    File(File),
    /// Standard error; used in debug mode or when the log file is unusable.
    Stderr,
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to parse the configured log filter expression.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Configures the global tracing subscriber when invoked for the first time.
///
/// Repeated calls are idempotent: only the first installs a subscriber, and
/// later sinks are dropped.
pub fn initialise(config: &DaemonConfig, sink: LogSink) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(config, sink))
        .map(|_| TelemetryHandle)
}

fn install_subscriber(config: &DaemonConfig, sink: LogSink) -> Result<(), TelemetryError> {
    let subscriber = build_subscriber(config, sink)?;
    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}

/// Builds the subscriber for `config` without installing it.
///
/// Outside debug mode the configured filter sits under an `INFO` ceiling, so
/// a permissive `log_filter` cannot surface debug or trace lines.
fn build_subscriber(
    config: &DaemonConfig,
    sink: LogSink,
) -> Result<Box<dyn Subscriber + Send + Sync>, TelemetryError> {
    let (directive, ceiling) = if config.is_debug() {
        (DEBUG_FILTER, LevelFilter::DEBUG)
    } else {
        (config.settings().log_filter(), BACKGROUND_CEILING)
    };
    let filter =
        EnvFilter::try_new(directive).map_err(|error| TelemetryError::Filter(error.to_string()))?;
    let format = config.settings().log_format();
    let output = match sink {
        LogSink::File(file) => output_layer(format, Mutex::new(file), false),
        LogSink::Stderr => output_layer(format, io::stderr, io::stderr().is_terminal()),
    };
    Ok(Box::new(
        tracing_subscriber::registry()
            .with(output)
            .with(filter)
            .with(ceiling),
    ))
}

/// Formats events as compact text or as flattened JSON objects.
///
/// Both formats carry the RFC 3339 timestamp, the level, and the target;
/// JSON lines hold them in the `timestamp`, `level`, and `target` keys
/// instead of a text prefix.
fn output_layer<W>(format: LogFormat, writer: W, ansi: bool) -> OutputLayer
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_timer(UtcTime::rfc_3339());
    match format {
        LogFormat::Json => layer.json().flatten_event(true).boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    }
}
