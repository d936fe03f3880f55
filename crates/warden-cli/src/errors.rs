//! Error types for the CLI runtime.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::client::ClientError;
use crate::lifecycle::LifecycleError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("call parameters are not valid JSON: {0}")]
    InvalidParams(#[source] serde_json::Error),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("fault {code}: {message}")]
    Fault { code: i32, message: String },
    #[error("failed to write output: {0}")]
    Output(#[source] io::Error),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}
