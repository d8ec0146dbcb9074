// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Logging setup of the AF_XDP device plugin binaries.
//!
//! Everything logs through `tracing`. [`init_logging`] installs the global
//! subscriber: an `EnvFilter` (honouring `RUST_LOG` when set), a `fmt` layer
//! writing to stderr or to a log file, and the `tracing-error` layer so that
//! errors can carry span traces.

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Subscriber;
use tracing_error::ErrorLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{self, writer::BoxMakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

pub use tracing_subscriber::filter::LevelFilter;

/// Level used when nothing is configured
pub const DEFAULT_LOGLEVEL: LevelFilter = LevelFilter::INFO;

#[derive(Debug, thiserror::Error)]
pub enum TraceCtlError {
    #[error("unknown log level '{0}': expected debug, info, warning or error")]
    UnknownLevel(String),
    #[error("cannot open log file {}: {source}", path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("logging is already initialised: {0}")]
    AlreadyInitialised(#[source] TryInitError),
}

/// Map a configured log level to a filter. `warning` and `warn` are the same level.
pub fn parse_level(level: &str) -> Result<LevelFilter, TraceCtlError> {
    match level.to_ascii_lowercase().as_str() {
        "debug" => Ok(LevelFilter::DEBUG),
        "info" => Ok(LevelFilter::INFO),
        "warning" | "warn" => Ok(LevelFilter::WARN),
        "error" => Ok(LevelFilter::ERROR),
        _ => Err(TraceCtlError::UnknownLevel(level.to_owned())),
    }
}

fn writer(log_file: Option<&Path>) -> Result<BoxMakeWriter, TraceCtlError> {
    let Some(path) = log_file else {
        return Ok(BoxMakeWriter::new(io::stderr));
    };
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| TraceCtlError::LogFile {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(BoxMakeWriter::new(Mutex::new(file)))
}

/// The subscriber [`init_logging`] installs, logging at `level` (unless
/// `RUST_LOG` says otherwise) to `log_file` or stderr.
pub fn subscriber(
    level: LevelFilter,
    log_file: Option<&Path>,
) -> Result<impl Subscriber + Send + Sync + 'static, TraceCtlError> {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_writer(writer(log_file)?);
    Ok(tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .with(ErrorLayer::default()))
}

/// Install the global subscriber. Fails, without panicking, if one is already installed.
pub fn init_logging(level: LevelFilter, log_file: Option<&Path>) -> Result<(), TraceCtlError> {
    subscriber(level, log_file)?
        .try_init()
        .map_err(TraceCtlError::AlreadyInitialised)?;
    tracing::debug!("Logging initialised at level {level}");
    Ok(())
}
