// src/errors.rs

//! Crate-wide error types.
//!
//! - [`ExecError`] is what an execution's completion signal fails with.
//! - [`LockError`] is what aborts a lock acquisition.
//! - [`HarnessError`] covers configuration loading and everything else.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure of a launched process to produce a usable exit code.
///
/// Cloneable so a single completion can be observed by any number of waiters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error("failed to launch {path:?}: {message}")]
    LaunchFailure {
        path: PathBuf,
        kind: io::ErrorKind,
        message: String,
    },

    #[error("closed because of a signal: {signal}")]
    SignalTermination { signal: String },

    #[error("exit code {code:#x}: {message}")]
    MissingDependency { code: i64, message: String },

    #[error("lost track of the process: {0}")]
    Wait(String),
}

impl ExecError {
    pub(crate) fn launch(path: PathBuf, err: &io::Error) -> Self {
        ExecError::LaunchFailure {
            path,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Unrecoverable failure while acquiring a resource lock.
///
/// Corrupt and abandoned lock records are handled inside the acquisition loop
/// and never show up here.
#[derive(Error, Debug)]
pub enum LockError {
    #[error("lock file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("probing liveness of pid {pid}: {source}")]
    Probe {
        pid: u32,
        #[source]
        source: io::Error,
    },

    #[error("gave up waiting for lock {0:?}")]
    Cancelled(PathBuf),
}

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, HarnessError>;
