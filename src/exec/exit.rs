// src/exec/exit.rs

//! Turning an OS exit status into the completion outcome.

use std::process::ExitStatus;

use serde::Deserialize;

use crate::errors::ExecError;

/// Windows `STATUS_DLL_NOT_FOUND`.
pub const STATUS_DLL_NOT_FOUND: i64 = 0xC000_0135;

/// One remapped exit code.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MissingDependency {
    pub code: i64,
    pub message: String,
}

/// Exit codes that mean "the binary could not even load", with the message to
/// report instead of the raw code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissingDependencyTable {
    entries: Vec<MissingDependency>,
}

impl MissingDependencyTable {
    pub fn new(entries: Vec<MissingDependency>) -> Self {
        Self { entries }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// The table for the platform we are running on.
    ///
    /// Only Windows reports loader failures through distinguished exit codes,
    /// everywhere else this is empty.
    pub fn platform_default() -> Self {
        if cfg!(windows) {
            Self::new(vec![MissingDependency {
                code: STATUS_DLL_NOT_FOUND,
                message: "DLL_NOT_FOUND. libusb1.dll is probably missing.".to_string(),
            }])
        } else {
            Self::empty()
        }
    }

    pub fn entries(&self) -> &[MissingDependency] {
        &self.entries
    }

    /// Look up an exit code.
    ///
    /// NTSTATUS values come back from the OS as negative `i32`s, so both the
    /// signed and the unsigned reading of `code` are checked.
    pub fn lookup(&self, code: i32) -> Option<&MissingDependency> {
        let signed = i64::from(code);
        let unsigned = i64::from(code as u32);
        self.entries
            .iter()
            .find(|entry| entry.code == signed || entry.code == unsigned)
    }
}

/// Map a finished process status to an exit code or a structured failure.
pub fn interpret_status(
    status: ExitStatus,
    table: &MissingDependencyTable,
) -> Result<i32, ExecError> {
    match status.code() {
        Some(code) => match table.lookup(code) {
            Some(entry) => Err(ExecError::MissingDependency {
                code: entry.code,
                message: entry.message.clone(),
            }),
            None => Ok(code),
        },
        None => Err(ExecError::SignalTermination {
            signal: signal_name(status),
        }),
    }
}

#[cfg(unix)]
fn signal_name(status: ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt as _;

    match status.signal() {
        Some(raw) => match nix::sys::signal::Signal::try_from(raw) {
            Ok(signal) => signal.as_str().to_string(),
            Err(_) => format!("signal {raw}"),
        },
        None => "unknown".to_string(),
    }
}

#[cfg(not(unix))]
fn signal_name(_status: ExitStatus) -> String {
    "unknown".to_string()
}
