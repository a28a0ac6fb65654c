// src/lock/domain.rs

use std::path::{Path, PathBuf};

use crate::errors::{HarnessError, Result};

/// Domain shared by every test run that talks to the programmer hardware.
pub const DEFAULT_DOMAIN: &str = "dfu-programmer-test";

/// Name of a lock that every contender agrees on.
///
/// A domain maps to exactly one record file, `<dir>/<name>.lock`, where `dir`
/// is the system temporary directory unless stated otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockDomain {
    name: String,
}

impl LockDomain {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self { name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record path inside the system temporary directory.
    pub fn path(&self) -> PathBuf {
        self.path_in(std::env::temp_dir())
    }

    pub fn path_in(&self, dir: impl AsRef<Path>) -> PathBuf {
        dir.as_ref().join(format!("{}.lock", self.name))
    }
}

impl Default for LockDomain {
    fn default() -> Self {
        Self {
            name: DEFAULT_DOMAIN.to_string(),
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(HarnessError::ConfigError(
            "lock domain must not be empty".to_string(),
        ));
    }
    if name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(HarnessError::ConfigError(format!(
            "lock domain '{name}' must be a plain file name"
        )));
    }
    Ok(())
}
