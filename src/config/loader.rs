// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{HarnessConfig, RawConfigFile};
use crate::errors::Result;

/// Read a configuration file without validating it.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    let config: RawConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Load, apply `DFU` / `TARGET` overrides and validate.
///
/// A missing file is not an error: the harness runs on defaults and
/// environment variables alone.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<HarnessConfig> {
    let path = path.as_ref();
    let raw = if path.exists() {
        load_from_path(path)?
    } else {
        debug!(path = %path.display(), "config file not found; using defaults");
        RawConfigFile::default()
    };
    HarnessConfig::try_from(raw)
}

/// `DfuHarness.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("DfuHarness.toml")
}
