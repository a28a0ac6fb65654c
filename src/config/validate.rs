// src/config/validate.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::model::{
    DEFAULT_TARGET, DEFAULT_TOOL_PATH, EnvOverrides, HarnessConfig, RawConfigFile,
};
use crate::errors::{HarnessError, Result};
use crate::exec::MissingDependencyTable;
use crate::lock::LockDomain;

impl HarnessConfig {
    /// Apply environment overrides and defaults, then validate.
    ///
    /// Relative tool paths are resolved against `cwd`.
    pub fn resolve(raw: RawConfigFile, env: &EnvOverrides, cwd: &Path) -> Result<Self> {
        validate_raw_config(&raw)?;

        let tool_path = env
            .tool_path
            .clone()
            .or(raw.tool.path)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TOOL_PATH));
        let tool_path = if tool_path.is_absolute() {
            tool_path
        } else {
            cwd.join(tool_path)
        };

        let target = env
            .target
            .clone()
            .or(raw.tool.target)
            .unwrap_or_else(|| DEFAULT_TARGET.to_string());
        if target.trim().is_empty() {
            return Err(HarnessError::ConfigError(
                "[tool].target must not be empty".to_string(),
            ));
        }

        let missing_dependencies = match raw.missing_dependency {
            Some(entries) => MissingDependencyTable::new(entries),
            None => MissingDependencyTable::platform_default(),
        };

        Ok(HarnessConfig {
            tool_path,
            target,
            lock_domain: LockDomain::new(raw.lock.domain)?,
            poll_interval: Duration::from_millis(raw.lock.poll_interval_ms),
            missing_dependencies,
        })
    }
}

impl TryFrom<RawConfigFile> for HarnessConfig {
    type Error = HarnessError;

    /// Resolve against the real environment and working directory.
    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let cwd = std::env::current_dir()?;
        HarnessConfig::resolve(raw, &EnvOverrides::from_env(), &cwd)
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.lock.poll_interval_ms == 0 {
        return Err(HarnessError::ConfigError(
            "[lock].poll_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }

    if let Some(entries) = &cfg.missing_dependency {
        for entry in entries {
            if entry.message.trim().is_empty() {
                return Err(HarnessError::ConfigError(format!(
                    "[[missing_dependency]] code {:#x} has an empty message",
                    entry.code
                )));
            }
        }
    }

    Ok(())
}
