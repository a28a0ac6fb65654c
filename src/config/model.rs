// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::exec::{MissingDependency, MissingDependencyTable};
use crate::lock::LockDomain;

/// Target used when neither the file nor `TARGET` names one.
pub const DEFAULT_TARGET: &str = "atmega8u2";

/// Tool location relative to the working directory, used when neither the
/// file nor `DFU` names one.
pub const DEFAULT_TOOL_PATH: &str = "src/dfu-programmer";

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Configuration as read from `DfuHarness.toml`.
///
/// ```toml
/// [tool]
/// path = "/usr/local/bin/dfu-programmer"
/// target = "atmega8u2"
///
/// [lock]
/// domain = "dfu-programmer-test"
/// poll_interval_ms = 1000
///
/// [[missing_dependency]]
/// code = 3221225781
/// message = "DLL_NOT_FOUND. libusb1.dll is probably missing."
/// ```
///
/// Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub tool: ToolSection,

    #[serde(default)]
    pub lock: LockSection,

    /// `None` means "use the platform default table".
    #[serde(default)]
    pub missing_dependency: Option<Vec<MissingDependency>>,
}

/// `[tool]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolSection {
    /// Path to the binary under test. Overridden by `DFU`.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Target identifier prepended by targeted runs. Overridden by `TARGET`.
    #[serde(default)]
    pub target: Option<String>,
}

/// `[lock]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LockSection {
    #[serde(default = "default_domain")]
    pub domain: String,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_domain() -> String {
    crate::lock::DEFAULT_DOMAIN.to_string()
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

impl Default for LockSection {
    fn default() -> Self {
        Self {
            domain: default_domain(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Environment overrides, read once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    /// `DFU`
    pub tool_path: Option<PathBuf>,
    /// `TARGET`
    pub target: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            tool_path: std::env::var_os("DFU")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            target: std::env::var("TARGET").ok().filter(|v| !v.is_empty()),
        }
    }
}

/// Validated harness configuration.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Absolute path to the binary under test.
    pub tool_path: PathBuf,
    pub target: String,
    pub lock_domain: LockDomain,
    pub poll_interval: Duration,
    pub missing_dependencies: MissingDependencyTable,
}
