// src/tool.rs

//! The tool under test, as seen from the harness.
//!
//! Everything here treats `dfu-programmer` as a black box: argv in, exit code
//! and streams out.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::config::HarnessConfig;
use crate::exec::{Execution, Output, ProcessRunner};
use crate::lock::ResourceLock;

/// Exit code of a command that needed a device and found none.
pub const NO_DEVICE_EXIT_CODE: i32 = 3;

static USAGE_BANNER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^dfu-programmer").expect("usage banner regex is valid")
});

static NO_DEVICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\A(?P<tool>[^\n:]+): no device present\.\n\z").expect("no-device regex is valid")
});

/// Runs the configured binary.
#[derive(Debug, Clone)]
pub struct DfuTool {
    path: PathBuf,
    target: String,
    runner: ProcessRunner,
}

impl DfuTool {
    pub fn new(path: impl Into<PathBuf>, target: impl Into<String>, runner: ProcessRunner) -> Self {
        Self {
            path: path.into(),
            target: target.into(),
            runner,
        }
    }

    pub fn from_config(cfg: &HarnessConfig) -> Self {
        Self::new(
            cfg.tool_path.clone(),
            cfg.target.clone(),
            ProcessRunner::with_missing_dependencies(cfg.missing_dependencies.clone()),
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Run the binary with `args` as given.
    pub fn run<S: AsRef<str>>(&self, args: &[S]) -> Execution {
        self.runner
            .run(&self.path, args.iter().map(|a| a.as_ref().to_string()))
    }

    /// Run the binary with the configured target in front of `args`.
    pub fn run_targeted<S: AsRef<str>>(&self, args: &[S]) -> Execution {
        let argv = std::iter::once(self.target.clone())
            .chain(args.iter().map(|a| a.as_ref().to_string()));
        self.runner.run(&self.path, argv)
    }
}

/// The lock guarding the configured device.
pub fn device_lock(cfg: &HarnessConfig) -> ResourceLock {
    ResourceLock::for_domain(&cfg.lock_domain).with_poll_interval(cfg.poll_interval)
}

/// Result of a command that talks to the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceOutcome {
    /// Exit 0 and nothing on either stream.
    DevicePresent,
    /// Exit 3 and exactly `"<tool>: no device present.\n"` on stderr.
    NoDevice { tool: String },
    /// Anything else.
    Unexpected,
}

/// Tell a clean run apart from "no device" without conflating the two.
pub fn classify_device_outcome(output: &Output) -> DeviceOutcome {
    if output.exit_code == 0 && output.stdout.is_empty() && output.stderr.is_empty() {
        return DeviceOutcome::DevicePresent;
    }

    if output.exit_code == NO_DEVICE_EXIT_CODE && output.stdout.is_empty() {
        if let Some(caps) = NO_DEVICE.captures(&output.stderr) {
            return DeviceOutcome::NoDevice {
                tool: caps["tool"].to_string(),
            };
        }
    }

    DeviceOutcome::Unexpected
}

/// Whether `stderr` starts with the tool's name/version banner.
pub fn is_usage_banner(stderr: &str) -> bool {
    USAGE_BANNER.is_match(stderr)
}
