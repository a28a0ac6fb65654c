//! A stand-in for `dfu-programmer`.
//!
//! Writes a small POSIX shell script that answers the handful of invocations
//! the harness tests care about, and records every argv it was called with.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;

const USAGE: &str = "\
dfu-programmer 1.1.0
Usage: dfu-programmer target[:usb-bus,usb-addr] command [options] [global-options] [file|data]
";

const HELP: &str = "\
dfu-programmer 1.1.0
Usage: dfu-programmer target[:usb-bus,usb-addr] command [options] [global-options] [file|data]

global-options:
        --quiet
        --debug level    (level is an integer specifying level of detail)

command summary:
        launch   [--no-reset]
        reset

additional details:
 target: a target name from the list above
";

pub struct FakeTool {
    dir: TempDir,
    path: PathBuf,
    calls: PathBuf,
}

impl FakeTool {
    /// Fake tool that finds a device.
    pub fn with_device() -> Result<Self> {
        Self::create(true)
    }

    /// Fake tool that reports "no device present." for device commands.
    pub fn without_device() -> Result<Self> {
        Self::create(false)
    }

    fn create(device_present: bool) -> Result<Self> {
        let dir = tempfile::tempdir().context("creating fake tool dir")?;
        let path = dir.path().join("dfu-programmer");
        let calls = dir.path().join("calls.log");

        let script = format!(
            r#"#!/bin/sh
printf '%s\n' "$*" >> '{calls}'
if [ $# -eq 0 ]; then
    printf '%s' '{usage}' >&2
    exit 2
fi
case "$1" in
    --help)
        printf '%s' '{help}' >&2
        exit 0
        ;;
esac
case "$2" in
    reset|launch)
        if [ "{present}" = "1" ]; then
            exit 0
        fi
        printf 'dfu-programmer: no device present.\n' >&2
        exit 3
        ;;
    *)
        printf 'dfu-programmer: unknown command\n' >&2
        exit 2
        ;;
esac
"#,
            calls = calls.display(),
            usage = USAGE,
            help = HELP,
            present = if device_present { "1" } else { "0" },
        );

        fs::write(&path, script).context("writing fake tool")?;
        make_executable(&path)?;

        Ok(Self { dir, path, calls })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Every argv the tool was invoked with, space-joined, oldest first.
    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(&self.calls)
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("chmod {}", path.display()))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
