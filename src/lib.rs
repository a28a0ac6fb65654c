// src/lib.rs

//! Integration-test harness for `dfu-programmer`.
//!
//! Two building blocks:
//! - [`exec`] launches the binary, captures its streams and turns its exit
//!   status into an exit code or a structured failure;
//! - [`lock`] serializes access to the one physical device across test
//!   processes with a PID file that survives crashed holders.
//!
//! [`tool`] and [`config`] glue them to the binary under test.

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod lock;
pub mod logging;
pub mod tool;

use std::io::Write;

use anyhow::{Context, Result};
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::cli::{CliArgs, Command};
use crate::config::{HarnessConfig, load_and_validate};
use crate::lock::LockStatus;
use crate::tool::{DfuTool, device_lock};

/// High-level entry point used by `main.rs`.
///
/// Returns the exit code the harness should terminate with.
pub async fn run(args: CliArgs) -> Result<i32> {
    let cfg = load_and_validate(&args.config)
        .with_context(|| format!("loading config from '{}'", args.config))?;

    match args.command {
        Command::Run {
            targeted,
            no_lock,
            args,
        } => run_tool(&cfg, targeted, no_lock, &args).await,
        Command::LockStatus => {
            print_lock_status(&cfg).await?;
            Ok(0)
        }
    }
}

/// Run the tool once, streaming its output through, optionally under the
/// device lock.
async fn run_tool(cfg: &HarnessConfig, targeted: bool, no_lock: bool, args: &[String]) -> Result<i32> {
    let tool = DfuTool::from_config(cfg);
    info!(
        binary = %tool.path().display(),
        target = tool.target(),
        "using dfu-programmer binary"
    );

    let guard = if no_lock {
        None
    } else {
        // Ctrl-C while waiting → stop waiting.
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = cancel_tx.send(());
            }
        });

        let acquired = device_lock(cfg).acquire_with_cancel(cancel_rx).await;
        ctrl_c.abort();
        Some(acquired.context("acquiring device lock")?)
    };

    let execution = if targeted {
        tool.run_targeted(args)
    } else {
        tool.run(args)
    };

    let _stdout = execution.follow_stdout(passthrough("stdout", std::io::stdout));
    let _stderr = execution.follow_stderr(passthrough("stderr", std::io::stderr));

    let outcome = execution.exit_code().await;

    if let Some(guard) = guard {
        guard.release().await;
    }

    let code = outcome.with_context(|| format!("running '{}'", tool.path().display()))?;
    info!(exit_code = code, "tool finished");
    Ok(code)
}

/// Copy chunks onto one of our own streams. The first write error (usually
/// a closed pipe) is logged; later ones are dropped quietly.
fn passthrough<W, F>(stream: &'static str, open: F) -> impl FnMut(&str) + Send + 'static
where
    W: Write,
    F: Fn() -> W + Send + 'static,
{
    let mut reported = false;
    move |chunk| {
        let mut out = open();
        let written = out.write_all(chunk.as_bytes()).and_then(|()| out.flush());
        if let Err(e) = written {
            if !reported {
                warn!(stream, error = %e, "cannot pass tool output through");
                reported = true;
            }
        }
    }
}

async fn print_lock_status(cfg: &HarnessConfig) -> Result<()> {
    let lock = device_lock(cfg);
    let status = lock.status().await.context("reading device lock")?;

    println!("lock file: {}", lock.path().display());
    match status {
        LockStatus::Free => println!("state: free"),
        LockStatus::Held(pid) => println!("state: held by pid {pid}"),
        LockStatus::Abandoned(pid) => {
            println!("state: abandoned (pid {pid} is gone; next contender reclaims it)")
        }
        LockStatus::Corrupt => println!("state: corrupt (next contender removes it)"),
    }

    Ok(())
}
