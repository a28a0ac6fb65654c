// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `dfu-harness`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dfu-harness",
    version,
    about = "Run dfu-programmer with exclusive access to the test device.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `DfuHarness.toml` in the current working directory. A missing
    /// file is fine; `DFU` and `TARGET` still apply.
    #[arg(long, value_name = "PATH", default_value = "DfuHarness.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DFU_HARNESS_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the tool while holding the device lock; exits with the tool's code.
    Run {
        /// Put the configured target in front of the arguments.
        #[arg(long)]
        targeted: bool,

        /// Do not take the device lock.
        #[arg(long)]
        no_lock: bool,

        /// Arguments passed to the tool verbatim.
        #[arg(last = true, value_name = "ARGS")]
        args: Vec<String>,
    },

    /// Show who holds the device lock.
    LockStatus,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_passes_trailing_args_verbatim() {
        let args = CliArgs::try_parse_from([
            "dfu-harness",
            "run",
            "--targeted",
            "--",
            "flash",
            "--force",
            "app.hex",
        ])
        .unwrap();

        match args.command {
            Command::Run {
                targeted,
                no_lock,
                args,
            } => {
                assert!(targeted);
                assert!(!no_lock);
                assert_eq!(args, vec!["flash", "--force", "app.hex"]);
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn lock_status_parses() {
        let args = CliArgs::try_parse_from(["dfu-harness", "--log-level", "debug", "lock-status"])
            .unwrap();
        assert!(matches!(args.command, Command::LockStatus));
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    }
}
