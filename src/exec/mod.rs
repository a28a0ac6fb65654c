// src/exec/mod.rs

//! Process execution layer.
//!
//! Launches an executable with `tokio::process::Command`, captures stdout and
//! stderr into accumulators and resolves a single completion with the exit
//! code or a structured failure.
//!
//! - [`runner`] spawns the process and drives its pipes.
//! - [`execution`] is the caller-facing result of a launch.
//! - [`stream`] holds the per-stream accumulator, subscriber list and the
//!   incremental UTF-8 decoder.
//! - [`exit`] maps OS exit statuses to exit codes or errors, including the
//!   missing-dependency table.
//! - [`handle`] gives direct access to the running process.

pub mod execution;
pub mod exit;
pub mod handle;
pub mod runner;
pub mod stream;

pub use execution::{Execution, Output};
pub use exit::{MissingDependency, MissingDependencyTable};
pub use handle::ProcessHandle;
pub use runner::{ProcessRunner, run};
pub use stream::Subscription;
