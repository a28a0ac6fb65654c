// src/exec/runner.rs

//! Launching processes.

use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::errors::ExecError;
use crate::exec::execution::{Completion, Execution};
use crate::exec::exit::{MissingDependencyTable, interpret_status};
use crate::exec::handle::ProcessHandle;
use crate::exec::stream::{ChunkDecoder, StreamBuffer};

const READ_CHUNK: usize = 8 * 1024;

/// Launches executables and wires their output into an [`Execution`].
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    missing_dependencies: MissingDependencyTable,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner {
    /// Runner using the platform's default missing-dependency table.
    pub fn new() -> Self {
        Self::with_missing_dependencies(MissingDependencyTable::platform_default())
    }

    pub fn with_missing_dependencies(table: MissingDependencyTable) -> Self {
        Self {
            missing_dependencies: table,
        }
    }

    pub fn missing_dependencies(&self) -> &MissingDependencyTable {
        &self.missing_dependencies
    }

    /// Launch `program` with `args`.
    ///
    /// `program` must be an absolute path; it is executed directly, without a
    /// shell and without `PATH` lookup. Spawn failures are not returned here:
    /// they surface through [`Execution::exit_code`] as
    /// [`ExecError::LaunchFailure`].
    ///
    /// Must be called from within a Tokio runtime.
    pub fn run<I, S>(&self, program: impl AsRef<Path>, args: I) -> Execution
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let program = program.as_ref().to_path_buf();
        let stdout = StreamBuffer::new();
        let stderr = StreamBuffer::new();
        let (tx, rx) = watch::channel::<Completion>(None);

        let launch_failure = |err: io::Error| {
            warn!(program = %program.display(), error = %err, "failed to launch process");
            stdout.close();
            stderr.close();
            let _ = tx.send(Some(Err(ExecError::launch(program.clone(), &err))));
            Execution::new(
                program.clone(),
                Arc::clone(&stdout),
                Arc::clone(&stderr),
                rx.clone(),
                ProcessHandle::none(),
            )
        };

        if !program.is_absolute() {
            return launch_failure(io::Error::new(
                io::ErrorKind::InvalidInput,
                "executable path must be absolute",
            ));
        }

        let mut cmd = Command::new(&program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => return launch_failure(err),
        };

        let handle = ProcessHandle::new(child.id());
        debug!(program = %program.display(), pid = ?handle.pid(), "process started");

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let table = self.missing_dependencies.clone();
        let task_handle = handle.clone();
        let task_stdout = Arc::clone(&stdout);
        let task_stderr = Arc::clone(&stderr);
        let task_program = program.clone();

        tokio::spawn(async move {
            let waiter = async {
                let status = child.wait().await;
                task_handle.mark_reaped();
                status
            };

            let (status, (), ()) = tokio::join!(
                waiter,
                pump(stdout_pipe, task_stdout, "stdout"),
                pump(stderr_pipe, task_stderr, "stderr"),
            );

            let outcome = match status {
                Ok(status) => interpret_status(status, &table),
                Err(err) => Err(ExecError::Wait(err.to_string())),
            };

            match &outcome {
                Ok(code) => debug!(
                    program = %task_program.display(),
                    exit_code = code,
                    "process exited"
                ),
                Err(err) => debug!(
                    program = %task_program.display(),
                    error = %err,
                    "process failed"
                ),
            }

            // Nobody listening any more is fine.
            let _ = tx.send(Some(outcome));
        });

        Execution::new(program, stdout, stderr, rx, handle)
    }
}

/// Launch `program` with the default runner.
pub fn run<I, S>(program: impl AsRef<Path>, args: I) -> Execution
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    ProcessRunner::new().run(program, args)
}

/// Copy one child pipe into its stream buffer until end of file.
async fn pump<R>(pipe: Option<R>, buffer: Arc<StreamBuffer>, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    if let Some(mut pipe) = pipe {
        let mut decoder = ChunkDecoder::new();
        let mut chunk = vec![0u8; READ_CHUNK];

        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => buffer.push(&decoder.decode(&chunk[..n])),
                Err(err) => {
                    warn!(stream, error = %err, "reading child output failed");
                    break;
                }
            }
        }

        buffer.push(&decoder.finish());
    }

    buffer.close();
}
