// src/exec/execution.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::watch;

use crate::errors::ExecError;
use crate::exec::handle::ProcessHandle;
use crate::exec::stream::{StreamBuffer, Subscription};

pub(crate) type Completion = Option<Result<i32, ExecError>>;

/// Final state of a finished execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// One launched process and everything it has produced so far.
///
/// The accumulators fill up while the process runs, regardless of whether
/// anyone subscribed. The completion resolves once, after the process exited
/// and both streams reached end of file.
#[derive(Debug)]
pub struct Execution {
    program: PathBuf,
    stdout: Arc<StreamBuffer>,
    stderr: Arc<StreamBuffer>,
    completion: watch::Receiver<Completion>,
    handle: ProcessHandle,
}

impl Execution {
    pub(crate) fn new(
        program: PathBuf,
        stdout: Arc<StreamBuffer>,
        stderr: Arc<StreamBuffer>,
        completion: watch::Receiver<Completion>,
        handle: ProcessHandle,
    ) -> Self {
        Self {
            program,
            stdout,
            stderr,
            completion,
            handle,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Standard output received so far.
    pub fn stdout(&self) -> String {
        self.stdout.text()
    }

    /// Standard error received so far.
    pub fn stderr(&self) -> String {
        self.stderr.text()
    }

    /// Get notified of every stdout chunk from now on.
    pub fn on_stdout<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.stdout.subscribe(Box::new(callback))
    }

    /// Get notified of every stderr chunk from now on.
    pub fn on_stderr<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.stderr.subscribe(Box::new(callback))
    }

    /// Replay stdout received so far, then keep streaming it.
    pub fn follow_stdout<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.stdout.follow(Box::new(callback))
    }

    /// Replay stderr received so far, then keep streaming it.
    pub fn follow_stderr<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.stderr.follow(Box::new(callback))
    }

    pub fn handle(&self) -> &ProcessHandle {
        &self.handle
    }

    /// The completion, if it has resolved already.
    pub fn try_exit_code(&self) -> Option<Result<i32, ExecError>> {
        self.completion.borrow().clone()
    }

    /// Wait for the process to finish.
    ///
    /// Can be awaited any number of times; every call observes the same
    /// outcome.
    pub async fn exit_code(&self) -> Result<i32, ExecError> {
        let mut rx = self.completion.clone();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| {
            Err(ExecError::Wait(format!(
                "completion for {:?} was dropped",
                self.program
            )))
        })
    }

    /// Wait for the process to finish and snapshot its output.
    pub async fn wait_output(&self) -> Result<Output, ExecError> {
        let exit_code = self.exit_code().await?;
        Ok(Output {
            exit_code,
            stdout: self.stdout(),
            stderr: self.stderr(),
        })
    }
}
