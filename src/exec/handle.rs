// src/exec/handle.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Direct access to a launched process.
///
/// Signals go straight to the OS by PID. Once the process has been reaped the
/// handle refuses to deliver anything, so a recycled PID is never hit.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pid: Option<u32>,
    reaped: Arc<AtomicBool>,
}

impl ProcessHandle {
    pub(crate) fn new(pid: Option<u32>) -> Self {
        Self {
            pid,
            reaped: Arc::new(AtomicBool::new(pid.is_none())),
        }
    }

    /// A handle for a process that never started.
    pub(crate) fn none() -> Self {
        Self::new(None)
    }

    pub(crate) fn mark_reaped(&self) {
        self.reaped.store(true, Ordering::SeqCst);
    }

    /// OS process id, `None` if the process could not be spawned.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the process is still around (not yet waited for).
    pub fn is_running(&self) -> bool {
        !self.reaped.load(Ordering::SeqCst)
    }

    /// Deliver `signal` to the process.
    #[cfg(unix)]
    pub fn signal(&self, signal: nix::sys::signal::Signal) -> std::io::Result<()> {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let pid = match self.pid {
            Some(pid) if self.is_running() => pid,
            _ => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "process is not running",
                ));
            }
        };
        let raw = i32::try_from(pid)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        kill(Pid::from_raw(raw), signal).map_err(std::io::Error::from)
    }

    /// Send `SIGKILL`.
    #[cfg(unix)]
    pub fn kill(&self) -> std::io::Result<()> {
        self.signal(nix::sys::signal::Signal::SIGKILL)
    }
}
