// src/lock/probe.rs

//! Process liveness checks.
//!
//! The lock algorithm only needs to know whether the PID written in a lock
//! record still belongs to a running process. That question is answered by a
//! [`LivenessProbe`], so the platform-specific part stays in this file.

use std::fmt::Debug;
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Dead,
}

pub trait LivenessProbe: Send + Sync + Debug {
    /// Report whether `pid` is running.
    ///
    /// Errors other than "no such process" are returned as-is and abort the
    /// lock acquisition.
    fn probe(&self, pid: u32) -> io::Result<Liveness>;
}

/// Probe based on sending the null signal (`kill(pid, 0)`).
///
/// On non-Unix targets every PID is reported alive, so a lock is never stolen
/// from a process we cannot see.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalProbe;

impl LivenessProbe for SignalProbe {
    #[cfg(unix)]
    fn probe(&self, pid: u32) -> io::Result<Liveness> {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let raw = i32::try_from(pid).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        match kill(Pid::from_raw(raw), None) {
            Ok(()) => Ok(Liveness::Alive),
            Err(Errno::ESRCH) => Ok(Liveness::Dead),
            Err(errno) => Err(io::Error::from(errno)),
        }
    }

    #[cfg(not(unix))]
    fn probe(&self, _pid: u32) -> io::Result<Liveness> {
        Ok(Liveness::Alive)
    }
}
