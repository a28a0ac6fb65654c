// src/lock/record.rs

//! Lock record contents and the per-attempt decision.
//!
//! This part is pure: it knows nothing about files or timing, which keeps the
//! acquisition loop in [`super::resource_lock`] small.

/// What a contender found at the record path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    /// No record.
    Free,
    /// Held by a live process.
    Held(u32),
    /// The recorded holder is gone.
    Abandoned(u32),
    /// The record does not contain a PID.
    Corrupt,
}

/// What the acquisition loop does next after a failed exclusive create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Try to create the record again right away.
    RetryNow,
    /// Delete the record, then retry right away.
    RemoveAndRetry,
    /// Delete the stale record, then wait one poll interval.
    RemoveStaleAndWait,
    /// Wait one poll interval.
    Wait,
}

/// Record body for a holder.
pub fn format_record(pid: u32) -> String {
    pid.to_string()
}

/// Parse a record body into a holder PID.
///
/// Only a positive decimal number (surrounding whitespace allowed) is a valid
/// holder. PID 0 and negative numbers address process groups and are treated
/// as corrupt.
pub fn parse_record(body: &str) -> Option<u32> {
    body.trim()
        .parse::<i32>()
        .ok()
        .filter(|pid| *pid > 0)
        .and_then(|pid| u32::try_from(pid).ok())
}

/// Decide the next step for `status`.
///
/// Stale records are only removed on the first attempt of a wait loop.
/// Later attempts leave them alone, another contender may be busy replacing
/// the record.
pub fn next_action(status: LockStatus, first_attempt: bool) -> Action {
    match status {
        LockStatus::Free => Action::RetryNow,
        LockStatus::Corrupt => Action::RemoveAndRetry,
        LockStatus::Held(_) => Action::Wait,
        LockStatus::Abandoned(_) if first_attempt => Action::RemoveStaleAndWait,
        LockStatus::Abandoned(_) => Action::Wait,
    }
}
