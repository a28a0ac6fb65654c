// src/lock/mod.rs

//! Cross-process resource locking.
//!
//! One PID file per [`LockDomain`] serializes access to a device that several
//! test processes want to talk to. The file is created with `create_new`,
//! which is the only atomic step; everything else (corruption, stale holders)
//! is resolved by deleting the record and racing for the create again.

pub mod domain;
pub mod probe;
pub mod record;
pub mod resource_lock;

pub use domain::{DEFAULT_DOMAIN, LockDomain};
pub use probe::{Liveness, LivenessProbe, SignalProbe};
pub use record::LockStatus;
pub use resource_lock::{DEFAULT_POLL_INTERVAL, LockGuard, ResourceLock};
