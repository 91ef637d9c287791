//! Error types shared across the dispatch core.

use std::fmt;

/// Result type for dispatch-core operations.
pub type WprocResult<T> = Result<T, WprocError>;

/// Errors surfaced by the dispatch core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WprocError {
    /// No global workers and no specialized pool matches the command.
    NoWorkers,

    /// The selected worker's job table is full. Dispatch is
    /// single-attempt; the caller is expected to reschedule.
    JobTableFull,

    /// The pool cannot shrink at runtime.
    ShrinkUnsupported,

    /// Spawning a worker child failed (errno).
    SpawnFailed(i32),

    /// The I/O broker refused to take a worker socket (errno-style code).
    BrokerRegister(i32),
}

impl fmt::Display for WprocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WprocError::NoWorkers => write!(f, "no workers available"),
            WprocError::JobTableFull => write!(f, "worker job table full"),
            WprocError::ShrinkUnsupported => write!(f, "worker pool cannot shrink"),
            WprocError::SpawnFailed(e) => write!(f, "failed to spawn worker: errno {}", e),
            WprocError::BrokerRegister(e) => {
                write!(f, "failed to register socket with io broker: {}", e)
            }
        }
    }
}

impl std::error::Error for WprocError {}
