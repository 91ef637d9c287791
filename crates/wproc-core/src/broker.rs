//! I/O broker abstraction.
//!
//! The master is single-threaded and readiness-driven: one external
//! file-descriptor multiplexer (epoll, poll, whatever the host runs)
//! owns the wait. The dispatch core only tells it which sockets to
//! watch; the host routes "fd is readable" events back into the
//! subsystem's result handler.
//!
//! **Contract:**
//! - `register()` starts watching `fd` for readability. Readiness events
//!   for a registered worker socket must be delivered to the dispatch
//!   subsystem's `handle_worker_readable`.
//! - `unregister()` stops watching. It must be safe to call for an fd
//!   that is not registered.
//! - `is_registered()` reflects the current watch set; worker liveness
//!   checks depend on it.
//! - `max_usable_fds()` is the descriptor budget the broker can carry;
//!   per-worker job tables are sized from it.

use std::os::unix::io::RawFd;

pub trait IoBroker {
    /// Watch `fd` for readability. Errors are errno-style codes.
    fn register(&mut self, fd: RawFd) -> Result<(), i32>;

    /// Stop watching `fd`.
    fn unregister(&mut self, fd: RawFd);

    /// Whether `fd` is currently in the watch set.
    fn is_registered(&self, fd: RawFd) -> bool;

    /// Upper bound on descriptors the broker can service.
    fn max_usable_fds(&self) -> usize;
}
