//! Worker-spawning abstraction.
//!
//! Forking a worker and wiring up its control socket is the host's
//! business (it owns the fork point, the socketpair, and whatever the
//! child execs into). The dispatch core only needs the result: a pid and
//! the master side of the control socket.
//!
//! **Contract:**
//! - The returned socket is a connected stream socket; the worker speaks
//!   the job protocol on the other end.
//! - `init` (when given) runs in the child immediately after the fork,
//!   before the worker loop — its job is to drop memory inherited from
//!   the master that the worker must not touch.
//! - Spawning must not block the master beyond the fork itself.

use std::io;
use std::os::unix::io::OwnedFd;

/// Runs in the child right after the fork.
pub type WorkerInitFn = fn();

/// A freshly spawned worker child.
#[derive(Debug)]
pub struct SpawnedWorker {
    pub pid: libc::pid_t,
    /// Master side of the control socket. Ownership moves into the
    /// worker handle; dropping the handle closes it.
    pub sd: OwnedFd,
}

pub trait WorkerSpawner {
    fn spawn_worker(&mut self, init: Option<WorkerInitFn>) -> io::Result<SpawnedWorker>;
}
