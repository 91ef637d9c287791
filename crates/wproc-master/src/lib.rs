//! # wproc-master — the master side of the worker dispatch core
//!
//! A single-threaded monitoring master offloads command execution —
//! service checks, host checks, notifications, event handlers — to a
//! pool of worker processes over stream sockets. This crate is that
//! master side: worker handles with bounded job tables, the global and
//! command-specialized pools, round-robin dispatch, the streaming result
//! handler, the `wproc` registration endpoint, and pool lifecycle.
//!
//! One [`WorkerSubsystem`] owns all of it. The host wires in its I/O
//! broker, its child spawner, its query channel, and its check-result
//! pipeline through the trait seams defined in `wproc-core`, then:
//!
//! - calls [`WorkerSubsystem::init_workers`] once at startup,
//! - routes socket readiness to [`WorkerSubsystem::handle_worker_readable`],
//! - routes `wproc` queries to [`WorkerSubsystem::handle_query`],
//! - submits work through [`WorkerSubsystem::run_check`] and friends.
//!
//! Everything runs on the master thread; workers are processes, not
//! threads, and the only thing shared with them is the wire protocol.

mod dispatch;
mod fd;
pub mod handle;
pub mod pool;
pub mod query;
mod result;
pub mod subsystem;

#[cfg(test)]
pub(crate) mod testutil;

pub use handle::{CompleteOutcome, WorkerHandle, WorkerKey};
pub use pool::{PoolList, SpecializedRegistry};
pub use query::QueryError;
pub use subsystem::{target_pool_size, WorkerSubsystem, WorkersConfig, WPROC_FORCE};
