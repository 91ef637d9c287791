//! # wproc-core — protocol and model types for the worker dispatch core
//!
//! Everything here is I/O-free and host-agnostic: the framed key/value
//! wire codec, the buffered frame reader, the job and result model, and
//! the trait seams behind which the host's I/O broker, child spawner,
//! query channel, and check-result pipeline live.
//!
//! The master-side machinery (pools, job tables, dispatch, lifecycle)
//! lives in `wproc-master` and depends on the concrete types and traits
//! defined here, never the other way around.

pub mod broker;
pub mod error;
pub mod iocache;
pub mod job;
pub mod kvvec;
pub mod registry;
pub mod result;
pub mod sink;
pub mod spawn;
pub mod timeval;

pub use broker::IoBroker;
pub use error::{WprocError, WprocResult};
pub use iocache::IoCache;
pub use job::{
    CheckResult, Job, JobKind, JobPayload, ObjectJob, RusageSnapshot, STATE_CRITICAL, STATE_OK,
    STATE_UNKNOWN, STATE_WARNING,
};
pub use kvvec::{kv_scan, KvVec, KV_SEP_NL, KV_SEP_NUL, MSG_DELIM};
pub use registry::QueryRegistry;
pub use result::{Completion, ResultKey, WorkerResult};
pub use sink::CheckResultSink;
pub use spawn::{SpawnedWorker, WorkerInitFn, WorkerSpawner};
pub use timeval::{parse_timeval, Timeval, TimevalParseError};
