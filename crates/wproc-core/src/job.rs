//! Job model.
//!
//! A job is one in-flight request from the master to a worker process:
//! a command line, a timeout, and a type-dependent payload that the
//! result handler consumes on completion. Jobs live inside their
//! worker's slot table and are identified by `(worker, slot id)`; they
//! carry no back-pointer to the worker.

use crate::timeval::Timeval;

/// Plugin exit states.
pub const STATE_OK: i32 = 0;
pub const STATE_WARNING: i32 = 1;
pub const STATE_CRITICAL: i32 = 2;
pub const STATE_UNKNOWN: i32 = 3;

/// What a job does. The discriminants are the wire `type` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum JobKind {
    /// Active service/host check; completion feeds the check-result sink.
    Check = 0,
    /// Contact notification.
    Notify = 1,
    /// Obsessive-compulsive service processor command.
    Ocsp = 2,
    /// Obsessive-compulsive host processor command.
    Ochp = 3,
    GlobalSvcEvtHandler = 4,
    SvcEvtHandler = 5,
    GlobalHostEvtHandler = 6,
    HostEvtHandler = 7,
}

impl JobKind {
    #[inline]
    pub fn as_wire(self) -> i32 {
        self as i32
    }

    pub fn from_wire(v: i32) -> Option<Self> {
        Some(match v {
            0 => JobKind::Check,
            1 => JobKind::Notify,
            2 => JobKind::Ocsp,
            3 => JobKind::Ochp,
            4 => JobKind::GlobalSvcEvtHandler,
            5 => JobKind::SvcEvtHandler,
            6 => JobKind::GlobalHostEvtHandler,
            7 => JobKind::HostEvtHandler,
            _ => return None,
        })
    }
}

/// Identifies what a notification / obsessive / event-handler job was
/// about, for the timeout warnings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectJob {
    pub contact_name: Option<String>,
    pub host_name: String,
    pub service_description: Option<String>,
}

/// Resource usage as reported by the worker, field for field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RusageSnapshot {
    pub utime: Timeval,
    pub stime: Timeval,
    pub minflt: i64,
    pub majflt: i64,
    pub nswap: i64,
    pub inblock: i64,
    pub oublock: i64,
    pub nsignals: i64,
}

/// A check result, populated in place when the worker reports back and
/// then handed to the host's check-result sink.
#[derive(Debug, Clone, Default)]
pub struct CheckResult {
    pub host_name: String,
    /// `None` for host checks; its presence selects the service-check
    /// timeout at submission time.
    pub service_description: Option<String>,
    pub start_time: Timeval,
    pub finish_time: Timeval,
    pub return_code: i32,
    pub output: Option<String>,
    pub early_timeout: bool,
    pub exited_ok: bool,
    pub rusage: RusageSnapshot,
    /// Source label of the worker that ran the check.
    pub source: Option<String>,
}

/// Type-dependent job payload.
#[derive(Debug)]
pub enum JobPayload {
    Check(CheckResult),
    Object(ObjectJob),
    /// Generic `run` jobs carry nothing.
    None,
}

/// An in-flight request. `id` is assigned when the job is stored into a
/// worker slot.
#[derive(Debug)]
pub struct Job {
    pub id: u32,
    pub kind: JobKind,
    pub payload: JobPayload,
    /// Seconds for notification/event-handler jobs; absolute epoch
    /// deadline for generic `run` jobs.
    pub timeout: u64,
    pub command: String,
    /// `NAME=VALUE` entries shipped as repeated `env` keys.
    pub env: Vec<String>,
}

impl Job {
    pub fn new(kind: JobKind, payload: JobPayload, timeout: u64, command: &str) -> Self {
        Self {
            id: 0,
            kind,
            payload,
            timeout,
            command: command.to_owned(),
            env: Vec::new(),
        }
    }
}
