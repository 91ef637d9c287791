//! Per-worker state: the control socket, the read cache, and the
//! bounded job table.
//!
//! The job table is a fixed ring of slots addressed by a small integer
//! id. Allocation scans from a rotating hint so recently freed slots are
//! found quickly; lookup is modular. The table is the authoritative
//! owner of in-flight jobs — releasing a slot drops the job and its
//! payload.

use std::os::unix::io::{AsRawFd, OwnedFd, RawFd};

use log::warn;

use wproc_core::iocache::IoCache;
use wproc_core::job::{Job, JobKind};

/// Index of a worker handle in the subsystem arena. Pools and the fd
/// index refer to workers only through this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerKey(pub usize);

/// Outcome of matching a response frame against the job table.
#[derive(Debug)]
pub enum CompleteOutcome {
    /// The slot matched; the job has been released from the table.
    Job(Job),
    /// No such job. Also covers slot-id forgery (logged, slot kept).
    Missing,
    /// The worker claims a different job type than the slot holds. The
    /// slot is left occupied; the caller treats the stream as desynced.
    KindMismatch(JobKind),
}

pub struct WorkerHandle {
    sd: OwnedFd,
    /// 0 for workers we did not spawn (externally registered).
    pub pid: libc::pid_t,
    pub source_name: String,
    pub ioc: IoCache,
    max_jobs: u32,
    jobs: Vec<Option<Job>>,
    /// Rotating hint: where the next free-slot scan starts.
    job_index: u32,
    jobs_running: u32,
    jobs_started: u64,
}

impl WorkerHandle {
    pub fn new(
        sd: OwnedFd,
        pid: libc::pid_t,
        source_name: String,
        max_jobs: usize,
        ioc_capacity: usize,
    ) -> Self {
        let max_jobs = max_jobs.max(1);
        let mut jobs = Vec::with_capacity(max_jobs);
        jobs.resize_with(max_jobs, || None);
        Self {
            sd,
            pid,
            source_name,
            ioc: IoCache::with_capacity(ioc_capacity),
            max_jobs: max_jobs as u32,
            jobs,
            job_index: 0,
            jobs_running: 0,
            jobs_started: 0,
        }
    }

    #[inline]
    pub fn raw_fd(&self) -> RawFd {
        self.sd.as_raw_fd()
    }

    #[inline]
    pub fn max_jobs(&self) -> u32 {
        self.max_jobs
    }

    #[inline]
    pub fn jobs_running(&self) -> u32 {
        self.jobs_running
    }

    #[inline]
    pub fn jobs_started(&self) -> u64 {
        self.jobs_started
    }

    /// Locate a free slot, checking oldest slots first. Short-circuits
    /// when the table is known full.
    fn get_job_id(&mut self) -> Option<u32> {
        if self.jobs_running == self.max_jobs {
            return None;
        }
        for i in self.job_index..self.job_index + self.max_jobs {
            let slot = i % self.max_jobs;
            if self.jobs[slot as usize].is_none() {
                self.job_index = slot;
                return Some(slot);
            }
        }
        None
    }

    /// Store `job` in a free slot, assigning its id. Returns the id and
    /// a borrow of the stored job (the dispatcher serializes from it).
    /// The job is handed back untouched when the table is full.
    pub fn put_job(&mut self, mut job: Job) -> Result<(u32, &Job), Job> {
        let Some(id) = self.get_job_id() else {
            return Err(job);
        };
        job.id = id;
        let stored = self.jobs[id as usize].insert(job);
        self.jobs_running += 1;
        Ok((id, &*stored))
    }

    /// Borrow the job in slot `id`. Internal: no id verification.
    pub(crate) fn job_at(&self, id: u32) -> Option<&Job> {
        self.jobs.get((id % self.max_jobs) as usize)?.as_ref()
    }

    pub fn note_job_started(&mut self) {
        self.jobs_started += 1;
    }

    /// Match a response against the table and, on success, release the
    /// slot and hand the job out.
    ///
    /// A slot whose occupant's id differs from `job_id` is a protocol
    /// error from a lying worker: logged, treated as missing, slot kept.
    /// The wire type is decoded through [`JobKind::from_wire`]; a type
    /// that does not decode, or decodes to something other than what the
    /// slot holds, is a mismatch and likewise keeps the slot.
    pub fn complete_job(&mut self, job_id: i32, wire_kind: i32) -> CompleteOutcome {
        if job_id < 0 {
            return CompleteOutcome::Missing;
        }
        let slot = (job_id as u32 % self.max_jobs) as usize;
        let Some(job) = self.jobs[slot].take() else {
            return CompleteOutcome::Missing;
        };
        if job.id != job_id as u32 {
            warn!(
                "Worker {} reported job id {} but slot {} holds job {}",
                self.source_name, job_id, slot, job.id
            );
            self.jobs[slot] = Some(job);
            return CompleteOutcome::Missing;
        }
        if JobKind::from_wire(wire_kind) != Some(job.kind) {
            let kind = job.kind;
            self.jobs[slot] = Some(job);
            return CompleteOutcome::KindMismatch(kind);
        }
        self.jobs_running -= 1;
        CompleteOutcome::Job(job)
    }

    /// Empty the table, returning every in-flight job. Used when the
    /// worker dies and its jobs move to another worker.
    pub fn drain_jobs(&mut self) -> Vec<Job> {
        let mut out = Vec::with_capacity(self.jobs_running as usize);
        for slot in &mut self.jobs {
            if let Some(job) = slot.take() {
                out.push(job);
                // We can (often) break out early.
                if out.len() as u32 >= self.jobs_running {
                    break;
                }
            }
        }
        self.jobs_running = 0;
        out
    }

    /// Consume the handle without killing or closing anything: the
    /// socket fd is deliberately left open for whoever still owns the
    /// worker (the master after a restart, or the real master when a
    /// forked child drops its inherited copy).
    pub fn release_retained(self) {
        use std::os::unix::io::IntoRawFd;
        let _ = self.sd.into_raw_fd();
    }
}
