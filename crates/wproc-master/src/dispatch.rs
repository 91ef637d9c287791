//! Job submission.
//!
//! Each entry point builds a typed job, picks a worker, stores the job
//! in a slot, and ships one framed message. Worker selection is
//! single-attempt: when the chosen worker's table is full the submission
//! fails and the caller reschedules — we do not go fishing for a less
//! busy worker.

use std::time::{SystemTime, UNIX_EPOCH};

use log::{info, warn};

use wproc_core::error::{WprocError, WprocResult};
use wproc_core::job::{CheckResult, Job, JobKind, JobPayload, ObjectJob};
use wproc_core::kvvec::KvVec;

use crate::fd::write_all;
use crate::handle::WorkerKey;
use crate::subsystem::WorkerSubsystem;

impl WorkerSubsystem {
    /// Pick a worker for `command`: the specialized pool for its first
    /// token if one exists, the global pool otherwise.
    fn get_worker_key(&mut self, command: &str) -> Option<WorkerKey> {
        let cmd_name = command.split(' ').next().unwrap_or(command);
        let pool = match self.specialized.lookup(cmd_name) {
            Some(pool) => {
                info!("Found specialized worker(s) for '{}'", cmd_name);
                pool
            }
            None => {
                if self.global.is_empty() {
                    return None;
                }
                &mut self.global
            }
        };
        pool.next()
    }

    /// Ship a fully built job to a worker. This is the common tail of
    /// every entry point and the resubmission path after a worker death.
    ///
    /// Hosts that need environment propagation build the [`Job`]
    /// themselves and call this directly.
    pub fn submit(&mut self, job: Job) -> WprocResult<()> {
        let Some(key) = self.get_worker_key(&job.command) else {
            return Err(WprocError::NoWorkers);
        };
        let Some(wp) = self.worker_mut(key) else {
            return Err(WprocError::NoWorkers);
        };

        let (id, job) = wp.put_job(job).map_err(|_| WprocError::JobTableFull)?;

        // job_id, type, command and timeout
        let mut kvv = KvVec::with_capacity(4 + job.env.len());
        kvv.add("job_id", id.to_string());
        kvv.add("type", job.kind.as_wire().to_string());
        kvv.add("command", job.command.as_str());
        kvv.add("timeout", job.timeout.to_string());
        for env in &job.env {
            kvv.add("env", env.as_str());
        }
        let buf = kvv.encode_framed();

        let fd = wp.raw_fd();
        if let Err(errno) = write_all(fd, &buf) {
            // Fire-and-forget: the job stays in its slot and the EOF
            // path recovers it if the worker is actually gone.
            warn!(
                "failed to ship job {} to worker {}: errno {}",
                id, wp.source_name, errno
            );
        }
        wp.note_job_started();
        Ok(())
    }

    /// Run an active check. The timeout is the service-check timeout
    /// when the result names a service, the host-check timeout
    /// otherwise. The result structure comes back through the
    /// check-result sink once the worker reports.
    pub fn run_check(&mut self, cr: CheckResult, command: &str) -> WprocResult<()> {
        let timeout = if cr.service_description.is_some() {
            self.cfg.service_check_timeout
        } else {
            self.cfg.host_check_timeout
        };
        self.submit(Job::new(
            JobKind::Check,
            JobPayload::Check(cr),
            timeout,
            command,
        ))
    }

    /// Run a service-scoped job (event handler, OCSP, ...).
    pub fn run_service_job(
        &mut self,
        kind: JobKind,
        timeout: u64,
        host_name: &str,
        service_description: &str,
        command: &str,
    ) -> WprocResult<()> {
        let oj = ObjectJob {
            contact_name: None,
            host_name: host_name.to_owned(),
            service_description: Some(service_description.to_owned()),
        };
        self.submit(Job::new(kind, JobPayload::Object(oj), timeout, command))
    }

    /// Run a host-scoped job (event handler, OCHP, ...).
    pub fn run_host_job(
        &mut self,
        kind: JobKind,
        timeout: u64,
        host_name: &str,
        command: &str,
    ) -> WprocResult<()> {
        let oj = ObjectJob {
            contact_name: None,
            host_name: host_name.to_owned(),
            service_description: None,
        };
        self.submit(Job::new(kind, JobPayload::Object(oj), timeout, command))
    }

    /// Send a notification to a contact.
    pub fn notify(
        &mut self,
        contact_name: &str,
        host_name: &str,
        service_description: Option<&str>,
        command: &str,
    ) -> WprocResult<()> {
        let oj = ObjectJob {
            contact_name: Some(contact_name.to_owned()),
            host_name: host_name.to_owned(),
            service_description: service_description.map(str::to_owned),
        };
        let timeout = self.cfg.notification_timeout;
        self.submit(Job::new(
            JobKind::Notify,
            JobPayload::Object(oj),
            timeout,
            command,
        ))
    }

    /// Run an arbitrary command with no payload. `relative_timeout` is
    /// turned into an absolute epoch deadline before it goes on the
    /// wire.
    pub fn run(&mut self, kind: JobKind, command: &str, relative_timeout: u64) -> WprocResult<()> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.submit(Job::new(
            kind,
            JobPayload::None,
            now + relative_timeout,
            command,
        ))
    }
}
