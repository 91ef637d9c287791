//! Result handling.
//!
//! The host's I/O broker calls [`WorkerSubsystem::handle_worker_readable`]
//! whenever a worker socket has bytes. One call drains whatever arrived:
//! it tops up the worker's read cache with a single read, then peels off
//! complete frames one at a time, reuniting each with its job slot.
//!
//! EOF on the socket is how worker death is detected; the dead worker's
//! in-flight jobs are the only thing we ever retry, and they are retried
//! exactly once, through the normal dispatcher.

use std::os::unix::io::RawFd;

use log::{error, info, warn};

use wproc_core::job::{Job, JobKind, JobPayload};
use wproc_core::kvvec::MSG_DELIM;
use wproc_core::result::{Completion, WorkerResult};

use crate::fd::FdReader;
use crate::handle::{CompleteOutcome, WorkerKey};
use crate::subsystem::WorkerSubsystem;

impl WorkerSubsystem {
    /// Readiness callback for a worker control socket.
    ///
    /// Read errors are transient: logged, socket kept. EOF removes the
    /// worker. Everything else is frame processing.
    pub fn handle_worker_readable(&mut self, fd: RawFd) {
        let Some(key) = self.key_by_fd(fd) else {
            // Stale event for a socket we already dropped.
            return;
        };

        let filled = match self.worker_mut(key) {
            Some(wp) => wp.ioc.fill(&mut FdReader(fd)),
            None => return,
        };
        match filled {
            Err(e) => {
                let name = self.worker_name(key);
                warn!("read from worker {} failed: {}", name, e);
            }
            Ok(0) => self.worker_died(key),
            Ok(_) => self.drain_worker(key),
        }
    }

    fn worker_name(&self, key: WorkerKey) -> String {
        self.worker(key)
            .map(|wp| wp.source_name.clone())
            .unwrap_or_else(|| "(unknown)".into())
    }

    /// Process every complete frame sitting in the worker's read cache.
    fn drain_worker(&mut self, key: WorkerKey) {
        let name = self.worker_name(key);
        // The frame buffer is subsystem-owned and reused; taking it out
        // keeps the borrow checker out of the loop body.
        let mut msg = std::mem::take(&mut self.msg_scratch);

        loop {
            let extracted = match self.worker_mut(key) {
                Some(wp) => wp.ioc.use_delim(MSG_DELIM, &mut msg),
                None => false,
            };
            if !extracted {
                break;
            }

            // Log messages are handled first.
            if let Some(text) = msg.strip_prefix(b"log=") {
                let text = trim_nuls(text);
                info!("wproc: {}: {}", name, String::from_utf8_lossy(text));
                continue;
            }

            let res = WorkerResult::from_frame(&msg);
            let outcome = match self.worker_mut(key) {
                Some(wp) => wp.complete_job(res.job_id, res.kind),
                None => break,
            };
            match outcome {
                CompleteOutcome::Missing => {
                    warn!(
                        "Worker job with id '{}' doesn't exist on worker {}",
                        res.job_id, name
                    );
                    continue;
                }
                CompleteOutcome::KindMismatch(kind) => {
                    // The stream is desynced; stop here and leave the
                    // remaining bytes buffered for the next event.
                    warn!(
                        "Worker {} claims job {} is type {}, but we think it's type {}",
                        name,
                        res.job_id,
                        res.kind,
                        kind.as_wire()
                    );
                    break;
                }
                CompleteOutcome::Job(job) => self.finish_job(&name, job, &res),
            }
        }

        self.msg_scratch = msg;
    }

    /// Run the type-specific completion hook for a released job.
    fn finish_job(&mut self, source: &str, job: Job, res: &WorkerResult<'_>) {
        let Job {
            kind,
            payload,
            command,
            ..
        } = job;
        let runtime = res.runtime.as_secs_f64();

        match (kind, payload) {
            (JobKind::Check, JobPayload::Check(mut cr)) => {
                if let Completion::SpawnFailed { errno } = res.completion() {
                    warn!(
                        "Worker {} could not run check '{}': {} (error {})",
                        source,
                        command,
                        res.error_msg
                            .map(|m| String::from_utf8_lossy(m).into_owned())
                            .unwrap_or_else(|| "no error message".into()),
                        errno
                    );
                }
                cr.rusage = res.rusage;
                cr.start_time = res.start;
                cr.finish_time = res.stop;
                cr.return_code = res.check_return_code();
                cr.output = pick_output(res);
                cr.early_timeout = res.early_timeout;
                cr.exited_ok = res.exited_ok;
                cr.source = Some(source.to_owned());
                self.sink.process_check_result(cr);
            }
            (JobKind::Notify, JobPayload::Object(oj)) => {
                if res.early_timeout {
                    let contact = oj.contact_name.as_deref().unwrap_or("");
                    match oj.service_description.as_deref() {
                        Some(sdesc) => warn!(
                            "Warning: Notifying contact '{}' of service '{}' on host '{}' by command '{}' timed out after {:.2} seconds",
                            contact, sdesc, oj.host_name, command, runtime
                        ),
                        None => warn!(
                            "Warning: Notifying contact '{}' of host '{}' by command '{}' timed out after {:.2} seconds",
                            contact, oj.host_name, command, runtime
                        ),
                    }
                }
            }
            (JobKind::Ocsp, JobPayload::Object(oj)) => {
                if res.early_timeout {
                    warn!(
                        "Warning: OCSP command '{}' for service '{}' on host '{}' timed out after {:.2} seconds",
                        command,
                        oj.service_description.as_deref().unwrap_or(""),
                        oj.host_name,
                        runtime
                    );
                }
            }
            (JobKind::Ochp, JobPayload::Object(oj)) => {
                if res.early_timeout {
                    warn!(
                        "Warning: OCHP command '{}' for host '{}' timed out after {:.2} seconds",
                        command, oj.host_name, runtime
                    );
                }
            }
            (JobKind::GlobalSvcEvtHandler, _) => {
                if res.early_timeout {
                    warn!(
                        "Warning: Global service event handler command '{}' timed out after {:.2} seconds",
                        command, runtime
                    );
                }
            }
            (JobKind::SvcEvtHandler, _) => {
                if res.early_timeout {
                    warn!(
                        "Warning: Service event handler command '{}' timed out after {:.2} seconds",
                        command, runtime
                    );
                }
            }
            (JobKind::GlobalHostEvtHandler, _) => {
                if res.early_timeout {
                    warn!(
                        "Warning: Global host event handler command '{}' timed out after {:.2} seconds",
                        command, runtime
                    );
                }
            }
            (JobKind::HostEvtHandler, _) => {
                if res.early_timeout {
                    warn!(
                        "Warning: Host event handler command '{}' timed out after {:.2} seconds",
                        command, runtime
                    );
                }
            }
            (kind, _) => {
                warn!(
                    "Worker {}: job '{}' of type {:?} carried the wrong payload",
                    source, command, kind
                );
            }
        }
    }

    /// EOF: take the worker out of service and move its in-flight jobs.
    fn worker_died(&mut self, key: WorkerKey) {
        let name = self.worker_name(key);
        info!("Socket to worker {} broken, removing", name);

        let Some(mut wp) = self.remove_handle(key) else {
            return;
        };
        self.broker.unregister(wp.raw_fd());
        self.specialized.remove_worker(key);
        self.global.remove(key);
        if self.global.is_empty() {
            // There aren't global workers left; nothing can run checks
            // until new ones register.
            error!("All our workers are dead, we can't do anything!");
        }

        // The only retry path: every in-flight job goes back through the
        // dispatcher, once, before the handle is released.
        for job in wp.drain_jobs() {
            if let Err(e) = self.submit(job) {
                warn!("failed to resubmit job from dead worker {}: {}", name, e);
            }
        }
        self.release_worker(wp);
    }
}

fn pick_output(res: &WorkerResult<'_>) -> Option<String> {
    match res.outstd {
        Some(out) if !out.is_empty() => Some(String::from_utf8_lossy(out).into_owned()),
        _ => res
            .outerr
            .map(|err| format!("(No output on stdout) stderr: {}", String::from_utf8_lossy(err))),
    }
}

fn trim_nuls(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|&b| b != 0)
        .map(|p| p + 1)
        .unwrap_or(0);
    &bytes[..end]
}
