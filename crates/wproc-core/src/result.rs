//! Worker result frames.
//!
//! Each response from a worker is one delimited frame of `key=value`
//! pairs. [`WorkerResult`] reduces such a frame into a record without
//! copying: string fields borrow from the frame buffer, which the caller
//! keeps alive (and reuses) across frames.
//!
//! Key dispatch is a static `match` over the short ASCII identifiers —
//! O(1), no per-message allocation. Unrecognized keys are logged at
//! warning level and skipped so that newer workers can talk to older
//! masters.

use log::warn;

use crate::job::{RusageSnapshot, STATE_UNKNOWN};
use crate::kvvec::{kv_scan, KV_SEP_NUL};
use crate::timeval::{parse_timeval, Timeval};

/// Recognized response keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKey {
    JobId,
    Type,
    Command,
    Timeout,
    WaitStatus,
    Start,
    Stop,
    Outstd,
    Outerr,
    Runtime,
    RuUtime,
    RuStime,
    RuMinflt,
    RuMajflt,
    RuNswap,
    RuInblock,
    RuOublock,
    RuNsignals,
    ExitedOk,
    ErrorMsg,
    ErrorCode,
}

impl ResultKey {
    pub fn from_key(key: &[u8]) -> Option<Self> {
        Some(match key {
            b"job_id" => ResultKey::JobId,
            b"type" => ResultKey::Type,
            b"command" => ResultKey::Command,
            b"timeout" => ResultKey::Timeout,
            b"wait_status" => ResultKey::WaitStatus,
            b"start" => ResultKey::Start,
            b"stop" => ResultKey::Stop,
            b"outstd" => ResultKey::Outstd,
            b"outerr" => ResultKey::Outerr,
            b"runtime" => ResultKey::Runtime,
            b"ru_utime" => ResultKey::RuUtime,
            b"ru_stime" => ResultKey::RuStime,
            b"ru_minflt" => ResultKey::RuMinflt,
            b"ru_majflt" => ResultKey::RuMajflt,
            b"ru_nswap" => ResultKey::RuNswap,
            b"ru_inblock" => ResultKey::RuInblock,
            b"ru_oublock" => ResultKey::RuOublock,
            b"ru_nsignals" => ResultKey::RuNsignals,
            b"exited_ok" => ResultKey::ExitedOk,
            b"error_msg" => ResultKey::ErrorMsg,
            b"error_code" => ResultKey::ErrorCode,
            _ => return None,
        })
    }
}

/// How the job actually ended, derived from the raw wire fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The command exited; carries the exit status.
    Exited(i32),
    /// The command died on a signal.
    Signal(i32),
    /// The worker aborted the command at its deadline.
    Timeout,
    /// The worker could not run the command at all.
    SpawnFailed { errno: i32 },
}

/// One reduced response frame. Borrowed fields point into the frame
/// buffer and are only valid while it is.
#[derive(Debug)]
pub struct WorkerResult<'a> {
    /// -1 when the worker did not send one.
    pub job_id: i32,
    /// Wire job type; -1 when absent.
    pub kind: i32,
    pub command: Option<&'a [u8]>,
    pub timeout: u64,
    pub wait_status: i32,
    pub start: Timeval,
    pub stop: Timeval,
    /// Present on the wire but ignored; stays zero.
    pub runtime: Timeval,
    pub outstd: Option<&'a [u8]>,
    pub outerr: Option<&'a [u8]>,
    pub error_msg: Option<&'a [u8]>,
    pub error_code: i32,
    pub exited_ok: bool,
    pub early_timeout: bool,
    pub rusage: RusageSnapshot,
}

impl<'a> Default for WorkerResult<'a> {
    fn default() -> Self {
        Self {
            job_id: -1,
            kind: -1,
            command: None,
            timeout: 0,
            wait_status: 0,
            start: Timeval::ZERO,
            stop: Timeval::ZERO,
            runtime: Timeval::ZERO,
            outstd: None,
            outerr: None,
            error_msg: None,
            error_code: 0,
            exited_ok: false,
            early_timeout: false,
            rusage: RusageSnapshot::default(),
        }
    }
}

impl<'a> WorkerResult<'a> {
    /// Reduce one `\0`-separated frame. Never fails: unknown keys warn,
    /// unparseable numbers fall back to zero, and correlation problems
    /// are left to the caller (absent `job_id` stays -1).
    pub fn from_frame(buf: &'a [u8]) -> Self {
        let mut res = WorkerResult::default();
        for (key, value) in kv_scan(buf, KV_SEP_NUL) {
            match ResultKey::from_key(key) {
                Some(k) => res.apply(k, value),
                None => warn!(
                    "wproc: unrecognized worker result variable: {}={}",
                    String::from_utf8_lossy(key),
                    String::from_utf8_lossy(value)
                ),
            }
        }
        // The legacy timeout signal: workers report ETIME for "the
        // program ran past its deadline".
        if res.error_code == libc::ETIME {
            res.early_timeout = true;
        }
        res
    }

    fn apply(&mut self, key: ResultKey, value: &'a [u8]) {
        match key {
            ResultKey::JobId => self.job_id = atoi(value) as i32,
            ResultKey::Type => self.kind = atoi(value) as i32,
            ResultKey::Command => self.command = Some(value),
            ResultKey::Timeout => self.timeout = atoi(value).max(0) as u64,
            ResultKey::WaitStatus => self.wait_status = atoi(value) as i32,
            ResultKey::Start => self.start = parse_timeval(value).unwrap_or_default(),
            ResultKey::Stop => self.stop = parse_timeval(value).unwrap_or_default(),
            ResultKey::Outstd => self.outstd = Some(value),
            ResultKey::Outerr => self.outerr = Some(value),
            ResultKey::Runtime => {}
            ResultKey::RuUtime => self.rusage.utime = parse_timeval(value).unwrap_or_default(),
            ResultKey::RuStime => self.rusage.stime = parse_timeval(value).unwrap_or_default(),
            ResultKey::RuMinflt => self.rusage.minflt = atoi(value),
            ResultKey::RuMajflt => self.rusage.majflt = atoi(value),
            ResultKey::RuNswap => self.rusage.nswap = atoi(value),
            ResultKey::RuInblock => self.rusage.inblock = atoi(value),
            ResultKey::RuOublock => self.rusage.oublock = atoi(value),
            ResultKey::RuNsignals => self.rusage.nsignals = atoi(value),
            ResultKey::ExitedOk => self.exited_ok = atoi(value) != 0,
            ResultKey::ErrorMsg => {
                self.exited_ok = false;
                self.error_msg = Some(value);
            }
            ResultKey::ErrorCode => {
                self.exited_ok = false;
                self.error_code = atoi(value) as i32;
            }
        }
    }

    /// Exit status for a check, derived the way `waitpid` status words
    /// are meant to be read.
    pub fn check_return_code(&self) -> i32 {
        if libc::WIFEXITED(self.wait_status) {
            libc::WEXITSTATUS(self.wait_status)
        } else {
            STATE_UNKNOWN
        }
    }

    pub fn completion(&self) -> Completion {
        if self.early_timeout {
            Completion::Timeout
        } else if self.error_code != 0 || self.error_msg.is_some() {
            Completion::SpawnFailed {
                errno: self.error_code,
            }
        } else if libc::WIFEXITED(self.wait_status) {
            Completion::Exited(libc::WEXITSTATUS(self.wait_status))
        } else if libc::WIFSIGNALED(self.wait_status) {
            Completion::Signal(libc::WTERMSIG(self.wait_status))
        } else {
            Completion::Exited(STATE_UNKNOWN)
        }
    }
}

/// `atoi`-style integer scan: optional sign, leading digits, junk
/// ignored, overflow saturated, garbage parses to 0. Workers print these
/// fields with printf and we stay exactly as lenient as their reader.
fn atoi(s: &[u8]) -> i64 {
    let (neg, digits) = match s.split_first() {
        Some((b'-', rest)) => (true, rest),
        _ => (false, s),
    };
    let mut val: i64 = 0;
    for &b in digits.iter().take_while(|b| b.is_ascii_digit()) {
        val = val.saturating_mul(10).saturating_add((b - b'0') as i64);
    }
    if neg {
        -val
    } else {
        val
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobKind;

    #[test]
    fn test_reduce_check_frame() {
        let buf = b"job_id=3\0type=0\0wait_status=0\0start=1000.0\0stop=1000.5\0outstd=OK\0exited_ok=1\0";
        let res = WorkerResult::from_frame(buf);

        assert_eq!(res.job_id, 3);
        assert_eq!(res.kind, JobKind::Check.as_wire());
        assert_eq!(res.start, Timeval::new(1000, 0));
        assert_eq!(res.stop, Timeval::new(1000, 500_000));
        assert_eq!(res.outstd, Some(&b"OK"[..]));
        assert!(res.exited_ok);
        assert!(!res.early_timeout);
        assert_eq!(res.check_return_code(), 0);
        assert_eq!(res.completion(), Completion::Exited(0));
    }

    #[test]
    fn test_etime_means_early_timeout() {
        let buf = b"job_id=7\0type=1\0error_code=62\0";
        let res = WorkerResult::from_frame(buf);

        assert_eq!(res.job_id, 7);
        assert!(res.early_timeout);
        assert!(!res.exited_ok);
        assert_eq!(res.completion(), Completion::Timeout);
    }

    #[test]
    fn test_error_msg_forces_not_exited_ok() {
        let buf = b"job_id=1\0type=0\0exited_ok=1\0error_msg=fork: out of pids\0";
        let res = WorkerResult::from_frame(buf);

        assert!(!res.exited_ok);
        assert_eq!(res.error_msg, Some(&b"fork: out of pids"[..]));
        assert!(matches!(res.completion(), Completion::SpawnFailed { errno: 0 }));
    }

    #[test]
    fn test_nonzero_exit_and_signal_status() {
        // Exit status 2 → wait status 0x0200.
        let res = WorkerResult::from_frame(b"job_id=0\0type=0\0wait_status=512\0");
        assert_eq!(res.check_return_code(), 2);
        assert_eq!(res.completion(), Completion::Exited(2));

        // Killed by SIGKILL → wait status 9.
        let res = WorkerResult::from_frame(b"job_id=0\0type=0\0wait_status=9\0");
        assert_eq!(res.check_return_code(), STATE_UNKNOWN);
        assert_eq!(res.completion(), Completion::Signal(9));
    }

    #[test]
    fn test_unknown_keys_are_skipped() {
        let res = WorkerResult::from_frame(b"job_id=4\0type=0\0fancy_new_key=1\0");
        assert_eq!(res.job_id, 4);
    }

    #[test]
    fn test_missing_correlators_default_negative() {
        let res = WorkerResult::from_frame(b"outstd=hi\0");
        assert_eq!(res.job_id, -1);
        assert_eq!(res.kind, -1);
    }

    #[test]
    fn test_rusage_fields() {
        let buf = b"job_id=0\0type=0\0ru_utime=0.5\0ru_stime=0,25\0ru_minflt=12\0ru_majflt=1\0ru_nsignals=0\0";
        let res = WorkerResult::from_frame(buf);
        assert_eq!(res.rusage.utime, Timeval::new(0, 500_000));
        assert_eq!(res.rusage.stime, Timeval::new(0, 250_000));
        assert_eq!(res.rusage.minflt, 12);
        assert_eq!(res.rusage.majflt, 1);
    }

    #[test]
    fn test_atoi_is_lenient() {
        assert_eq!(atoi(b"42"), 42);
        assert_eq!(atoi(b"-7"), -7);
        assert_eq!(atoi(b"12abc"), 12);
        assert_eq!(atoi(b"abc"), 0);
        assert_eq!(atoi(b""), 0);
    }
}
