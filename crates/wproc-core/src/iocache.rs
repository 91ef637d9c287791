//! Buffered read-side cache for a worker socket.
//!
//! Frames from a worker arrive in arbitrary chunks; the cache accumulates
//! raw bytes and hands out complete delimited messages as they become
//! available. Storage is a single fixed-capacity allocation — the cache
//! never grows, matching the bounded 1 MiB budget each worker gets at
//! registration time.
//!
//! The cache itself does no I/O beyond one `read` per [`fill`] call; the
//! caller decides when the socket is readable.
//!
//! [`fill`]: IoCache::fill

use std::io::{self, Read};

pub struct IoCache {
    buf: Box<[u8]>,
    /// First unconsumed byte.
    begin: usize,
    /// One past the last buffered byte.
    end: usize,
}

impl IoCache {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: vec![0u8; cap].into_boxed_slice(),
            begin: 0,
            end: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes buffered and not yet consumed.
    #[inline]
    pub fn available(&self) -> usize {
        self.end - self.begin
    }

    /// Move unconsumed bytes to the front so the tail is free for reads.
    fn compact(&mut self) {
        if self.begin == 0 {
            return;
        }
        self.buf.copy_within(self.begin..self.end, 0);
        self.end -= self.begin;
        self.begin = 0;
    }

    /// Read once from `r` into the free tail of the cache.
    ///
    /// Returns the number of bytes read; `Ok(0)` means EOF. A full cache
    /// (a frame larger than the capacity) reports `InvalidData` so the
    /// caller can treat it as a transient error rather than EOF.
    pub fn fill(&mut self, r: &mut impl Read) -> io::Result<usize> {
        self.compact();
        if self.end == self.buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "read cache full without a complete message",
            ));
        }
        let n = r.read(&mut self.buf[self.end..])?;
        self.end += n;
        Ok(n)
    }

    /// Extract the next `delim`-terminated message into `out`.
    ///
    /// `out` is cleared first and reused across calls; the message and
    /// its delimiter are consumed from the cache. Returns `false` when no
    /// complete message is buffered.
    pub fn use_delim(&mut self, delim: &[u8], out: &mut Vec<u8>) -> bool {
        debug_assert!(!delim.is_empty());
        let data = &self.buf[self.begin..self.end];
        let Some(pos) = find(data, delim) else {
            return false;
        };
        out.clear();
        out.extend_from_slice(&data[..pos]);
        self.begin += pos + delim.len();
        true
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kvvec::MSG_DELIM;

    #[test]
    fn test_fill_then_extract() {
        let mut ioc = IoCache::with_capacity(64);
        let mut src: &[u8] = b"job_id=1\0\x01\x00\x00\x01job_id=2\0\x01\x00\x00\x01";
        let n = ioc.fill(&mut src).unwrap();
        assert_eq!(n, 26);

        let mut msg = Vec::new();
        assert!(ioc.use_delim(MSG_DELIM, &mut msg));
        assert_eq!(msg, b"job_id=1\0");
        assert!(ioc.use_delim(MSG_DELIM, &mut msg));
        assert_eq!(msg, b"job_id=2\0");
        assert!(!ioc.use_delim(MSG_DELIM, &mut msg));
        assert_eq!(ioc.available(), 0);
    }

    #[test]
    fn test_partial_frame_stays_buffered() {
        let mut ioc = IoCache::with_capacity(64);
        let mut src: &[u8] = b"job_id=7\0\x01\x00";
        ioc.fill(&mut src).unwrap();

        let mut msg = Vec::new();
        assert!(!ioc.use_delim(MSG_DELIM, &mut msg));
        assert_eq!(ioc.available(), 11);

        // The rest of the delimiter arrives later.
        let mut src: &[u8] = b"\x00\x01";
        ioc.fill(&mut src).unwrap();
        assert!(ioc.use_delim(MSG_DELIM, &mut msg));
        assert_eq!(msg, b"job_id=7\0");
    }

    #[test]
    fn test_compaction_reclaims_consumed_space() {
        let mut ioc = IoCache::with_capacity(16);
        let mut msg = Vec::new();

        for _ in 0..10 {
            let mut src: &[u8] = b"a=1\0\x01\x00\x00\x01";
            ioc.fill(&mut src).unwrap();
            assert!(ioc.use_delim(MSG_DELIM, &mut msg));
            assert_eq!(msg, b"a=1\0");
        }
    }

    #[test]
    fn test_full_cache_is_an_error_not_eof() {
        let mut ioc = IoCache::with_capacity(8);
        let mut src: &[u8] = b"12345678";
        ioc.fill(&mut src).unwrap();

        let mut more: &[u8] = b"rest";
        let err = ioc.fill(&mut more).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_eof_reports_zero() {
        let mut ioc = IoCache::with_capacity(8);
        let mut src: &[u8] = b"";
        assert_eq!(ioc.fill(&mut src).unwrap(), 0);
    }
}
