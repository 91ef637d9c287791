//! Key/value wire vector.
//!
//! The master and its workers exchange *messages*: flat runs of
//! `key=value` pairs glued together by a single-byte pair separator and
//! closed by the multi-byte frame delimiter [`MSG_DELIM`]. The job
//! protocol uses `\0` as the pair separator; registration bodies arrive
//! over the query channel with `\n` instead. Keys are short ASCII
//! identifiers; values may be any bytes free of the pair separator and
//! the delimiter.
//!
//! `KvVec` is the owned, build-side representation. The receive path
//! never builds one: it walks the raw frame with [`kv_scan`], which
//! yields borrowed slices and allocates nothing.

/// Frame delimiter on the worker control socket. Chosen to never occur
/// inside `key=value` text.
pub const MSG_DELIM: &[u8] = b"\x01\x00\x00\x01";

/// Pair separator on the worker control socket.
pub const KV_SEP_NUL: u8 = 0;

/// Pair separator in registration bodies.
pub const KV_SEP_NL: u8 = b'\n';

/// An owned vector of key/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KvVec {
    pairs: Vec<(Vec<u8>, Vec<u8>)>,
}

impl KvVec {
    pub fn new() -> Self {
        Self { pairs: Vec::new() }
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            pairs: Vec::with_capacity(n),
        }
    }

    /// Append a pair. Keys may repeat; order is preserved.
    pub fn add(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.pairs.push((key.into(), value.into()));
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&[u8], &[u8])> + '_ {
        self.pairs.iter().map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    /// Serialize as `key=value<sep>` runs. Every pair is followed by the
    /// separator, including the last one.
    pub fn encode(&self, pair_sep: u8) -> Vec<u8> {
        let cap: usize = self
            .pairs
            .iter()
            .map(|(k, v)| k.len() + v.len() + 2)
            .sum();
        let mut buf = Vec::with_capacity(cap);
        for (k, v) in &self.pairs {
            buf.extend_from_slice(k);
            buf.push(b'=');
            buf.extend_from_slice(v);
            buf.push(pair_sep);
        }
        buf
    }

    /// Serialize as a complete job-protocol frame: `\0`-separated pairs
    /// plus the trailing [`MSG_DELIM`].
    pub fn encode_framed(&self) -> Vec<u8> {
        let mut buf = self.encode(KV_SEP_NUL);
        buf.extend_from_slice(MSG_DELIM);
        buf
    }

    /// Parse a buffer into an owned vector. Inverse of [`encode`] for
    /// values free of the separator bytes.
    ///
    /// [`encode`]: KvVec::encode
    pub fn decode(buf: &[u8], pair_sep: u8) -> KvVec {
        let mut kvv = KvVec::new();
        for (k, v) in kv_scan(buf, pair_sep) {
            kvv.add(k, v);
        }
        kvv
    }
}

/// Zero-allocation scan over the `key=value` pairs of a raw buffer.
///
/// Empty segments are skipped (the encoder leaves one after the final
/// separator). A segment without `=` yields the whole segment as key and
/// an empty value.
pub fn kv_scan<'a>(buf: &'a [u8], pair_sep: u8) -> impl Iterator<Item = (&'a [u8], &'a [u8])> + 'a {
    buf.split(move |&b| b == pair_sep)
        .filter(|seg| !seg.is_empty())
        .map(|seg| match seg.iter().position(|&b| b == b'=') {
            Some(eq) => (&seg[..eq], &seg[eq + 1..]),
            None => (seg, &seg[seg.len()..]),
        })
}
