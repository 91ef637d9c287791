//! The `wproc` query endpoint.
//!
//! Externally launched workers join the pool by connecting to the
//! host's query channel and sending `register` with a key/value body
//! (`=` within a tuple, `\n` between tuples). A worker that names one or
//! more `plugin`s becomes specialized — it only ever sees commands whose
//! first token matches — and is deliberately kept out of the global
//! pool. A worker that names none is global.
//!
//! Registration hands ownership of the client socket to the dispatch
//! core: from here on it is a worker control socket like any other.

use std::fmt;
use std::os::unix::io::{AsRawFd, OwnedFd};

use log::warn;

use wproc_core::kvvec::{KvVec, KV_SEP_NL};

use crate::fd::write_all;
use crate::handle::WorkerHandle;
use crate::subsystem::WorkerSubsystem;

/// A rejected query. The socket is handed back so the query channel can
/// deliver its own numeric error reply.
#[derive(Debug)]
pub struct QueryError {
    /// 400 for an unknown verb, 500 for an internal failure.
    pub status: u16,
    pub sd: OwnedFd,
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query rejected with status {}", self.status)
    }
}

impl WorkerSubsystem {
    /// Handle one request on the `wproc` endpoint. On success the
    /// socket has been consumed (and `OK` sent on it); on failure it
    /// comes back inside the error.
    pub fn handle_query(&mut self, sd: OwnedFd, req: &[u8]) -> Result<(), QueryError> {
        let (verb, body) = match req.iter().position(|&b| b == b' ') {
            Some(sp) => (&req[..sp], &req[sp + 1..]),
            None => (req, &req[req.len()..]),
        };
        if verb == b"register" {
            self.register_worker(sd, body)
        } else {
            Err(QueryError { status: 400, sd })
        }
    }

    fn register_worker(&mut self, sd: OwnedFd, body: &[u8]) -> Result<(), QueryError> {
        let info = KvVec::decode(body, KV_SEP_NL);

        let mut source_name: Option<String> = None;
        let mut plugins: Vec<String> = Vec::new();
        for (key, value) in info.pairs() {
            match key {
                b"name" => source_name = Some(String::from_utf8_lossy(value).into_owned()),
                b"plugin" => plugins.push(String::from_utf8_lossy(value).into_owned()),
                _ => {}
            }
        }

        let fd = sd.as_raw_fd();
        // The provisional query handler owned this socket until now;
        // route readiness to the result handler instead.
        self.broker.unregister(fd);
        if let Err(e) = self.broker.register(fd) {
            warn!("failed to adopt worker socket {}: {}", fd, e);
            return Err(QueryError { status: 500, sd });
        }

        let source_name = source_name.unwrap_or_else(|| format!("worker on fd {}", fd));
        let max_jobs = self.broker.max_usable_fds().saturating_sub(1) / 2;
        let ioc_capacity = self.cfg.ioc_capacity;
        let wp = WorkerHandle::new(sd, 0, source_name, max_jobs, ioc_capacity);
        let key = self.insert_handle(wp);

        if plugins.is_empty() {
            self.global.push(key);
        } else {
            for plugin in &plugins {
                self.specialized.insert(plugin, key);
            }
        }

        if let Err(errno) = write_all(fd, b"OK\0") {
            warn!("failed to ack worker registration on fd {}: errno {}", fd, errno);
        }
        Ok(())
    }
}
