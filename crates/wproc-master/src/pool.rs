//! Worker pools.
//!
//! The global pool holds every unspecialized worker. The specialized
//! registry maps a command name (first whitespace-delimited token of a
//! command line) to its own pool. Both kinds of pool hand out workers
//! round-robin via a rotating index that is never reset — it just keeps
//! counting modulo the current length, so removals shift the rotation a
//! little, which is acceptable.

use std::collections::HashMap;

use crate::handle::WorkerKey;

/// An ordered set of workers with a round-robin cursor.
#[derive(Debug, Default)]
pub struct PoolList {
    wps: Vec<WorkerKey>,
    idx: usize,
}

impl PoolList {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.wps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.wps.is_empty()
    }

    pub fn push(&mut self, key: WorkerKey) {
        self.wps.push(key);
    }

    pub fn contains(&self, key: WorkerKey) -> bool {
        self.wps.contains(&key)
    }

    pub fn keys(&self) -> impl Iterator<Item = WorkerKey> + '_ {
        self.wps.iter().copied()
    }

    /// Remove `key` if present (swap-remove; order is not significant
    /// beyond the rotation). Returns whether it was present.
    pub fn remove(&mut self, key: WorkerKey) -> bool {
        match self.wps.iter().position(|&k| k == key) {
            Some(pos) => {
                self.wps.swap_remove(pos);
                true
            }
            None => false,
        }
    }

    /// Next worker in rotation. The cursor increments without bound and
    /// wraps modulo the current length.
    pub fn next(&mut self) -> Option<WorkerKey> {
        if self.wps.is_empty() {
            return None;
        }
        let key = self.wps[self.idx % self.wps.len()];
        self.idx = self.idx.wrapping_add(1);
        Some(key)
    }
}

/// Command name → pool of workers registered for exactly that command.
#[derive(Debug)]
pub struct SpecializedRegistry {
    map: HashMap<String, PoolList>,
}

impl SpecializedRegistry {
    pub fn with_capacity(buckets: usize) -> Self {
        Self {
            map: HashMap::with_capacity(buckets),
        }
    }

    pub fn insert(&mut self, command_name: &str, key: WorkerKey) {
        self.map
            .entry(command_name.to_owned())
            .or_default()
            .push(key);
    }

    pub fn lookup(&mut self, command_name: &str) -> Option<&mut PoolList> {
        self.map.get_mut(command_name)
    }

    /// Drop `key` from every pool it appears in; pools that empty out
    /// are removed entirely.
    pub fn remove_worker(&mut self, key: WorkerKey) {
        self.map.retain(|_, pool| {
            pool.remove(key);
            !pool.is_empty()
        });
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
