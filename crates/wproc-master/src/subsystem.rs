//! The worker subsystem handle.
//!
//! One `WorkerSubsystem` owns everything the dispatch core keeps between
//! calls: the arena of worker handles, the fd index, the global pool,
//! the specialized registry, scratch buffers, configuration, and the
//! boxed host collaborators. Every entry point — submission, readiness,
//! registration, lifecycle — is a method on it; there is no global
//! state.
//!
//! The master is single-threaded, so nothing here is `Sync` and nothing
//! needs locks. Workers are separate processes reached only through
//! their control sockets.

use std::collections::HashMap;
use std::os::unix::io::RawFd;

use log::{error, info};
use nix::sys::signal::{kill, Signal};
use nix::sys::socket::{setsockopt, sockopt};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{getpid, Pid};

use wproc_core::broker::IoBroker;
use wproc_core::error::{WprocError, WprocResult};
use wproc_core::registry::QueryRegistry;
use wproc_core::sink::CheckResultSink;
use wproc_core::spawn::{WorkerInitFn, WorkerSpawner};

use crate::handle::{WorkerHandle, WorkerKey};
use crate::pool::{PoolList, SpecializedRegistry};

/// Destroy even from the master (which otherwise retains workers across
/// restarts).
pub const WPROC_FORCE: u32 = 1 << 0;

/// Tunables. The defaults match the monitoring daemon this subsystem
/// serves: per-check timeouts in seconds, a 1 MiB read cache per worker,
/// a 256 KiB send buffer on spawned worker sockets.
#[derive(Debug, Clone)]
pub struct WorkersConfig {
    pub service_check_timeout: u64,
    pub host_check_timeout: u64,
    pub notification_timeout: u64,
    /// Read-cache capacity per worker.
    pub ioc_capacity: usize,
    /// SO_SNDBUF for sockets of workers we spawn.
    pub sndbuf_size: usize,
    /// Initial bucket count of the specialized registry.
    pub registry_capacity: usize,
    /// Runs in each spawned child right after the fork, to drop
    /// inherited master memory.
    pub worker_init: Option<WorkerInitFn>,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            service_check_timeout: 60,
            host_check_timeout: 30,
            notification_timeout: 30,
            ioc_capacity: 1024 * 1024,
            sndbuf_size: 256 * 1024,
            registry_capacity: 512,
            worker_init: None,
        }
    }
}

pub struct WorkerSubsystem {
    pub(crate) cfg: WorkersConfig,
    /// Pid of the process that created the subsystem. Forked children
    /// inherit a copy and must not tear down the master's workers.
    master_pid: libc::pid_t,

    pub(crate) broker: Box<dyn IoBroker>,
    spawner: Box<dyn WorkerSpawner>,
    pub(crate) sink: Box<dyn CheckResultSink>,
    registry: Box<dyn QueryRegistry>,

    arena: Vec<Option<WorkerHandle>>,
    by_fd: HashMap<RawFd, WorkerKey>,
    pub(crate) global: PoolList,
    pub(crate) specialized: SpecializedRegistry,

    /// Whether the `wproc` query endpoint has been attached yet.
    endpoint_attached: bool,
    /// Frame buffer reused across result frames.
    pub(crate) msg_scratch: Vec<u8>,
}

/// Pool size for a `desired` worker count: 0 means "scale to the cpus",
/// negative means "cpus plus that many extra".
pub fn target_pool_size(desired: i32, online_cpus: usize) -> usize {
    if desired > 0 {
        return desired as usize;
    }
    if desired == 0 {
        // min 4 workers, as it's tested and known to work
        ((online_cpus as f64 * 1.5) as usize).max(4)
    } else {
        online_cpus + (-desired) as usize
    }
}

impl WorkerSubsystem {
    pub fn new(
        cfg: WorkersConfig,
        broker: Box<dyn IoBroker>,
        spawner: Box<dyn WorkerSpawner>,
        sink: Box<dyn CheckResultSink>,
        registry: Box<dyn QueryRegistry>,
    ) -> Self {
        let registry_capacity = cfg.registry_capacity;
        Self {
            cfg,
            master_pid: getpid().as_raw(),
            broker,
            spawner,
            sink,
            registry,
            arena: Vec::new(),
            by_fd: HashMap::new(),
            global: PoolList::new(),
            specialized: SpecializedRegistry::with_capacity(registry_capacity),
            endpoint_attached: false,
            msg_scratch: Vec::new(),
        }
    }

    #[inline]
    fn is_master(&self) -> bool {
        getpid().as_raw() == self.master_pid
    }

    pub fn worker(&self, key: WorkerKey) -> Option<&WorkerHandle> {
        self.arena.get(key.0)?.as_ref()
    }

    pub(crate) fn worker_mut(&mut self, key: WorkerKey) -> Option<&mut WorkerHandle> {
        self.arena.get_mut(key.0)?.as_mut()
    }

    pub fn key_by_fd(&self, fd: RawFd) -> Option<WorkerKey> {
        self.by_fd.get(&fd).copied()
    }

    pub fn global_pool(&self) -> &PoolList {
        &self.global
    }

    /// Store a handle in the arena and index its socket.
    pub(crate) fn insert_handle(&mut self, wp: WorkerHandle) -> WorkerKey {
        let fd = wp.raw_fd();
        let key = match self.arena.iter().position(|slot| slot.is_none()) {
            Some(idx) => {
                self.arena[idx] = Some(wp);
                WorkerKey(idx)
            }
            None => {
                self.arena.push(Some(wp));
                WorkerKey(self.arena.len() - 1)
            }
        };
        self.by_fd.insert(fd, key);
        key
    }

    /// Detach a handle from the arena and the fd index. Pools are the
    /// caller's concern.
    pub(crate) fn remove_handle(&mut self, key: WorkerKey) -> Option<WorkerHandle> {
        let wp = self.arena.get_mut(key.0)?.take()?;
        self.by_fd.remove(&wp.raw_fd());
        Some(wp)
    }

    fn wproc_is_alive(&self, wp: &WorkerHandle) -> bool {
        if wp.pid == 0 {
            return false;
        }
        kill(Pid::from_raw(wp.pid), None).is_ok() && self.broker.is_registered(wp.raw_fd())
    }

    /// Count live workers in the global pool: child exists and its
    /// socket is still watched.
    pub fn workers_alive(&self) -> usize {
        self.global
            .keys()
            .filter_map(|k| self.worker(k))
            .filter(|wp| self.wproc_is_alive(wp))
            .count()
    }

    /// Grow the pool to its target size, spawning children for the
    /// missing slots. Shrinking is not supported. On the first
    /// successful call the `wproc` registration endpoint is attached.
    pub fn init_workers(&mut self, desired: i32) -> WprocResult<()> {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        let target = target_pool_size(desired, cpus);

        if self.workers_alive() == target {
            return Ok(());
        }
        // can't shrink the number of workers (yet)
        if target < self.global.len() {
            return Err(WprocError::ShrinkUnsupported);
        }

        let missing = target - self.global.len();
        for _ in 0..missing {
            let spawned = match self.spawner.spawn_worker(self.cfg.worker_init) {
                Ok(s) => s,
                Err(e) => {
                    error!("Failed to spawn worker: {}", e);
                    self.free_worker_memory(0);
                    return Err(WprocError::SpawnFailed(e.raw_os_error().unwrap_or(0)));
                }
            };
            if let Err(e) = setsockopt(&spawned.sd, sockopt::SndBuf, &self.cfg.sndbuf_size) {
                log::warn!("failed to set worker socket send buffer: {}", e);
            }

            let source_name = format!("core worker {}", spawned.pid);
            let max_jobs = self.broker.max_usable_fds().saturating_sub(1) / 2;
            let wp = WorkerHandle::new(
                spawned.sd,
                spawned.pid,
                source_name,
                max_jobs,
                self.cfg.ioc_capacity,
            );
            let fd = wp.raw_fd();
            let key = self.insert_handle(wp);
            self.global.push(key);

            if let Err(e) = self.broker.register(fd) {
                error!("Error: Failed to register worker socket with io broker: {}", e);
                return Err(WprocError::BrokerRegister(e));
            }
        }
        info!("Workers spawned: {}", self.global.len());

        if !self.endpoint_attached {
            match self.registry.register_handler("wproc") {
                Ok(()) => {
                    info!("Successfully registered wproc manager as @wproc with query handler");
                    self.endpoint_attached = true;
                }
                // Not fatal: dispatch works, externally launched workers
                // just cannot join this master.
                Err(_) => error!("Failed to register wproc manager with query handler"),
            }
        }

        Ok(())
    }

    /// Destroy one worker handle.
    ///
    /// The master retains workers through restarts: without
    /// [`WPROC_FORCE`] this is a no-op in the master process. A forked
    /// child destroys its inherited copy but never signals the worker or
    /// touches the broker — workers must never control other workers.
    pub fn destroy_worker(&mut self, key: WorkerKey, flags: u32) {
        let force = flags & WPROC_FORCE != 0;
        let is_master = self.is_master();

        if is_master && !force {
            return;
        }
        let Some(wp) = self.remove_handle(key) else {
            return;
        };
        self.global.remove(key);
        self.specialized.remove_worker(key);

        if !is_master {
            // A worker cleaning up its own inherited copy: drop the job
            // table and the cache, leave the real worker alone.
            wp.release_retained();
            return;
        }
        self.release_worker(wp);
    }

    /// Master-side release: kill the child, drop the socket from the
    /// broker, reap whatever exited.
    pub(crate) fn release_worker(&mut self, wp: WorkerHandle) {
        // Read the pid out before the handle goes away.
        let pid = wp.pid;
        let fd = wp.raw_fd();

        // kill(0, SIGKILL) equals suicide, so we avoid it.
        if pid != 0 {
            let _ = kill(Pid::from_raw(pid), Signal::SIGKILL);
        }
        self.broker.unregister(fd);
        drop(wp); // closes the socket, releases cache and jobs

        // Reap our possibly lost children.
        loop {
            match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) | Err(_) => break,
                Ok(_) => continue,
            }
        }
    }

    /// Tear down every worker (subject to the retention rule) and empty
    /// the pools. Called from both the master and forked children, so it
    /// must not blindly shut everything down.
    pub fn free_worker_memory(&mut self, flags: u32) {
        for idx in 0..self.arena.len() {
            self.destroy_worker(WorkerKey(idx), flags);
        }
        self.global = PoolList::new();
        self.specialized.clear();
    }

    /// Number of handles currently in the arena (alive or retained).
    pub fn handle_count(&self) -> usize {
        self.arena.iter().filter(|s| s.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{new_subsystem, MockCollab};

    #[test]
    fn test_target_pool_size() {
        // desired == 0: 1.5x cpus, floor, min 4.
        assert_eq!(target_pool_size(0, 4), 6);
        assert_eq!(target_pool_size(0, 1), 4);
        assert_eq!(target_pool_size(0, 2), 4);
        assert_eq!(target_pool_size(0, 16), 24);
        // desired < 0: cpus + |desired|.
        assert_eq!(target_pool_size(-2, 4), 6);
        // desired > 0 wins as-is.
        assert_eq!(target_pool_size(3, 64), 3);
    }

    #[test]
    fn test_init_spawns_to_target_and_attaches_endpoint() {
        let collab = MockCollab::with_real_children();
        let mut sys = new_subsystem(&collab);

        sys.init_workers(2).unwrap();
        assert_eq!(sys.global_pool().len(), 2);
        assert_eq!(sys.workers_alive(), 2);
        assert_eq!(collab.registered_endpoints(), vec!["wproc".to_string()]);

        // Sockets are watched by the broker.
        for key in sys.global_pool().keys().collect::<Vec<_>>() {
            let fd = sys.worker(key).unwrap().raw_fd();
            assert!(collab.broker_has(fd));
        }

        // Re-init at the same live size is a no-op.
        sys.init_workers(2).unwrap();
        assert_eq!(sys.global_pool().len(), 2);

        sys.free_worker_memory(WPROC_FORCE);
        assert_eq!(sys.handle_count(), 0);
        assert_eq!(sys.workers_alive(), 0);
    }

    #[test]
    fn test_shrink_is_refused() {
        let collab = MockCollab::with_real_children();
        let mut sys = new_subsystem(&collab);

        sys.init_workers(3).unwrap();
        assert_eq!(
            sys.init_workers(1),
            Err(wproc_core::WprocError::ShrinkUnsupported)
        );

        sys.free_worker_memory(WPROC_FORCE);
    }

    #[test]
    fn test_spawn_failure_tears_down() {
        let collab = MockCollab::failing_spawner();
        let mut sys = new_subsystem(&collab);

        let err = sys.init_workers(2).unwrap_err();
        assert!(matches!(err, wproc_core::WprocError::SpawnFailed(_)));
        assert_eq!(sys.global_pool().len(), 0);
    }

    #[test]
    fn test_master_retains_workers_without_force() {
        let collab = MockCollab::new();
        let mut sys = new_subsystem(&collab);
        let (key, _peer) = collab.register_worker(&mut sys, b"name=W1");

        sys.destroy_worker(key, 0);
        assert!(sys.worker(key).is_some(), "handle must survive");

        sys.destroy_worker(key, WPROC_FORCE);
        assert!(sys.worker(key).is_none());
    }

    #[test]
    fn test_forced_teardown_clears_pools_and_broker() {
        let collab = MockCollab::new();
        let mut sys = new_subsystem(&collab);
        let (k1, _p1) = collab.register_worker(&mut sys, b"name=W1");
        let (_k2, _p2) = collab.register_worker(&mut sys, b"name=W2\nplugin=/p/check_x");
        let fd1 = sys.worker(k1).unwrap().raw_fd();

        sys.free_worker_memory(WPROC_FORCE);
        assert_eq!(sys.handle_count(), 0);
        assert_eq!(sys.global_pool().len(), 0);
        assert!(!collab.broker_has(fd1));
    }
}
