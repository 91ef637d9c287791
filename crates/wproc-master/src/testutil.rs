//! Shared mocks for the subsystem tests: a recording broker, a
//! socketpair-backed spawner, a collecting sink, and a recording query
//! registry. Everything hangs off one `MockCollab` so tests can inspect
//! what the subsystem did to its collaborators.

use std::cell::RefCell;
use std::collections::HashSet;
use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::rc::Rc;
use std::time::Duration;

use wproc_core::broker::IoBroker;
use wproc_core::job::CheckResult;
use wproc_core::kvvec::MSG_DELIM;
use wproc_core::registry::QueryRegistry;
use wproc_core::sink::CheckResultSink;
use wproc_core::spawn::{SpawnedWorker, WorkerInitFn, WorkerSpawner};

use crate::handle::WorkerKey;
use crate::subsystem::{WorkerSubsystem, WorkersConfig};

pub struct BrokerState {
    pub registered: HashSet<RawFd>,
    pub max_fds: usize,
    pub fail_register: bool,
}

#[derive(Clone)]
pub struct MockBroker(pub Rc<RefCell<BrokerState>>);

impl IoBroker for MockBroker {
    fn register(&mut self, fd: RawFd) -> Result<(), i32> {
        let mut state = self.0.borrow_mut();
        if state.fail_register {
            return Err(libc::ENOSPC);
        }
        state.registered.insert(fd);
        Ok(())
    }

    fn unregister(&mut self, fd: RawFd) {
        self.0.borrow_mut().registered.remove(&fd);
    }

    fn is_registered(&self, fd: RawFd) -> bool {
        self.0.borrow().registered.contains(&fd)
    }

    fn max_usable_fds(&self) -> usize {
        self.0.borrow().max_fds
    }
}

#[derive(Default)]
pub struct SpawnerState {
    /// Worker-side ends of the spawned control sockets.
    pub peers: Vec<UnixStream>,
    pub children: Vec<std::process::Child>,
    pub real_children: bool,
    pub fail: bool,
}

impl Drop for SpawnerState {
    fn drop(&mut self) {
        for child in &mut self.children {
            let _ = child.kill();
        }
    }
}

#[derive(Clone)]
pub struct MockSpawner(pub Rc<RefCell<SpawnerState>>);

impl WorkerSpawner for MockSpawner {
    fn spawn_worker(&mut self, _init: Option<WorkerInitFn>) -> io::Result<SpawnedWorker> {
        let mut state = self.0.borrow_mut();
        if state.fail {
            return Err(io::Error::from_raw_os_error(libc::EAGAIN));
        }
        let (master, peer) = UnixStream::pair()?;
        master.set_nonblocking(true)?;

        let pid = if state.real_children {
            let child = std::process::Command::new("sleep").arg("30").spawn()?;
            let pid = child.id() as libc::pid_t;
            state.children.push(child);
            pid
        } else {
            0
        };

        state.peers.push(peer);
        Ok(SpawnedWorker {
            pid,
            sd: OwnedFd::from(master),
        })
    }
}

#[derive(Clone, Default)]
pub struct MockSink(pub Rc<RefCell<Vec<CheckResult>>>);

impl CheckResultSink for MockSink {
    fn process_check_result(&mut self, cr: CheckResult) {
        self.0.borrow_mut().push(cr);
    }
}

#[derive(Clone, Default)]
pub struct MockRegistry(pub Rc<RefCell<Vec<String>>>);

impl QueryRegistry for MockRegistry {
    fn register_handler(&mut self, name: &str) -> Result<(), i32> {
        self.0.borrow_mut().push(name.to_owned());
        Ok(())
    }
}

pub struct MockCollab {
    pub broker: Rc<RefCell<BrokerState>>,
    pub spawner: Rc<RefCell<SpawnerState>>,
    pub sink: Rc<RefCell<Vec<CheckResult>>>,
    pub endpoints: Rc<RefCell<Vec<String>>>,
}

impl MockCollab {
    pub fn new() -> Self {
        // 17 usable fds → 8 job slots per worker.
        Self::with_max_fds(17)
    }

    pub fn with_max_fds(max_fds: usize) -> Self {
        Self {
            broker: Rc::new(RefCell::new(BrokerState {
                registered: HashSet::new(),
                max_fds,
                fail_register: false,
            })),
            spawner: Rc::new(RefCell::new(SpawnerState::default())),
            sink: Rc::new(RefCell::new(Vec::new())),
            endpoints: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn with_real_children() -> Self {
        let collab = Self::new();
        collab.spawner.borrow_mut().real_children = true;
        collab
    }

    pub fn failing_spawner() -> Self {
        let collab = Self::new();
        collab.spawner.borrow_mut().fail = true;
        collab
    }

    pub fn failing_broker() -> Self {
        let collab = Self::new();
        collab.broker.borrow_mut().fail_register = true;
        collab
    }

    pub fn broker_has(&self, fd: RawFd) -> bool {
        self.broker.borrow().registered.contains(&fd)
    }

    pub fn registered_endpoints(&self) -> Vec<String> {
        self.endpoints.borrow().clone()
    }

    pub fn sink_results(&self) -> Vec<CheckResult> {
        self.sink.borrow().clone()
    }

    /// Register an external worker over a fresh socketpair and return
    /// its key plus the worker-side end for the test to speak through.
    pub fn register_worker(
        &self,
        sys: &mut WorkerSubsystem,
        body: &[u8],
    ) -> (WorkerKey, UnixStream) {
        let (master, mut peer) = UnixStream::pair().unwrap();
        master.set_nonblocking(true).unwrap();
        peer.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let fd = master.as_raw_fd();

        let mut req = b"register ".to_vec();
        req.extend_from_slice(body);
        sys.handle_query(OwnedFd::from(master), &req).unwrap();

        let mut ack = [0u8; 3];
        peer.read_exact(&mut ack).unwrap();
        assert_eq!(&ack, b"OK\0");

        (sys.key_by_fd(fd).unwrap(), peer)
    }
}

pub fn new_subsystem(collab: &MockCollab) -> WorkerSubsystem {
    let _ = env_logger::builder().is_test(true).try_init();
    WorkerSubsystem::new(
        WorkersConfig::default(),
        Box::new(MockBroker(collab.broker.clone())),
        Box::new(MockSpawner(collab.spawner.clone())),
        Box::new(MockSink(collab.sink.clone())),
        Box::new(MockRegistry(collab.endpoints.clone())),
    )
}

/// Write one delimited frame into the worker-side socket.
pub fn write_frame(mut peer: &UnixStream, body: &[u8]) {
    peer.write_all(body).unwrap();
    peer.write_all(MSG_DELIM).unwrap();
}

/// Drain the worker-side socket and split what the master sent into
/// frames.
pub fn read_frames(peer: &UnixStream) -> Vec<Vec<u8>> {
    peer.set_nonblocking(true).unwrap();
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    let mut reader = peer;
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => raw.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) => panic!("read from peer failed: {}", e),
        }
    }
    peer.set_nonblocking(false).unwrap();

    let mut frames = Vec::new();
    let mut rest: &[u8] = &raw;
    while let Some(pos) = rest
        .windows(MSG_DELIM.len())
        .position(|w| w == MSG_DELIM)
    {
        frames.push(rest[..pos].to_vec());
        rest = &rest[pos + MSG_DELIM.len()..];
    }
    assert!(rest.is_empty(), "trailing partial frame: {:?}", rest);
    frames
}
