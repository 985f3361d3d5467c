//! Thin façade over intra-process or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! Posting a send or receive never blocks; every handle is **waitable**, and
//! [`Wait::wait`] is the only place a caller suspends. Ghost exchange posts
//! everything first, computes what it can, then waits.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

/// Message tag used to keep independent exchanges apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CommTag(pub u16);

impl CommTag {
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }

    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Derive a tag `off` positions after this one.
    #[inline]
    pub const fn offset(self, off: u16) -> Self {
        Self(self.0.wrapping_add(off))
    }
}

/// Default tags for the exchanges this crate performs.
pub mod tags {
    use super::CommTag;

    pub const MATRIX_GHOST: CommTag = CommTag::new(0x5100);
    pub const VECTOR_GHOST: CommTag = CommTag::new(0x5200);
    pub const MIGRATE: CommTag = CommTag::new(0x5300);
    pub const GRID_ASSEMBLE: CommTag = CommTag::new(0x5400);
}

/// Non-blocking communication interface (minimal by design).
pub trait Communicator: Send + Sync {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    /// This process's rank.
    fn rank(&self) -> usize;
    /// Number of ranks in the communicator.
    fn size(&self) -> usize;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Post a receive of `len` bytes.
    fn irecv(&self, peer: usize, tag: u16, len: usize) -> Self::RecvHandle;

    /// Block until every rank reaches the barrier.
    fn barrier(&self) {}
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Single-rank communicator; any message to a peer is a logic error and
/// yields an empty receive.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _len: usize) {}
}

// --- LocalComm: several ranks inside one process (one thread per rank) ---

type Key = (usize, usize, u16); // (src, dst, tag)

#[derive(Default)]
struct Mailbox {
    queues: DashMap<Key, VecDeque<Bytes>>,
    arrived: Mutex<u64>,
    signal: Condvar,
}

#[derive(Default)]
struct BarrierState {
    count: Mutex<(usize, u64)>,
    signal: Condvar,
}

/// In-process communicator: every rank of a world shares one mailbox.
///
/// Messages between a `(src, dst, tag)` triple are delivered in FIFO order.
/// Worlds are isolated from each other, so concurrent tests never collide.
#[derive(Clone)]
pub struct LocalComm {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
    barrier: Arc<BarrierState>,
}

impl std::fmt::Debug for LocalComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl LocalComm {
    /// Create one communicator per rank of a fresh world.
    pub fn world(size: usize) -> Vec<LocalComm> {
        let mailbox = Arc::new(Mailbox::default());
        let barrier = Arc::new(BarrierState::default());
        (0..size)
            .map(|rank| LocalComm {
                rank,
                size,
                mailbox: mailbox.clone(),
                barrier: barrier.clone(),
            })
            .collect()
    }
}

/// Pending receive on a [`LocalComm`].
pub struct LocalRecvHandle {
    mailbox: Arc<Mailbox>,
    key: Key,
    len: usize,
}

impl Wait for LocalRecvHandle {
    fn wait(self) -> Option<Vec<u8>> {
        loop {
            // Snapshot the arrival counter before looking, so a message that
            // lands between the lookup and the wait still wakes us.
            let seen = *self.mailbox.arrived.lock();
            if let Some(mut q) = self.mailbox.queues.get_mut(&self.key) {
                if let Some(bytes) = q.pop_front() {
                    let n = self.len.min(bytes.len());
                    return Some(bytes[..n].to_vec());
                }
            }
            let mut arrived = self.mailbox.arrived.lock();
            if *arrived == seen {
                self.mailbox.signal.wait(&mut arrived);
            }
        }
    }
}

impl Communicator for LocalComm {
    type SendHandle = ();
    type RecvHandle = LocalRecvHandle;

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
        let key = (self.rank, peer, tag);
        self.mailbox
            .queues
            .entry(key)
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
        let mut arrived = self.mailbox.arrived.lock();
        *arrived = arrived.wrapping_add(1);
        self.mailbox.signal.notify_all();
    }

    fn irecv(&self, peer: usize, tag: u16, len: usize) -> LocalRecvHandle {
        LocalRecvHandle {
            mailbox: self.mailbox.clone(),
            key: (peer, self.rank, tag),
            len,
        }
    }

    fn barrier(&self) {
        let mut state = self.barrier.count.lock();
        let generation = state.1;
        state.0 += 1;
        if state.0 == self.size {
            state.0 = 0;
            state.1 = state.1.wrapping_add(1);
            self.barrier.signal.notify_all();
        } else {
            while state.1 == generation {
                self.barrier.signal.wait(&mut state);
            }
        }
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::environment::Universe;
    use mpi::request::StaticScope;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;

    /// rsmpi-backed communicator over `MPI_COMM_WORLD`.
    pub struct MpiComm {
        _universe: Arc<Universe>,
        world: SimpleCommunicator,
        rank: usize,
        size: usize,
    }

    // MPI is initialized with thread support sufficient for the handles to
    // be used from the rank's owning thread only.
    unsafe impl Send for MpiComm {}
    unsafe impl Sync for MpiComm {}

    impl MpiComm {
        /// Initialize MPI; returns `None` if it was already initialized.
        pub fn new() -> Option<Self> {
            let universe = mpi::initialize()?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Some(Self {
                _universe: Arc::new(universe),
                world,
                rank,
                size,
            })
        }
    }

    /// In-flight send; owns its buffer until completion.
    pub struct MpiSendHandle {
        request: Option<mpi::request::Request<'static, [u8], StaticScope>>,
        buf: *mut [u8],
    }

    // The raw buffer is only touched again after the request completes.
    unsafe impl Send for MpiSendHandle {}
    unsafe impl Send for MpiRecvHandle {}

    impl Wait for MpiSendHandle {
        fn wait(mut self) -> Option<Vec<u8>> {
            if let Some(req) = self.request.take() {
                req.wait();
            }
            // SAFETY: `buf` came from `Box::into_raw` in `isend` and the
            // request that borrowed it has completed.
            unsafe { drop(Box::from_raw(self.buf)) };
            None
        }
    }

    /// Receive posted lazily: matched when waited on.
    pub struct MpiRecvHandle {
        world: SimpleCommunicator,
        peer: i32,
        tag: i32,
        len: usize,
    }

    impl Wait for MpiRecvHandle {
        fn wait(self) -> Option<Vec<u8>> {
            let (mut data, _status) = self
                .world
                .process_at_rank(self.peer)
                .receive_vec_with_tag::<u8>(self.tag);
            data.truncate(self.len);
            Some(data)
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiSendHandle;
        type RecvHandle = MpiRecvHandle;

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiSendHandle {
            let raw: *mut [u8] = Box::into_raw(buf.to_vec().into_boxed_slice());
            // SAFETY: the allocation stays alive until `MpiSendHandle::wait`.
            let stat: &'static [u8] = unsafe { &*raw };
            let request = self.world.process_at_rank(peer as i32).immediate_send_with_tag(
                StaticScope,
                stat,
                tag as i32,
            );
            MpiSendHandle {
                request: Some(request),
                buf: raw,
            }
        }

        fn irecv(&self, peer: usize, tag: u16, len: usize) -> MpiRecvHandle {
            MpiRecvHandle {
                world: self.world.duplicate(),
                peer: peer as i32,
                tag: tag as i32,
                len,
            }
        }

        fn barrier(&self) {
            self.world.barrier();
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
