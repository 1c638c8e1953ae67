//! Communication abstraction for intra-process (test) and inter-process
//! (MPI) message passing.
//!
//! Wire conventions for the node exchange protocols built on top:
//! - All integers are LE fixed width (u32 indices and counts).
//! - Payload structs are #[repr(transparent)] and bytemuck::Pod-safe.
//! - Message delivery is reliable and ordered per (sender, receiver, tag).
//!
//! Tag `0xFFF0` is reserved for the built-in allgather; protocol tags must
//! stay below it.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};

/// Anything that can be waited on.
pub trait Wait {
    /// Block until completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

/// Non-blocking completion test.
pub trait PollWait {
    /// Return `Some(bytes)` once the operation has completed (empty for
    /// sends), otherwise `None`. After `Some` the handle is spent.
    fn try_wait(&mut self) -> Option<Vec<u8>>;
}

/// Non-blocking communication interface (minimal by design).
///
/// Implementors provide asynchronous send/receive operations, waitable
/// handles, and one collective: the byte-oriented allgather used for the
/// owned-count exchange.
pub trait Communicator: Send + Sync {
    /// Handle returned by `isend`.
    type SendHandle: Wait + PollWait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait + PollWait;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    /// Rank of this process (0..size-1).
    fn rank(&self) -> usize;
    /// Total number of ranks.
    fn size(&self) -> usize;

    /// Gather `send` from every rank into `recv`, ordered by rank.
    /// `recv.len()` must equal `size() * send.len()`.
    fn allgather(&self, send: &[u8], recv: &mut [u8]);

    /// Synchronization barrier (default: no-op for serial comms).
    fn barrier(&self) {}
}

/// Tag reserved by [`Communicator::allgather`] implementations.
const TAG_ALLGATHER: u16 = 0xFFF0;

/// Tag newtype for safer tag arithmetic.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct CommTag(u16);

impl CommTag {
    /// Create a new tag from a raw `u16`.
    #[inline]
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }

    /// Return the underlying `u16` value.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Safely offset the tag by `dx`, wrapping on overflow.
    #[inline]
    pub const fn offset(self, dx: u16) -> Self {
        Self(self.0.wrapping_add(dx))
    }
}

impl From<u16> for CommTag {
    #[inline]
    fn from(x: u16) -> Self {
        CommTag::new(x)
    }
}

/// Convenience bundle of tags for the two-phase node exchange.
#[derive(Copy, Clone, Debug)]
pub struct NodeCommTags {
    /// Tag carrying encoded element positions from sharer to owner.
    pub query: CommTag,
    /// Tag carrying owner-local run ids from owner back to sharer.
    pub reply: CommTag,
}

impl NodeCommTags {
    /// Construct tags from a base, assigning deterministic offsets per phase.
    #[inline]
    pub const fn from_base(base: CommTag) -> Self {
        Self {
            query: base,
            reply: base.offset(1),
        }
    }
}

impl Default for NodeCommTags {
    fn default() -> Self {
        Self::from_base(CommTag::new(0x4E30))
    }
}

/// Compile-time no-op comm for pure serial runs and unit tests.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

impl PollWait for () {
    fn try_wait(&mut self) -> Option<Vec<u8>> {
        None
    }
}

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}

    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn allgather(&self, send: &[u8], recv: &mut [u8]) {
        debug_assert_eq!(send.len(), recv.len());
        let n = send.len().min(recv.len());
        recv[..n].copy_from_slice(&send[..n]);
    }
}

// --- ThreadComm: intra-process multi-rank comm for tests ---

type Key = (usize, usize, u16); // (src, dst, tag)

#[derive(Default)]
struct Slot {
    q: VecDeque<Vec<u8>>,
}

#[derive(Default)]
struct Mailbox {
    map: Mutex<HashMap<Key, Arc<(Mutex<Slot>, Condvar)>>>,
}

impl Mailbox {
    fn entry(&self, key: Key) -> Arc<(Mutex<Slot>, Condvar)> {
        let mut g = self.map.lock().expect("mailbox poisoned");
        g.entry(key).or_default().clone()
    }
}

struct EpochBarrier {
    state: Mutex<(usize, usize)>, // (arrived, epoch)
    cv: Condvar,
    size: usize,
}

impl EpochBarrier {
    fn wait(&self) {
        let mut g = self.state.lock().expect("barrier poisoned");
        let epoch = g.1;
        g.0 += 1;
        if g.0 == self.size {
            g.0 = 0;
            g.1 += 1;
            self.cv.notify_all();
        } else {
            while g.1 == epoch {
                g = self.cv.wait(g).expect("barrier poisoned");
            }
        }
    }
}

pub struct ThreadSendHandle;

impl Wait for ThreadSendHandle {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

impl PollWait for ThreadSendHandle {
    fn try_wait(&mut self) -> Option<Vec<u8>> {
        // Delivery into the mailbox is synchronous.
        Some(Vec::new())
    }
}

pub struct ThreadRecvHandle {
    cell: Arc<(Mutex<Slot>, Condvar)>,
    want_len: usize,
}

impl Wait for ThreadRecvHandle {
    fn wait(self) -> Option<Vec<u8>> {
        let (lock, cv) = &*self.cell;
        let mut slot = lock.lock().expect("slot poisoned");
        while slot.q.is_empty() {
            slot = cv.wait(slot).expect("slot poisoned");
        }
        let mut msg = slot.q.pop_front().expect("queue non-empty");
        msg.truncate(self.want_len.min(msg.len()));
        Some(msg)
    }
}

impl PollWait for ThreadRecvHandle {
    fn try_wait(&mut self) -> Option<Vec<u8>> {
        let (lock, _cv) = &*self.cell;
        let mut slot = lock.lock().expect("slot poisoned");
        let mut msg = slot.q.pop_front()?;
        msg.truncate(self.want_len.min(msg.len()));
        Some(msg)
    }
}

/// In-process communicator: one instance per simulated rank, all sharing a
/// mailbox of per-(src, dst, tag) FIFO queues. Obtain a full set via
/// [`ThreadComm::universe`] and move each instance onto its own thread.
#[derive(Clone)]
pub struct ThreadComm {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
    barrier: Arc<EpochBarrier>,
}

impl ThreadComm {
    /// Create `size` connected communicators, one per rank.
    pub fn universe(size: usize) -> Vec<ThreadComm> {
        assert!(size > 0, "universe needs at least one rank");
        let mailbox = Arc::new(Mailbox::default());
        let barrier = Arc::new(EpochBarrier {
            state: Mutex::new((0, 0)),
            cv: Condvar::new(),
            size,
        });
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                size,
                mailbox: Arc::clone(&mailbox),
                barrier: Arc::clone(&barrier),
            })
            .collect()
    }
}

impl Communicator for ThreadComm {
    type SendHandle = ThreadSendHandle;
    type RecvHandle = ThreadRecvHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        let entry = self.mailbox.entry((self.rank, peer, tag));
        let (lock, cv) = &*entry;
        {
            let mut slot = lock.lock().expect("slot poisoned");
            slot.q.push_back(buf.to_vec());
        }
        cv.notify_all();
        ThreadSendHandle
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle {
        ThreadRecvHandle {
            cell: self.mailbox.entry((peer, self.rank, tag)),
            want_len: buf.len(),
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn allgather(&self, send: &[u8], recv: &mut [u8]) {
        let n = send.len();
        debug_assert_eq!(recv.len(), self.size * n);
        for q in 0..self.size {
            self.isend(q, TAG_ALLGATHER, send);
        }
        for q in 0..self.size {
            let chunk = &mut recv[q * n..(q + 1) * n];
            let h = self.irecv(q, TAG_ALLGATHER, chunk);
            if let Some(data) = h.wait() {
                chunk.copy_from_slice(&data);
            }
        }
    }

    fn barrier(&self) {
        self.barrier.wait();
    }
}

// --- MPI backend ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use core::ptr::NonNull;
    use mpi::collective::CommunicatorCollectives;
    use mpi::environment::Universe;
    use mpi::point_to_point::{Destination, Source};
    use mpi::topology::{Communicator as _, SimpleCommunicator};

    pub struct MpiComm {
        _universe: Universe,
        pub world: SimpleCommunicator,
        rank: usize,
        size: usize,
    }

    unsafe impl Send for MpiComm {}
    unsafe impl Sync for MpiComm {}

    impl Default for MpiComm {
        fn default() -> Self {
            let uni = mpi::initialize().expect("MPI initialization failed");
            let world = uni.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Self {
                _universe: uni,
                world,
                rank,
                size,
            }
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiSendHandle;
        type RecvHandle = MpiRecvHandle;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
            use mpi::request::StaticScope;
            let boxed = buf.to_vec().into_boxed_slice();
            let raw: *mut [u8] = Box::into_raw(boxed);
            let slice: &[u8] = unsafe { &*raw };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_send_with_tag(StaticScope, slice, tag as i32);
            MpiSendHandle {
                req: Some(req),
                buf: Some(unsafe { NonNull::new_unchecked(raw) }),
            }
        }

        fn irecv(&self, peer: usize, tag: u16, template: &mut [u8]) -> Self::RecvHandle {
            use mpi::request::StaticScope;
            let len = template.len();
            let boxed = vec![0u8; len].into_boxed_slice();
            let raw: *mut [u8] = Box::into_raw(boxed);
            let slice_mut: &mut [u8] = unsafe { &mut *raw };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_receive_into_with_tag(StaticScope, slice_mut, tag as i32);
            MpiRecvHandle {
                req: Some(req),
                buf: Some(unsafe { NonNull::new_unchecked(raw) }),
                len,
            }
        }

        fn rank(&self) -> usize {
            self.rank
        }
        fn size(&self) -> usize {
            self.size
        }
        fn allgather(&self, send: &[u8], recv: &mut [u8]) {
            self.world.all_gather_into(send, recv);
        }
        fn barrier(&self) {
            self.world.barrier();
        }
    }

    pub struct MpiSendHandle {
        req: Option<mpi::request::Request<'static, [u8], mpi::request::StaticScope>>,
        buf: Option<NonNull<[u8]>>,
    }

    impl MpiSendHandle {
        fn release(&mut self) {
            if let Some(ptr) = self.buf.take() {
                unsafe {
                    drop(Box::from_raw(ptr.as_ptr()));
                }
            }
        }
    }

    impl Wait for MpiSendHandle {
        fn wait(mut self) -> Option<Vec<u8>> {
            if let Some(r) = self.req.take() {
                let _ = r.wait();
            }
            self.release();
            None
        }
    }

    impl PollWait for MpiSendHandle {
        fn try_wait(&mut self) -> Option<Vec<u8>> {
            let req = self.req.take()?;
            match req.test() {
                Ok(_status) => {
                    self.release();
                    Some(Vec::new())
                }
                Err(req) => {
                    self.req = Some(req);
                    None
                }
            }
        }
    }

    impl Drop for MpiSendHandle {
        fn drop(&mut self) {
            if let Some(r) = self.req.take() {
                let _ = r.wait();
            }
            self.release();
        }
    }

    pub struct MpiRecvHandle {
        req: Option<mpi::request::Request<'static, [u8], mpi::request::StaticScope>>,
        buf: Option<NonNull<[u8]>>,
        len: usize,
    }

    impl MpiRecvHandle {
        fn take_data(&mut self) -> Vec<u8> {
            let ptr = self.buf.take().expect("buffer missing");
            let boxed: Box<[u8]> = unsafe { Box::from_raw(ptr.as_ptr()) };
            let mut v = Vec::from(boxed);
            v.truncate(self.len);
            v
        }
    }

    impl Wait for MpiRecvHandle {
        fn wait(mut self) -> Option<Vec<u8>> {
            if let Some(r) = self.req.take() {
                let _ = r.wait();
            }
            Some(self.take_data())
        }
    }

    impl PollWait for MpiRecvHandle {
        fn try_wait(&mut self) -> Option<Vec<u8>> {
            let req = self.req.take()?;
            match req.test() {
                Ok(_status) => Some(self.take_data()),
                Err(req) => {
                    self.req = Some(req);
                    None
                }
            }
        }
    }

    impl Drop for MpiRecvHandle {
        fn drop(&mut self) {
            if let Some(r) = self.req.take() {
                let _ = r.wait();
            }
            if let Some(ptr) = self.buf.take() {
                unsafe {
                    drop(Box::from_raw(ptr.as_ptr()));
                }
            }
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
