//! The multi-lane scheduling server.
//!
//! One scheduler thread owns the lane state table and turns an arbitrarily
//! interleaved stream of per-uid messages into batched compression rounds.
//! Intake is a single bounded channel (backpressure, never loss); completion
//! travels back over single-use channels created per request. The scheduler
//! processes intake and rounds serially, so the lane table needs no locks.
//!
//! # Batch trigger policy
//!
//! A compression round fires when every lane that currently has an owner
//! holds a block for the next round, when any lane has fallen behind (blocks
//! queued beyond its pending slot), or when blocks have been pending longer
//! than [`ServerConfig::flush_interval`]. The interval is a latency/batch
//! fill tunable, not a correctness knob: any bound keeps every stream moving.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::compressor::{Backend, BlockCompressor, ScalarCompressor};
use crate::error::StreamError;
use crate::hasher::Md5Hasher;
use crate::lanes::{LaneTable, Uid};
use crate::scalar::Md5State;
use crate::trace::{trace_lane_bound, trace_lane_released, trace_round, trace_stream_parked};
use crate::{Block, Digest, BLOCK_SIZE};

/// Content fed to lanes that carry no live block in a round. The updated
/// state of such a lane is discarded, so the content is arbitrary.
const NEUTRAL_BLOCK: Block = [0; BLOCK_SIZE];

/// Tuning knobs for [`Md5Server`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Lane width of the scheduler. Defaults to the detected vector width of
    /// this machine ([`Backend::detect`]).
    pub lanes: usize,

    /// How long a partially filled batch may wait for stragglers before it
    /// runs anyway. Bounds the extra latency an idle co-tenant can impose.
    pub flush_interval: Duration,

    /// Intake channel slots per lane. Higher values absorb burstier writers
    /// before backpressure sets in.
    pub intake_depth: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            lanes: Backend::detect().lanes(),
            flush_interval: Duration::from_micros(500),
            intake_depth: 4,
        }
    }
}

impl ServerConfig {
    /// Sets the lane width (minimum 1).
    #[must_use]
    pub fn with_lanes(mut self, lanes: usize) -> Self {
        self.lanes = lanes.max(1);
        self
    }

    /// Sets the partial-batch flush interval.
    #[must_use]
    pub const fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Sets the intake channel depth per lane (minimum 1).
    #[must_use]
    pub fn with_intake_depth(mut self, depth: usize) -> Self {
        self.intake_depth = depth.max(1);
        self
    }
}

/// The padded final block(s) of a stream.
///
/// Always exactly one or two whole blocks; anything else is unrepresentable,
/// which is what keeps a misaligned tail from ever reaching a lane.
pub(crate) struct Tail {
    blocks: [Block; 2],
    count: usize,
}

impl Tail {
    /// Wraps `bytes`, which must be one or two whole blocks long.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        assert!(
            bytes.len() == BLOCK_SIZE || bytes.len() == 2 * BLOCK_SIZE,
            "padded tail must be one or two whole blocks, got {} bytes",
            bytes.len()
        );
        let mut blocks = [NEUTRAL_BLOCK; 2];
        let count = bytes.len() / BLOCK_SIZE;
        for (block, chunk) in blocks.iter_mut().zip(bytes.chunks_exact(BLOCK_SIZE)) {
            block.copy_from_slice(chunk);
        }
        Self { blocks, count }
    }

    fn blocks(&self) -> &[Block] {
        &self.blocks[..self.count]
    }
}

/// Message sent from client handles to the scheduler thread.
pub(crate) enum LaneRequest {
    /// Bind `uid` to a lane; ack on `ready` once bound. Parked FIFO when all
    /// lanes are occupied.
    Register { uid: Uid, ready: SyncSender<()> },
    /// One complete input block for `uid`'s lane.
    Block { uid: Uid, block: Block },
    /// Zero `uid`'s accumulator and drop its queued blocks.
    Reset { uid: Uid },
    /// The padded tail; deliver the digest on `reply` once it has run.
    Finalize {
        uid: Uid,
        tail: Tail,
        reply: SyncSender<Digest>,
    },
    /// `uid` closed without finalizing; free its lane.
    Release { uid: Uid },
    /// Last server handle dropped; exit the scheduler loop.
    Shutdown,
}

/// State shared between the server handle, its hashers, and nothing else.
pub(crate) struct ServerShared {
    intake: SyncSender<LaneRequest>,
    uid_counter: AtomicU64,
    width: usize,
    scheduler: Option<JoinHandle<()>>,
}

impl ServerShared {
    pub fn send(&self, request: LaneRequest) -> Result<(), StreamError> {
        self.intake
            .send(request)
            .map_err(|_| StreamError::Disconnected)
    }

    pub fn next_uid(&self) -> Uid {
        self.uid_counter.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl Drop for ServerShared {
    fn drop(&mut self) {
        let _ = self.intake.send(LaneRequest::Shutdown);
        if let Some(handle) = self.scheduler.take() {
            let _ = handle.join();
        }
    }
}

/// Handle to a multi-lane MD5 scheduling server.
///
/// Cloning shares the same scheduler; independent servers (different widths
/// or kernels) coexist freely; there is no global instance. The scheduler
/// thread exits when the last handle and the last [`Md5Hasher`] are gone.
///
/// # Example
///
/// ```
/// use md5_lanes::{Md5Server, ServerConfig};
///
/// let server = Md5Server::with_config(ServerConfig::default().with_lanes(8));
/// let mut hasher = server.new_hasher();
/// hasher.update(b"hello world").unwrap();
/// let digest = hasher.sum();
/// assert_eq!(digest, md5_lanes::digest(b"hello world"));
/// ```
#[derive(Clone)]
pub struct Md5Server {
    shared: Arc<ServerShared>,
}

impl Md5Server {
    /// Creates a server with the detected lane width and the portable
    /// scalar kernel.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    /// Creates a server with explicit tuning, using the portable scalar
    /// kernel at `config.lanes` width.
    #[must_use]
    pub fn with_config(config: ServerConfig) -> Self {
        let lanes = config.lanes.max(1);
        Self::with_compressor(Box::new(ScalarCompressor::new(lanes)), config)
    }

    /// Creates a server driving a caller-supplied kernel. The lane width is
    /// fixed by the kernel; `config.lanes` is ignored.
    #[must_use]
    pub fn with_compressor(compressor: Box<dyn BlockCompressor>, config: ServerConfig) -> Self {
        let width = compressor.lanes();
        assert!(width > 0, "compression kernel reports zero lanes");

        let capacity = width * config.intake_depth.max(1);
        let (intake, requests) = mpsc::sync_channel(capacity);
        let scheduler = Scheduler {
            requests,
            compressor,
            table: LaneTable::new(width),
            flush_interval: config.flush_interval,
            drain_limit: capacity,
            deadline: None,
            states: Vec::with_capacity(width),
            blocks: Vec::with_capacity(width),
            live: Vec::with_capacity(width),
        };
        let handle = thread::spawn(move || scheduler.run());

        Self {
            shared: Arc::new(ServerShared {
                intake,
                uid_counter: AtomicU64::new(0),
                width,
                scheduler: Some(handle),
            }),
        }
    }

    /// The fixed lane width W of this server.
    #[must_use]
    pub fn lanes(&self) -> usize {
        self.shared.width
    }

    /// Opens a new digest stream on this server.
    #[must_use]
    pub fn new_hasher(&self) -> Md5Hasher {
        Md5Hasher::open(Arc::clone(&self.shared))
    }

    /// Hashes `inputs` as concurrent streams, returning digests in input
    /// order.
    ///
    /// Inputs are fed in lane-width groups with interleaved strides so
    /// compression rounds fill; a group never holds more streams than lanes,
    /// so this never blocks on lane exhaustion it caused itself.
    pub fn digest_batch<T: AsRef<[u8]>>(&self, inputs: &[T]) -> Vec<Digest> {
        // One stride per stream per pass keeps all lanes of a group supplied
        // without buffering whole inputs.
        const STRIDE: usize = 64 * BLOCK_SIZE;

        let mut digests = Vec::with_capacity(inputs.len());
        for group in inputs.chunks(self.lanes()) {
            let mut hashers: Vec<Md5Hasher> =
                group.iter().map(|_| self.new_hasher()).collect();
            let mut offsets = vec![0_usize; group.len()];

            loop {
                let mut progressed = false;
                for ((hasher, input), offset) in
                    hashers.iter_mut().zip(group).zip(offsets.iter_mut())
                {
                    let data = input.as_ref();
                    if *offset < data.len() {
                        let end = (*offset + STRIDE).min(data.len());
                        hasher
                            .update(&data[*offset..end])
                            .expect("scheduling server disconnected");
                        *offset = end;
                        progressed = true;
                    }
                }
                if !progressed {
                    break;
                }
            }

            digests.extend(hashers.iter_mut().map(Md5Hasher::sum));
        }
        digests
    }
}

impl Default for Md5Server {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Md5Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Md5Server")
            .field("lanes", &self.shared.width)
            .finish_non_exhaustive()
    }
}

/// The scheduler thread: sole owner and sole mutator of the lane table.
struct Scheduler {
    requests: Receiver<LaneRequest>,
    compressor: Box<dyn BlockCompressor>,
    table: LaneTable,
    flush_interval: Duration,
    drain_limit: usize,
    /// Armed when the oldest still-pending block arrived; cleared when no
    /// lane holds data. Measured from block arrival so a chatty neighbor
    /// cannot postpone a partial round indefinitely.
    deadline: Option<Instant>,
    // Round scratch, reused across invocations.
    states: Vec<Md5State>,
    blocks: Vec<Block>,
    live: Vec<bool>,
}

impl Scheduler {
    fn run(mut self) {
        loop {
            let message = if let Some(deadline) = self.deadline {
                match deadline.checked_duration_since(Instant::now()) {
                    None => None, // already expired
                    Some(wait) => match self.requests.recv_timeout(wait) {
                        Ok(message) => Some(message),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => return,
                    },
                }
            } else {
                match self.requests.recv() {
                    Ok(message) => Some(message),
                    Err(_) => return,
                }
            };

            match message {
                Some(first) => {
                    if self.apply(first) {
                        return;
                    }
                    let mut drained = 0;
                    while drained < self.drain_limit {
                        match self.requests.try_recv() {
                            Ok(message) => {
                                if self.apply(message) {
                                    return;
                                }
                                drained += 1;
                            }
                            Err(_) => break,
                        }
                    }
                    self.pump(false);
                }
                None => self.pump(true),
            }
        }
    }

    /// Runs every round that is due, then re-arms the flush deadline.
    /// `flush` forces one partial round first (deadline expiry).
    fn pump(&mut self, flush: bool) {
        if flush && self.table.any_pending() {
            self.run_round();
        }
        while self.table.all_active_loaded() || self.table.any_backlog() {
            self.run_round();
        }
        if self.table.any_pending() {
            if self.deadline.is_none() {
                self.deadline = Some(Instant::now() + self.flush_interval);
            }
        } else {
            self.deadline = None;
        }
    }

    /// Applies one intake message to the lane table. Returns `true` on
    /// shutdown.
    ///
    /// Messages that name an unbound uid cannot be produced by `Md5Hasher`
    /// (registration is acked before any data is sent); if one shows up the
    /// scheduler aborts rather than mis-hash.
    fn apply(&mut self, message: LaneRequest) -> bool {
        match message {
            LaneRequest::Register { uid, ready } => {
                if let Some(index) = self.table.bind(uid) {
                    if ready.send(()).is_err() {
                        // Registrant vanished before the ack; undo the bind.
                        self.table.release(index);
                    } else {
                        trace_lane_bound(uid, index);
                    }
                } else {
                    trace_stream_parked(uid);
                    self.table.park(uid, ready);
                }
            }
            LaneRequest::Block { uid, block } => {
                self.table
                    .lane_of(uid)
                    .unwrap_or_else(|| panic!("block for unbound stream {uid}"))
                    .push_block(block);
            }
            LaneRequest::Reset { uid } => {
                self.table
                    .lane_of(uid)
                    .unwrap_or_else(|| panic!("reset for unbound stream {uid}"))
                    .reset();
            }
            LaneRequest::Finalize { uid, tail, reply } => {
                let lane = self
                    .table
                    .lane_of(uid)
                    .unwrap_or_else(|| panic!("finalize for unbound stream {uid}"));
                for block in tail.blocks() {
                    lane.push_block(*block);
                }
                lane.finish = Some(reply);
            }
            LaneRequest::Release { uid } => {
                if let Some(index) = self.table.index_of(uid) {
                    trace_lane_released(uid, index);
                    self.table.release(index);
                    self.bind_waiting();
                }
            }
            LaneRequest::Shutdown => return true,
        }
        false
    }

    /// One compression round: snapshot states, one kernel call, write back
    /// participating lanes, deliver any finished digests, recycle lanes.
    fn run_round(&mut self) {
        self.states.clear();
        self.blocks.clear();
        self.live.clear();
        for lane in self.table.lanes_mut() {
            self.states.push(lane.state);
            match lane.pending.take() {
                Some(block) => {
                    self.blocks.push(block);
                    self.live.push(true);
                }
                None => {
                    self.blocks.push(NEUTRAL_BLOCK);
                    self.live.push(false);
                }
            }
        }

        let active = self.live.iter().filter(|live| **live).count();
        if active == 0 {
            return;
        }
        self.compressor.compress(&mut self.states, &self.blocks);
        trace_round(active, self.table.width());

        let mut freed = Vec::new();
        for (index, lane) in self.table.lanes_mut().iter_mut().enumerate() {
            if !self.live[index] {
                // Idle lane: kernel output is discarded, state untouched.
                continue;
            }
            lane.state = self.states[index];
            lane.advance();
            if lane.finished() {
                let reply = lane.finish.take().expect("finished lane has a reply");
                let _ = reply.send(lane.state.digest());
                if let Some(uid) = lane.owner {
                    trace_lane_released(uid, index);
                }
                freed.push(index);
            }
        }

        for index in freed {
            self.table.release(index);
        }
        self.bind_waiting();
    }

    /// Binds parked streams to free lanes, FIFO, skipping dead registrants.
    fn bind_waiting(&mut self) {
        while self.table.has_free() {
            let Some((uid, ready)) = self.table.next_waiting() else {
                break;
            };
            let index = self.table.bind(uid).expect("free lane was just checked");
            if ready.send(()).is_err() {
                self.table.release(index);
                continue;
            }
            trace_lane_bound(uid, index);
        }
    }
}
