//! The lane state table: W accumulator slots plus ownership bookkeeping.
//!
//! Pure data owned by the scheduler thread. A lane holds exactly one
//! stream's accumulator between rounds; isolation is the table's single
//! invariant: a lane's state reflects the bytes of its owner and nothing
//! else. Streams that arrive while every lane is occupied queue in a FIFO
//! and are bound as lanes free up.

use std::collections::VecDeque;
use std::sync::mpsc::SyncSender;

use crate::scalar::Md5State;
use crate::{Block, Digest};

/// Opaque per-stream identity.
pub(crate) type Uid = u64;

/// One lane slot.
pub(crate) struct Lane {
    /// Running accumulator for the owning stream.
    pub state: Md5State,
    /// Owning stream, or `None` for an idle lane.
    pub owner: Option<Uid>,
    /// Block to feed into the next compression round.
    pub pending: Option<Block>,
    /// Blocks queued behind `pending`, oldest first.
    pub backlog: VecDeque<Block>,
    /// Completion channel of an in-flight finalize; the digest is delivered
    /// once `pending` and `backlog` drain.
    pub finish: Option<SyncSender<Digest>>,
}

impl Lane {
    fn idle() -> Self {
        Self {
            state: Md5State::INIT,
            owner: None,
            pending: None,
            backlog: VecDeque::new(),
            finish: None,
        }
    }

    /// Queues one block behind whatever the lane already holds.
    pub fn push_block(&mut self, block: Block) {
        if self.pending.is_none() {
            self.pending = Some(block);
        } else {
            self.backlog.push_back(block);
        }
    }

    /// Moves the next queued block (if any) into the pending slot.
    pub fn advance(&mut self) {
        self.pending = self.backlog.pop_front();
    }

    /// Zeroes the accumulator and drops queued blocks, keeping ownership.
    pub fn reset(&mut self) {
        self.state = Md5State::INIT;
        self.pending = None;
        self.backlog.clear();
    }

    /// True once a finalize has been queued and every block ran through.
    pub fn finished(&self) -> bool {
        self.finish.is_some() && self.pending.is_none() && self.backlog.is_empty()
    }
}

/// Fixed-width table of lanes plus the queue of streams awaiting one.
pub(crate) struct LaneTable {
    lanes: Vec<Lane>,
    waiting: VecDeque<(Uid, SyncSender<()>)>,
}

impl LaneTable {
    pub fn new(width: usize) -> Self {
        assert!(width > 0, "lane table requires at least one lane");
        Self {
            lanes: (0..width).map(|_| Lane::idle()).collect(),
            waiting: VecDeque::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.lanes.len()
    }

    pub fn lanes_mut(&mut self) -> &mut [Lane] {
        &mut self.lanes
    }

    /// The lane currently bound to `uid`, if any.
    pub fn lane_of(&mut self, uid: Uid) -> Option<&mut Lane> {
        self.lanes.iter_mut().find(|lane| lane.owner == Some(uid))
    }

    /// Index of the lane bound to `uid`, if any.
    pub fn index_of(&self, uid: Uid) -> Option<usize> {
        self.lanes.iter().position(|lane| lane.owner == Some(uid))
    }

    /// True when at least one lane is unowned.
    pub fn has_free(&self) -> bool {
        self.lanes.iter().any(|lane| lane.owner.is_none())
    }

    /// Binds `uid` to a free lane, zeroing the slot. Returns the lane index,
    /// or `None` when every lane is occupied.
    pub fn bind(&mut self, uid: Uid) -> Option<usize> {
        let index = self.lanes.iter().position(|lane| lane.owner.is_none())?;
        let lane = &mut self.lanes[index];
        lane.state = Md5State::INIT;
        lane.pending = None;
        lane.backlog.clear();
        lane.finish = None;
        lane.owner = Some(uid);
        Some(index)
    }

    /// Returns lane `index` to the free pool, discarding its state.
    pub fn release(&mut self, index: usize) {
        self.lanes[index] = Lane::idle();
    }

    /// Queues a stream whose registration could not be satisfied yet.
    pub fn park(&mut self, uid: Uid, ready: SyncSender<()>) {
        self.waiting.push_back((uid, ready));
    }

    /// The longest-waiting parked stream, if any.
    pub fn next_waiting(&mut self) -> Option<(Uid, SyncSender<()>)> {
        self.waiting.pop_front()
    }

    /// True when at least one lane is owned and every owned lane has a block
    /// loaded for the next round.
    pub fn all_active_loaded(&self) -> bool {
        let mut any = false;
        for lane in &self.lanes {
            if lane.owner.is_some() {
                if lane.pending.is_none() {
                    return false;
                }
                any = true;
            }
        }
        any
    }

    /// True when any lane has a block waiting to be compressed.
    pub fn any_pending(&self) -> bool {
        self.lanes.iter().any(|lane| lane.pending.is_some())
    }

    /// True when any lane has blocks queued behind its pending slot.
    pub fn any_backlog(&self) -> bool {
        self.lanes.iter().any(|lane| !lane.backlog.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::sync_channel;

    #[test]
    fn bind_assigns_distinct_free_lanes() {
        let mut table = LaneTable::new(2);
        let a = table.bind(1).expect("first lane free");
        let b = table.bind(2).expect("second lane free");
        assert_ne!(a, b);
        assert_eq!(table.bind(3), None);
    }

    #[test]
    fn release_makes_lane_reusable_with_fresh_state() {
        let mut table = LaneTable::new(1);
        let index = table.bind(1).expect("lane free");
        let lane = table.lane_of(1).expect("bound");
        lane.push_block([0xff; 64]);
        *lane.state.words_mut() = [1, 2, 3, 4];

        table.release(index);
        assert!(table.lane_of(1).is_none());

        table.bind(2).expect("lane free again");
        let lane = table.lane_of(2).expect("bound");
        assert_eq!(lane.state, Md5State::INIT);
        assert!(lane.pending.is_none());
        assert!(lane.backlog.is_empty());
    }

    #[test]
    fn push_block_fills_pending_then_backlog() {
        let mut table = LaneTable::new(1);
        table.bind(7).expect("lane free");
        let lane = table.lane_of(7).expect("bound");

        lane.push_block([1; 64]);
        lane.push_block([2; 64]);
        assert_eq!(lane.pending, Some([1; 64]));
        assert_eq!(lane.backlog.len(), 1);

        lane.advance();
        assert_eq!(lane.pending, Some([2; 64]));
        lane.advance();
        assert!(lane.pending.is_none());
    }

    #[test]
    fn reset_discards_queued_blocks_but_keeps_owner() {
        let mut table = LaneTable::new(1);
        table.bind(7).expect("lane free");
        let lane = table.lane_of(7).expect("bound");
        lane.push_block([1; 64]);
        lane.push_block([2; 64]);

        lane.reset();
        assert_eq!(lane.owner, Some(7));
        assert!(lane.pending.is_none());
        assert!(lane.backlog.is_empty());
        assert_eq!(lane.state, Md5State::INIT);
    }

    #[test]
    fn waiting_queue_is_fifo() {
        let mut table = LaneTable::new(1);
        let (tx, _rx) = sync_channel(1);
        table.park(10, tx.clone());
        table.park(11, tx);

        assert_eq!(table.next_waiting().map(|(uid, _)| uid), Some(10));
        assert_eq!(table.next_waiting().map(|(uid, _)| uid), Some(11));
        assert!(table.next_waiting().is_none());
    }

    #[test]
    fn all_active_loaded_ignores_idle_lanes() {
        let mut table = LaneTable::new(3);
        table.bind(1).expect("lane free");
        table.bind(2).expect("lane free");

        assert!(!table.all_active_loaded());
        table.lane_of(1).expect("bound").push_block([0; 64]);
        assert!(!table.all_active_loaded());
        table.lane_of(2).expect("bound").push_block([0; 64]);
        // The third lane is idle and must not hold the round back.
        assert!(table.all_active_loaded());
    }

    #[test]
    fn empty_table_is_never_loaded() {
        let table = LaneTable::new(4);
        assert!(!table.all_active_loaded());
        assert!(!table.any_pending());
    }
}
