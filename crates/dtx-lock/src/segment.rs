//! Claimed segments and their wait queues

use crate::boundary::Boundary;
use crate::range::KeyRange;
use dtx_primitives::{LockMode, TxnId};
use std::collections::{BTreeSet, VecDeque};

/// A queued request piece, clipped to the segment it waits on
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Waiter<K> {
    /// Waiting transaction
    pub txn: TxnId,
    /// Part of the request covered by the segment
    pub range: KeyRange<K>,
    /// Requested mode
    pub mode: LockMode,
}

/// A claimed interval of one table
#[derive(Clone, Debug)]
pub struct Segment<K> {
    range: KeyRange<K>,
    mode: LockMode,
    holders: BTreeSet<TxnId>,
    waiters: VecDeque<Waiter<K>>,
}

impl<K: Ord + Clone> Segment<K> {
    /// Segment granted to a single transaction
    pub fn granted(range: KeyRange<K>, mode: LockMode, txn: TxnId) -> Self {
        Self {
            range,
            mode,
            holders: BTreeSet::from([txn]),
            waiters: VecDeque::new(),
        }
    }

    /// Claimed interval
    pub fn range(&self) -> &KeyRange<K> {
        &self.range
    }

    /// Lower boundary, also the segment's key in the table
    pub fn lo(&self) -> &Boundary<K> {
        self.range.lo()
    }

    /// Upper boundary
    pub fn hi(&self) -> &Boundary<K> {
        self.range.hi()
    }

    /// Mode the holders share
    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Transactions holding the segment
    pub fn holders(&self) -> &BTreeSet<TxnId> {
        &self.holders
    }

    /// Queued requests in arrival order
    pub fn waiters(&self) -> &VecDeque<Waiter<K>> {
        &self.waiters
    }

    /// A segment nobody holds any more
    pub fn is_stale(&self) -> bool {
        self.holders.is_empty()
    }

    /// Whether `txn` may take `piece` of this segment in `mode` right now
    ///
    /// A holder asking for no more than it has is always admitted, as is a
    /// sole holder upgrading. Otherwise only shared requests on a shared
    /// segment are admitted, and only when no queued request overlaps the
    /// piece, so later arrivals never overtake the queue.
    pub fn admits(&self, txn: TxnId, mode: LockMode, piece: &KeyRange<K>) -> bool {
        if self.holders.contains(&txn) && (mode <= self.mode || self.holders.len() == 1) {
            return true;
        }
        mode.is_compatible_with(self.mode)
            && !self.waiters.iter().any(|w| w.range.overlaps(piece))
    }

    pub(crate) fn add_holder(&mut self, txn: TxnId, mode: LockMode) {
        self.holders.insert(txn);
        self.mode = self.mode.strongest(mode);
    }

    pub(crate) fn remove_holder(&mut self, txn: TxnId) -> bool {
        self.holders.remove(&txn)
    }

    pub(crate) fn enqueue(&mut self, waiter: Waiter<K>) {
        self.waiters.push_back(waiter);
    }

    /// Pop queued upgrades of a sole remaining holder from the head of the
    /// queue
    ///
    /// A holder that asked for more while sharing the segment waits behind
    /// its co-holders; once it holds the segment alone its request can be
    /// granted.
    pub(crate) fn take_holder_upgrades(&mut self) -> Vec<Waiter<K>> {
        let mut upgrades = Vec::new();
        while let Some(head) = self.waiters.front() {
            if self.holders.len() != 1 || !self.holders.contains(&head.txn) {
                break;
            }
            upgrades.extend(self.waiters.pop_front());
        }
        upgrades
    }

    pub(crate) fn take_waiters(&mut self) -> VecDeque<Waiter<K>> {
        std::mem::take(&mut self.waiters)
    }

    /// Drop every queued piece of `txn`, returning how many were removed
    pub(crate) fn drop_waiters_of(&mut self, txn: TxnId) -> usize {
        let before = self.waiters.len();
        self.waiters.retain(|w| w.txn != txn);
        before - self.waiters.len()
    }

    /// Cut the segment at `cut`, keeping `[lo, cut)` and returning `[cut, hi)`
    ///
    /// Both halves keep the holders and mode. Waiters go to the half they
    /// fall in; a waiter straddling the cut is split in two and its
    /// transaction is returned once per such split, since it now has one
    /// more queued piece.
    pub(crate) fn split_at(&mut self, cut: &Boundary<K>) -> (Segment<K>, Vec<TxnId>) {
        debug_assert!(self.lo() < cut && cut < self.hi());

        let mut right_range = self.range.clone();
        right_range.set_lo(cut.clone());
        self.range.set_hi(cut.clone());

        let mut left_queue = VecDeque::new();
        let mut right_queue = VecDeque::new();
        let mut duplicated = Vec::new();
        for waiter in self.waiters.drain(..) {
            if waiter.range.hi() <= cut {
                left_queue.push_back(waiter);
            } else if waiter.range.lo() >= cut {
                right_queue.push_back(waiter);
            } else {
                let mut left = waiter.clone();
                left.range.set_hi(cut.clone());
                let mut right = waiter;
                right.range.set_lo(cut.clone());
                duplicated.push(right.txn);
                left_queue.push_back(left);
                right_queue.push_back(right);
            }
        }
        self.waiters = left_queue;

        let right = Segment {
            range: right_range,
            mode: self.mode,
            holders: self.holders.clone(),
            waiters: right_queue,
        };
        (right, duplicated)
    }

    /// Whether `next` directly follows this segment and the two are
    /// indistinguishable apart from their bounds
    pub(crate) fn can_merge_with(&self, next: &Segment<K>) -> bool {
        self.hi() == next.lo()
            && self.mode == next.mode
            && self.holders == next.holders
            && self.waiters.is_empty()
            && next.waiters.is_empty()
    }

    pub(crate) fn absorb(&mut self, next: Segment<K>) {
        self.range.set_hi(next.range.hi().clone());
    }
}

/// Snapshot of one segment
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentView<K> {
    /// Claimed interval
    pub range: KeyRange<K>,
    /// Shared mode of the holders
    pub mode: LockMode,
    /// Holders in id order
    pub holders: Vec<TxnId>,
    /// Queue in arrival order
    pub waiters: Vec<Waiter<K>>,
}

impl<K: Clone> From<&Segment<K>> for SegmentView<K> {
    fn from(segment: &Segment<K>) -> Self {
        Self {
            range: segment.range.clone(),
            mode: segment.mode,
            holders: segment.holders.iter().copied().collect(),
            waiters: segment.waiters.iter().cloned().collect(),
        }
    }
}
