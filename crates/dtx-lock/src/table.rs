//! Range lock table for one resource

use crate::boundary::Boundary;
use crate::normalize::normalize_requests;
use crate::ordered_map::OrderedMap;
use crate::range::{KeyRange, LockRequest};
use crate::segment::{Segment, SegmentView, Waiter};
use dtx_metrics::{names, Metrics};
use dtx_primitives::{LockMode, TxnId};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, trace};

/// Receives claim accounting from a table
///
/// Calls are made while the table is locked, so a transaction's count of
/// queued claims is always raised before the claim it replaces is resolved.
pub trait ClaimLedger {
    /// A piece of `txn`'s request was queued behind another transaction
    fn claim_queued(&mut self, txn: TxnId);

    /// A queued piece of `txn` was replayed
    ///
    /// The replay itself may have queued again, which is reported first.
    fn claim_resolved(&mut self, txn: TxnId);

    /// Queued pieces of a releasing transaction were discarded
    fn claims_dropped(&mut self, _txn: TxnId, _count: usize) {}
}

/// Counts queued claims per transaction and collects the ones that reach
/// zero
#[derive(Debug, Default)]
pub struct PendingClaims {
    pending: HashMap<TxnId, usize>,
    runnable: Vec<TxnId>,
}

impl PendingClaims {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued claims of `txn`
    pub fn pending(&self, txn: TxnId) -> usize {
        self.pending.get(&txn).copied().unwrap_or(0)
    }

    /// Transactions whose last queued claim resolved since the previous call
    pub fn take_runnable(&mut self) -> Vec<TxnId> {
        std::mem::take(&mut self.runnable)
    }

    /// Whether no transaction has a queued claim
    pub fn is_settled(&self) -> bool {
        self.pending.is_empty()
    }
}

impl ClaimLedger for PendingClaims {
    fn claim_queued(&mut self, txn: TxnId) {
        *self.pending.entry(txn).or_default() += 1;
    }

    fn claim_resolved(&mut self, txn: TxnId) {
        if let Some(count) = self.pending.get_mut(&txn) {
            *count -= 1;
            if *count == 0 {
                self.pending.remove(&txn);
                self.runnable.push(txn);
            }
        }
    }

    fn claims_dropped(&mut self, txn: TxnId, _count: usize) {
        self.pending.remove(&txn);
    }
}

/// Result of applying for a range
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Pieces granted immediately
    pub granted: usize,
    /// Pieces queued behind other transactions
    pub queued: usize,
}

impl ApplyOutcome {
    /// Whether every piece was granted
    pub fn is_granted(&self) -> bool {
        self.queued == 0
    }

    fn absorb(&mut self, other: ApplyOutcome) {
        self.granted += other.granted;
        self.queued += other.queued;
    }
}

/// Result of a release pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseOutcome {
    /// Segments removed because their last holder left
    pub freed: usize,
    /// Queued pieces replayed
    pub replayed: usize,
    /// Queued pieces of the releasing transaction discarded
    pub dropped: usize,
}

struct TableState<K, M> {
    segments: M,
    /// Lower boundaries of the segments each transaction holds
    holdings: HashMap<TxnId, BTreeSet<Boundary<K>>>,
    /// Number of queued pieces per transaction
    waiting: HashMap<TxnId, usize>,
}

impl<K, M> TableState<K, M>
where
    K: Ord + Clone + Debug + Send,
    M: OrderedMap<Boundary<K>, Segment<K>>,
{
    fn insert(&mut self, segment: Segment<K>) {
        for txn in segment.holders() {
            self.holdings
                .entry(*txn)
                .or_default()
                .insert(segment.lo().clone());
        }
        self.segments.insert(segment.lo().clone(), segment);
    }

    fn take(&mut self, lo: &Boundary<K>) -> Option<Segment<K>> {
        let segment = self.segments.remove(lo)?;
        for txn in segment.holders() {
            if let Some(held) = self.holdings.get_mut(txn) {
                held.remove(lo);
                if held.is_empty() {
                    self.holdings.remove(txn);
                }
            }
        }
        Some(segment)
    }

    fn note_queued(&mut self, txn: TxnId, ledger: &mut dyn ClaimLedger) {
        *self.waiting.entry(txn).or_default() += 1;
        ledger.claim_queued(txn);
    }

    fn note_unqueued(&mut self, txn: TxnId) {
        if let Some(count) = self.waiting.get_mut(&txn) {
            *count -= 1;
            if *count == 0 {
                self.waiting.remove(&txn);
            }
        }
    }

    /// Lower boundary of the segment covering `cursor`, or of the first
    /// segment starting before `hi`
    fn covering(&self, cursor: &Boundary<K>, hi: &Boundary<K>) -> Option<Boundary<K>> {
        if let Some((lo, segment)) = self.segments.floor(cursor) {
            if segment.hi() > cursor {
                return Some(lo.clone());
            }
        }
        match self.segments.ceiling(cursor) {
            Some((lo, _)) if lo < hi => Some(lo.clone()),
            _ => None,
        }
    }

    fn apply(
        &mut self,
        txn: TxnId,
        range: &KeyRange<K>,
        mode: LockMode,
        ledger: &mut dyn ClaimLedger,
        replay: &mut VecDeque<Waiter<K>>,
    ) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();
        let hi = range.hi().clone();
        let mut cursor = range.lo().clone();

        while cursor < hi {
            let Some(seg_lo) = self.covering(&cursor, &hi) else {
                self.grant_fresh(txn, cursor, hi.clone(), mode);
                outcome.granted += 1;
                break;
            };

            if seg_lo > cursor {
                self.grant_fresh(txn, cursor, seg_lo.clone(), mode);
                outcome.granted += 1;
                cursor = seg_lo;
                continue;
            }

            let Some(segment) = self.segments.get(&seg_lo) else {
                break;
            };

            if segment.is_stale() {
                if let Some(mut stale) = self.take(&seg_lo) {
                    trace!("Dropping stale segment {:?}", stale.range());
                    replay.extend(stale.take_waiters());
                }
                continue;
            }

            let piece_hi = segment.hi().min(&hi).clone();
            let Some(piece) = KeyRange::between(cursor, piece_hi.clone()) else {
                break;
            };

            if segment.admits(txn, mode, &piece) {
                self.grant_piece(&seg_lo, &piece, txn, mode, ledger);
                outcome.granted += 1;
            } else {
                trace!("{} queued on {:?} for {:?} {}", txn, seg_lo, piece, mode);
                if let Some(segment) = self.segments.get_mut(&seg_lo) {
                    segment.enqueue(Waiter {
                        txn,
                        range: piece,
                        mode,
                    });
                }
                self.note_queued(txn, ledger);
                outcome.queued += 1;
            }
            cursor = piece_hi;
        }

        self.merge_around(range.lo(), range.hi());
        outcome
    }

    fn grant_fresh(&mut self, txn: TxnId, lo: Boundary<K>, hi: Boundary<K>, mode: LockMode) {
        if let Some(range) = KeyRange::between(lo, hi) {
            self.insert(Segment::granted(range, mode, txn));
        }
    }

    /// Add `txn` as a holder of `piece`, cutting the segment at `seg_lo` so
    /// the piece becomes a segment of its own
    fn grant_piece(
        &mut self,
        seg_lo: &Boundary<K>,
        piece: &KeyRange<K>,
        txn: TxnId,
        mode: LockMode,
        ledger: &mut dyn ClaimLedger,
    ) {
        let already_held = self
            .segments
            .get(seg_lo)
            .map(|s| s.holders().contains(&txn) && mode <= s.mode())
            .unwrap_or(false);
        if already_held {
            return;
        }

        let Some(mut segment) = self.take(seg_lo) else {
            return;
        };
        if segment.lo() < piece.lo() {
            let (right, duplicated) = segment.split_at(piece.lo());
            self.note_duplicates(duplicated, ledger);
            self.insert(segment);
            segment = right;
        }
        if piece.hi() < segment.hi() {
            let (right, duplicated) = segment.split_at(piece.hi());
            self.note_duplicates(duplicated, ledger);
            self.insert(right);
        }
        segment.add_holder(txn, mode);
        self.insert(segment);
    }

    fn note_duplicates(&mut self, duplicated: Vec<TxnId>, ledger: &mut dyn ClaimLedger) {
        for txn in duplicated {
            self.note_queued(txn, ledger);
        }
    }

    /// Merge equal neighbours from the segment before `lo` up to `hi`
    fn merge_around(&mut self, lo: &Boundary<K>, hi: &Boundary<K>) {
        let start = self
            .segments
            .predecessor(lo)
            .or_else(|| self.segments.ceiling(lo))
            .map(|(k, _)| k.clone());
        let Some(mut current) = start else {
            return;
        };

        loop {
            let Some(next_lo) = self.segments.successor(&current).map(|(k, _)| k.clone()) else {
                return;
            };
            let mergeable = match (self.segments.get(&current), self.segments.get(&next_lo)) {
                (Some(a), Some(b)) => a.can_merge_with(b),
                _ => false,
            };
            if mergeable {
                if let Some(next) = self.take(&next_lo) {
                    if let Some(segment) = self.segments.get_mut(&current) {
                        segment.absorb(next);
                    }
                }
            } else {
                if next_lo > *hi {
                    return;
                }
                current = next_lo;
            }
        }
    }

    fn drain_replay(
        &mut self,
        mut replay: VecDeque<Waiter<K>>,
        ledger: &mut dyn ClaimLedger,
    ) -> usize {
        let mut replayed = 0;
        while let Some(waiter) = replay.pop_front() {
            self.note_unqueued(waiter.txn);
            self.apply(waiter.txn, &waiter.range, waiter.mode, ledger, &mut replay);
            ledger.claim_resolved(waiter.txn);
            replayed += 1;
        }
        replayed
    }

    fn drop_waiters_everywhere(&mut self, txn: TxnId) -> usize {
        let keys: Vec<Boundary<K>> = self
            .segments
            .entries()
            .filter(|(_, s)| s.waiters().iter().any(|w| w.txn == txn))
            .map(|(k, _)| k.clone())
            .collect();
        let mut dropped = 0;
        for key in &keys {
            if let Some(segment) = self.segments.get_mut(key) {
                dropped += segment.drop_waiters_of(txn);
            }
        }
        dropped
    }
}

/// Range lock table of one resource
///
/// Allocation and release of one table are serialized behind a single
/// mutex. The table never blocks: conflicting pieces are queued and reported
/// to the caller's [`ClaimLedger`].
pub struct TableResource<K, M = BTreeMap<Boundary<K>, Segment<K>>> {
    name: String,
    state: Mutex<TableState<K, M>>,
    metrics: Option<Arc<Metrics>>,
}

impl<K> TableResource<K>
where
    K: Ord + Clone + Debug + Send,
{
    /// Create an empty table backed by a `BTreeMap`
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_map(name)
    }
}

impl<K, M> TableResource<K, M>
where
    K: Ord + Clone + Debug + Send,
    M: OrderedMap<Boundary<K>, Segment<K>>,
{
    /// Create an empty table over a custom ordered map
    pub fn with_map(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(TableState {
                segments: M::default(),
                holdings: HashMap::new(),
                waiting: HashMap::new(),
            }),
            metrics: None,
        }
    }

    /// Record claim counters into `metrics`
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Table name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Grant or queue every piece of `request` for `txn`
    pub fn apply_for(
        &self,
        txn: TxnId,
        request: &LockRequest<K>,
        ledger: &mut dyn ClaimLedger,
    ) -> ApplyOutcome {
        self.apply_all(txn, std::slice::from_ref(request), ledger)
    }

    /// Apply for several ranges at once
    ///
    /// The requests are normalized first, so overlapping ranges of the same
    /// transaction never queue behind each other.
    pub fn apply_all(
        &self,
        txn: TxnId,
        requests: &[LockRequest<K>],
        ledger: &mut dyn ClaimLedger,
    ) -> ApplyOutcome {
        let requests = normalize_requests(requests);
        let mut outcome = ApplyOutcome::default();
        let mut replay = VecDeque::new();
        let replayed = {
            let mut state = self.state.lock();
            for request in &requests {
                outcome.absorb(state.apply(txn, &request.range, request.mode, ledger, &mut replay));
            }
            state.drain_replay(replay, ledger)
        };

        debug!(
            "Table {}: {} applied for {} ranges, {} granted, {} queued",
            self.name,
            txn,
            requests.len(),
            outcome.granted,
            outcome.queued
        );
        if let Some(metrics) = &self.metrics {
            metrics.incr(names::LOCK_GRANTED, outcome.granted as u64);
            metrics.incr(names::LOCK_QUEUED, outcome.queued as u64);
            metrics.incr(names::LOCK_REPLAYED, replayed as u64);
        }
        outcome
    }

    /// Return every claim `txn` holds in this table
    ///
    /// Segments left without holders are removed and their queues replayed
    /// in key order, first come first served within a segment. Queued pieces
    /// of `txn` itself are dropped. Releasing twice is a no-op.
    pub fn release(&self, txn: TxnId, ledger: &mut dyn ClaimLedger) -> ReleaseOutcome {
        let mut outcome = ReleaseOutcome::default();
        {
            let mut state = self.state.lock();
            let mut replay = VecDeque::new();

            let held = state.holdings.remove(&txn).unwrap_or_default();
            for lo in held {
                let emptied = match state.segments.get_mut(&lo) {
                    Some(segment) => {
                        segment.remove_holder(txn);
                        replay.extend(segment.take_holder_upgrades());
                        segment.is_stale()
                    }
                    None => false,
                };
                if emptied {
                    if let Some(mut segment) = state.take(&lo) {
                        replay.extend(segment.take_waiters());
                        outcome.freed += 1;
                    }
                }
            }

            if state.waiting.remove(&txn).is_some() {
                let before = replay.len();
                replay.retain(|w| w.txn != txn);
                outcome.dropped = before - replay.len() + state.drop_waiters_everywhere(txn);
                ledger.claims_dropped(txn, outcome.dropped);
            }

            outcome.replayed = state.drain_replay(replay, ledger);
        }

        if outcome != ReleaseOutcome::default() {
            debug!(
                "Table {}: {} released, {} segments freed, {} waiters replayed",
                self.name, txn, outcome.freed, outcome.replayed
            );
        }
        if let Some(metrics) = &self.metrics {
            metrics.incr(names::LOCK_SEGMENTS_FREED, outcome.freed as u64);
            metrics.incr(names::LOCK_REPLAYED, outcome.replayed as u64);
        }
        outcome
    }

    /// Snapshot of all segments in key order
    pub fn segments(&self) -> Vec<SegmentView<K>> {
        self.state
            .lock()
            .segments
            .entries()
            .map(|(_, s)| SegmentView::from(s))
            .collect()
    }

    /// Ranges currently held by `txn`, in key order
    pub fn held_ranges(&self, txn: TxnId) -> Vec<KeyRange<K>> {
        let state = self.state.lock();
        state
            .holdings
            .get(&txn)
            .map(|held| {
                held.iter()
                    .filter_map(|lo| state.segments.get(lo))
                    .map(|s| s.range().clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether `txn` holds any segment
    pub fn holds(&self, txn: TxnId) -> bool {
        self.state.lock().holdings.contains_key(&txn)
    }

    /// Whether `txn` has queued pieces
    pub fn is_waiting(&self, txn: TxnId) -> bool {
        self.state.lock().waiting.contains_key(&txn)
    }

    /// Number of segments
    pub fn len(&self) -> usize {
        self.state.lock().segments.len()
    }

    /// Whether nothing is claimed
    pub fn is_empty(&self) -> bool {
        self.state.lock().segments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn r(l: i32, h: i32) -> KeyRange<i32> {
        KeyRange::new(l, h).unwrap()
    }

    fn req(l: i32, h: i32, mode: LockMode) -> LockRequest<i32> {
        LockRequest::new(r(l, h), mode)
    }

    fn t(id: u64) -> TxnId {
        TxnId::new(id)
    }

    fn layout(table: &TableResource<i32>) -> Vec<(KeyRange<i32>, LockMode, Vec<TxnId>, usize)> {
        table
            .segments()
            .into_iter()
            .map(|s| (s.range, s.mode, s.holders, s.waiters.len()))
            .collect()
    }

    // ==================== Grant Tests ====================

    #[test]
    fn test_grant_on_empty_table() {
        let table = TableResource::<i32>::new("user");
        let mut ledger = PendingClaims::new();

        let outcome = table.apply_for(t(1), &req(10, 30, LockMode::Exclusive), &mut ledger);

        assert!(outcome.is_granted());
        assert_eq!(table.len(), 1);
        assert!(table.holds(t(1)));
        assert_eq!(table.held_ranges(t(1)), vec![r(10, 30)]);
        assert!(ledger.is_settled());
    }

    #[test]
    fn test_shared_holders_split_segment() {
        let table = TableResource::<i32>::new("user");
        let mut ledger = PendingClaims::new();

        table.apply_for(t(1), &req(0, 10, LockMode::Shared), &mut ledger);
        let outcome = table.apply_for(t(2), &req(5, 15, LockMode::Shared), &mut ledger);

        assert!(outcome.is_granted());
        assert_eq!(
            layout(&table),
            vec![
                (r(0, 5), LockMode::Shared, vec![t(1)], 0),
                (r(5, 10), LockMode::Shared, vec![t(1), t(2)], 0),
                (r(10, 15), LockMode::Shared, vec![t(2)], 0),
            ]
        );
    }

    #[test]
    fn test_disjoint_requests_do_not_interact() {
        let table = TableResource::<i32>::new("user");
        let mut ledger = PendingClaims::new();

        table.apply_for(t(1), &req(0, 10, LockMode::Exclusive), &mut ledger);
        let outcome = table.apply_for(t(2), &req(10, 20, LockMode::Exclusive), &mut ledger);

        assert!(outcome.is_granted());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_point_and_range_share_start() {
        let table = TableResource::<i32>::new("user");
        let mut ledger = PendingClaims::new();

        table.apply_for(t(1), &req(5, 5, LockMode::Exclusive), &mut ledger);
        let outcome = table.apply_for(t(2), &req(5, 9, LockMode::Exclusive), &mut ledger);

        assert_eq!(outcome, ApplyOutcome { granted: 1, queued: 1 });
        let segments = table.segments();
        assert_eq!(segments[0].range, KeyRange::point(5));
        assert_eq!(segments[0].waiters[0].txn, t(2));
        assert_eq!(
            segments[1].range,
            KeyRange::between(Boundary::Above(5), Boundary::Below(9)).unwrap()
        );
    }

    #[test]
    fn test_gap_between_segments_is_granted() {
        let table = TableResource::<i32>::new("user");
        let mut ledger = PendingClaims::new();

        table.apply_for(t(1), &req(0, 5, LockMode::Exclusive), &mut ledger);
        table.apply_for(t(1), &req(10, 15, LockMode::Exclusive), &mut ledger);
        let outcome = table.apply_for(t(2), &req(0, 20, LockMode::Exclusive), &mut ledger);

        assert_eq!(outcome, ApplyOutcome { granted: 2, queued: 2 });
        assert_eq!(ledger.pending(t(2)), 2);
        assert_eq!(
            table.held_ranges(t(2)),
            vec![r(5, 10), r(15, 20)]
        );
    }

    // ==================== Queue Tests ====================

    #[test]
    fn test_exclusive_then_shared_scenario() {
        let table = TableResource::<i32>::new("user");
        let mut ledger = PendingClaims::new();

        table.apply_for(t(1), &req(10, 30, LockMode::Exclusive), &mut ledger);
        let outcome = table.apply_for(t(2), &req(20, 50, LockMode::Shared), &mut ledger);

        assert_eq!(outcome, ApplyOutcome { granted: 1, queued: 1 });
        assert_eq!(ledger.pending(t(2)), 1);
        assert_eq!(table.held_ranges(t(2)), vec![r(30, 50)]);

        let released = table.release(t(1), &mut ledger);
        assert_eq!(released.freed, 1);
        assert_eq!(released.replayed, 1);
        assert_eq!(ledger.take_runnable(), vec![t(2)]);
        assert_eq!(
            layout(&table),
            vec![(r(20, 50), LockMode::Shared, vec![t(2)], 0)]
        );
    }

    #[test]
    fn test_waiters_are_served_in_order() {
        let table = TableResource::<i32>::new("user");
        let mut ledger = PendingClaims::new();

        table.apply_for(t(1), &req(0, 10, LockMode::Exclusive), &mut ledger);
        table.apply_for(t(2), &req(0, 10, LockMode::Exclusive), &mut ledger);
        table.apply_for(t(3), &req(0, 10, LockMode::Exclusive), &mut ledger);

        table.release(t(1), &mut ledger);
        assert_eq!(ledger.take_runnable(), vec![t(2)]);
        assert_eq!(ledger.pending(t(3)), 1);

        table.release(t(2), &mut ledger);
        assert_eq!(ledger.take_runnable(), vec![t(3)]);
        assert!(ledger.is_settled());
    }

    #[test]
    fn test_shared_does_not_overtake_queued_exclusive() {
        let table = TableResource::<i32>::new("user");
        let mut ledger = PendingClaims::new();

        table.apply_for(t(1), &req(0, 10, LockMode::Shared), &mut ledger);
        table.apply_for(t(2), &req(0, 10, LockMode::Exclusive), &mut ledger);
        let outcome = table.apply_for(t(3), &req(0, 10, LockMode::Shared), &mut ledger);

        assert_eq!(outcome.queued, 1);
        table.release(t(1), &mut ledger);
        assert_eq!(ledger.take_runnable(), vec![t(2)]);
        table.release(t(2), &mut ledger);
        assert_eq!(ledger.take_runnable(), vec![t(3)]);
    }

    #[test]
    fn test_split_duplicates_straddling_waiter() {
        let table = TableResource::<i32>::new("user");
        let mut ledger = PendingClaims::new();

        table.apply_for(t(1), &req(0, 10, LockMode::Shared), &mut ledger);
        table.apply_for(t(2), &req(0, 4, LockMode::Exclusive), &mut ledger);
        // The shared piece [5, 10) does not overlap the queue, so it is
        // granted and the segment is cut at 5.
        table.apply_for(t(3), &req(5, 10, LockMode::Shared), &mut ledger);
        assert_eq!(table.len(), 2);
        assert_eq!(ledger.pending(t(2)), 1);

        table.apply_for(t(4), &req(2, 8, LockMode::Exclusive), &mut ledger);
        assert_eq!(ledger.pending(t(4)), 2);

        // The sole holder upgrading [3, 4) cuts the queued pieces of t2 and
        // t4 at 3, and t4's again at 4.
        table.apply_for(t(1), &req(3, 4, LockMode::Exclusive), &mut ledger);
        assert_eq!(ledger.pending(t(2)), 2);
        assert_eq!(ledger.pending(t(4)), 4);

        table.release(t(1), &mut ledger);
        assert_eq!(ledger.take_runnable(), vec![t(2)]);
        table.release(t(2), &mut ledger);
        table.release(t(3), &mut ledger);
        assert_eq!(ledger.take_runnable(), vec![t(4)]);
        assert_eq!(table.held_ranges(t(4)), vec![r(2, 8)]);
    }

    // ==================== Release Tests ====================

    #[test]
    fn test_release_is_idempotent() {
        let table = TableResource::<i32>::new("user");
        let mut ledger = PendingClaims::new();

        table.apply_for(t(1), &req(0, 10, LockMode::Shared), &mut ledger);
        table.apply_for(t(2), &req(0, 10, LockMode::Shared), &mut ledger);

        let first = table.release(t(1), &mut ledger);
        let second = table.release(t(1), &mut ledger);

        assert_eq!(first.freed, 0);
        assert_eq!(second, ReleaseOutcome::default());
        assert_eq!(
            layout(&table),
            vec![(r(0, 10), LockMode::Shared, vec![t(2)], 0)]
        );
    }

    #[test]
    fn test_release_drops_own_waiters() {
        let table = TableResource::<i32>::new("user");
        let mut ledger = PendingClaims::new();

        table.apply_for(t(1), &req(0, 10, LockMode::Exclusive), &mut ledger);
        table.apply_for(t(2), &req(5, 15, LockMode::Exclusive), &mut ledger);
        assert!(table.is_waiting(t(2)));

        let outcome = table.release(t(2), &mut ledger);

        assert_eq!(outcome.dropped, 1);
        assert!(!table.is_waiting(t(2)));
        assert_eq!(ledger.pending(t(2)), 0);
        assert_eq!(layout(&table), vec![(r(0, 10), LockMode::Exclusive, vec![t(1)], 0)]);
    }

    #[test]
    fn test_upgrade_granted_when_co_holder_leaves() {
        let table = TableResource::<i32>::new("user");
        let mut ledger = PendingClaims::new();

        table.apply_for(t(1), &req(0, 10, LockMode::Shared), &mut ledger);
        table.apply_for(t(2), &req(0, 10, LockMode::Shared), &mut ledger);
        let outcome = table.apply_for(t(1), &req(0, 10, LockMode::Exclusive), &mut ledger);
        assert_eq!(outcome, ApplyOutcome { granted: 0, queued: 1 });
        assert_eq!(ledger.pending(t(1)), 1);

        let outcome = table.release(t(2), &mut ledger);

        assert_eq!(outcome.replayed, 1);
        assert_eq!(ledger.pending(t(1)), 0);
        assert_eq!(ledger.take_runnable(), vec![t(1)]);
        assert!(!table.is_waiting(t(1)));
        assert_eq!(layout(&table), vec![(r(0, 10), LockMode::Exclusive, vec![t(1)], 0)]);
    }

    #[test]
    fn test_upgrade_waits_behind_earlier_waiter() {
        let table = TableResource::<i32>::new("user");
        let mut ledger = PendingClaims::new();

        table.apply_for(t(1), &req(0, 10, LockMode::Shared), &mut ledger);
        table.apply_for(t(2), &req(0, 10, LockMode::Shared), &mut ledger);
        table.apply_for(t(3), &req(0, 10, LockMode::Exclusive), &mut ledger);
        table.apply_for(t(1), &req(0, 10, LockMode::Exclusive), &mut ledger);

        let outcome = table.release(t(2), &mut ledger);

        assert_eq!(outcome.replayed, 0);
        assert!(table.is_waiting(t(1)));
        assert!(table.is_waiting(t(3)));
    }

    #[test]
    fn test_release_everything_empties_table() {
        let table = TableResource::<i32>::new("user");
        let mut ledger = PendingClaims::new();

        for i in 1..=5 {
            table.apply_for(t(i), &req(0, 10 * i as i32, LockMode::Shared), &mut ledger);
        }
        for i in 1..=5 {
            table.release(t(i), &mut ledger);
        }
        assert!(table.is_empty());
    }

    // ==================== Normalization Tests ====================

    #[test]
    fn test_apply_all_normalizes_own_overlap() {
        let table = TableResource::<i32>::new("user");
        let mut ledger = PendingClaims::new();

        let outcome = table.apply_all(
            t(1),
            &[req(40, 60, LockMode::Shared), req(30, 45, LockMode::Exclusive)],
            &mut ledger,
        );

        assert!(outcome.is_granted());
        assert_eq!(
            layout(&table),
            vec![
                (r(30, 45), LockMode::Exclusive, vec![t(1)], 0),
                (r(45, 60), LockMode::Shared, vec![t(1)], 0),
            ]
        );
    }

    #[test]
    fn test_sole_holder_upgrade() {
        let table = TableResource::<i32>::new("user");
        let mut ledger = PendingClaims::new();

        table.apply_for(t(1), &req(0, 10, LockMode::Shared), &mut ledger);
        let outcome = table.apply_for(t(1), &req(2, 4, LockMode::Exclusive), &mut ledger);

        assert!(outcome.is_granted());
        assert_eq!(
            layout(&table),
            vec![
                (r(0, 2), LockMode::Shared, vec![t(1)], 0),
                (r(2, 4), LockMode::Exclusive, vec![t(1)], 0),
                (r(4, 10), LockMode::Shared, vec![t(1)], 0),
            ]
        );
    }

    // ==================== Metrics Tests ====================

    #[test]
    fn test_metrics_counters() {
        let metrics = Metrics::shared();
        let table = TableResource::<i32>::new("user").with_metrics(Arc::clone(&metrics));
        let mut ledger = PendingClaims::new();

        table.apply_for(t(1), &req(0, 10, LockMode::Exclusive), &mut ledger);
        table.apply_for(t(2), &req(0, 10, LockMode::Exclusive), &mut ledger);
        table.release(t(1), &mut ledger);

        assert_eq!(metrics.get_counter(names::LOCK_GRANTED), Some(1));
        assert_eq!(metrics.get_counter(names::LOCK_QUEUED), Some(1));
        assert_eq!(metrics.get_counter(names::LOCK_REPLAYED), Some(1));
        assert_eq!(metrics.get_counter(names::LOCK_SEGMENTS_FREED), Some(1));
    }

    // ==================== Concurrency Tests ====================

    #[test]
    fn test_concurrent_disjoint_applications() {
        let table = Arc::new(TableResource::<i32>::new("user"));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let table = Arc::clone(&table);
                thread::spawn(move || {
                    let mut ledger = PendingClaims::new();
                    let lo = i * 100;
                    for j in 0..10 {
                        let outcome = table.apply_for(
                            t((i * 10 + j) as u64),
                            &req(lo + j * 10, lo + j * 10 + 10, LockMode::Exclusive),
                            &mut ledger,
                        );
                        assert!(outcome.is_granted());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(table.len(), 80);
    }
}
