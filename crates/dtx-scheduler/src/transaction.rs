//! Transactions and their admission stage

use crate::resource::RangeRequest;
use dtx_primitives::TxnId;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::OwnedSemaphorePermit;

/// Admission stage of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxnStage {
    /// Waiting for the allocation loop
    Unallocated,
    /// Allocated, some ranges still queued
    Parked,
    /// Every range granted
    Ready,
    /// Ranges returned
    Released,
    /// Rejected during allocation
    Failed,
}

/// A set of range requests admitted as one unit
pub struct Transaction {
    id: TxnId,
    ranges: Vec<RangeRequest>,
    /// Queued claims not yet resolved
    pending: AtomicUsize,
    /// First allocation pass finished
    allocated: AtomicBool,
    stage: Mutex<TxnStage>,
    /// Parked-stage slot, held while parked
    permit: Mutex<Option<OwnedSemaphorePermit>>,
    created_at: Instant,
}

impl Transaction {
    /// Create a transaction over `ranges`
    pub fn new(id: TxnId, ranges: Vec<RangeRequest>) -> Self {
        Self {
            id,
            ranges,
            pending: AtomicUsize::new(0),
            allocated: AtomicBool::new(false),
            stage: Mutex::new(TxnStage::Unallocated),
            permit: Mutex::new(None),
            created_at: Instant::now(),
        }
    }

    /// Add one more range before scheduling
    pub fn with_range(mut self, range: RangeRequest) -> Self {
        self.ranges.push(range);
        self
    }

    /// Transaction id
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Requested ranges in submission order
    pub fn ranges(&self) -> &[RangeRequest] {
        &self.ranges
    }

    /// Requested ranges grouped by table, tables in name order
    pub fn tables(&self) -> BTreeMap<&str, Vec<&RangeRequest>> {
        let mut tables: BTreeMap<&str, Vec<&RangeRequest>> = BTreeMap::new();
        for range in &self.ranges {
            tables.entry(range.table.as_str()).or_default().push(range);
        }
        tables
    }

    /// Number of queued claims not yet resolved
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Whether the first allocation pass has finished
    pub fn is_allocated(&self) -> bool {
        self.allocated.load(Ordering::Acquire)
    }

    /// Current stage
    pub fn stage(&self) -> TxnStage {
        *self.stage.lock()
    }

    /// Whether every range is granted
    pub fn is_ready(&self) -> bool {
        self.stage() == TxnStage::Ready
    }

    /// Time since the transaction was created
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub(crate) fn claim_queued(&self) {
        self.pending.fetch_add(1, Ordering::AcqRel);
    }

    /// Resolve one queued claim, true when the last one of an allocated
    /// transaction resolved
    pub(crate) fn claim_resolved(&self) -> bool {
        let previous = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .unwrap_or(0);
        previous == 1 && self.is_allocated()
    }

    pub(crate) fn clear_pending(&self) {
        self.pending.store(0, Ordering::Release);
    }

    /// Finish the first allocation pass, true when nothing is queued
    pub(crate) fn mark_allocated(&self) -> bool {
        self.allocated.store(true, Ordering::Release);
        self.pending() == 0
    }

    /// Move to `to` if the current stage is one of `from`
    pub(crate) fn advance(&self, from: &[TxnStage], to: TxnStage) -> bool {
        let mut stage = self.stage.lock();
        if from.contains(&*stage) {
            *stage = to;
            true
        } else {
            false
        }
    }

    pub(crate) fn park(&self, permit: OwnedSemaphorePermit) -> bool {
        if self.advance(&[TxnStage::Unallocated], TxnStage::Parked) {
            *self.permit.lock() = Some(permit);
            true
        } else {
            false
        }
    }

    pub(crate) fn unpark(&self) {
        self.permit.lock().take();
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("ranges", &self.ranges.len())
            .field("pending", &self.pending())
            .field("stage", &self.stage())
            .finish()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}
