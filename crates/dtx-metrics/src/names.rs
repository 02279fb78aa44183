//! Metric names recorded by the dtx crates

/// Lock claims granted on first application
pub const LOCK_GRANTED: &str = "lock.granted";
/// Lock claims queued behind a conflicting segment
pub const LOCK_QUEUED: &str = "lock.queued";
/// Queued claims replayed after a segment was freed
pub const LOCK_REPLAYED: &str = "lock.replayed";
/// Segments freed by release passes
pub const LOCK_SEGMENTS_FREED: &str = "lock.segments_freed";

/// Transactions accepted by `schedule`
pub const TXN_SCHEDULED: &str = "txn.scheduled";
/// Transactions that parked waiting for ranges
pub const TXN_PARKED: &str = "txn.parked";
/// Transactions handed to the ready stage
pub const TXN_READY: &str = "txn.ready";
/// Transactions whose ranges were released
pub const TXN_RELEASED: &str = "txn.released";
/// Transactions rejected during allocation
pub const TXN_FAILED: &str = "txn.failed";
/// Transactions committed
pub const TXN_COMMITTED: &str = "txn.committed";
/// Transactions fully rolled back
pub const TXN_ROLLED_BACK: &str = "txn.rolled_back";
/// Transactions whose rollback left residue
pub const TXN_ROLLBACK_FAILED: &str = "txn.rollback_failed";

/// Generations fired
pub const GENERATION_FIRED: &str = "generation.fired";
/// Unit tasks that completed normally
pub const TASK_NORMAL: &str = "task.normal";
/// Unit tasks that signalled abort
pub const TASK_ABORTED: &str = "task.aborted";
/// Compensations that succeeded
pub const ROLLBACK_SUCCEEDED: &str = "rollback.succeeded";
/// Compensations retried after a failure
pub const ROLLBACK_RETRIED: &str = "rollback.retried";
/// Compensations that failed permanently
pub const ROLLBACK_FAILED: &str = "rollback.failed";

/// Current number of parked transactions
pub const GAUGE_PARKED: &str = "scheduler.parked";

/// Time spent allocating one transaction's ranges
pub const HIST_ALLOCATION: &str = "scheduler.allocation_us";
/// Time between scheduling and readiness
pub const HIST_WAIT: &str = "scheduler.wait_us";
