//! # dtx-lock
//!
//! Range lock tables for the dtx coordinator.
//!
//! A [`TableResource`] keeps the claimed part of one table's key space as a
//! sorted set of non-overlapping [`Segment`]s. Each segment is held by one
//! exclusive transaction or by several shared ones, and carries a FIFO queue
//! of conflicting requests clipped to its bounds. Releasing the last holder
//! of a segment removes it and replays its queue.
//!
//! Keys are cut with [`Boundary`] values so that single-point requests and
//! half-open ranges share one ordering.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod boundary;
mod error;
mod normalize;
mod ordered_map;
mod range;
mod segment;
mod table;

pub use boundary::Boundary;
pub use error::{LockError, LockResult};
pub use normalize::normalize_requests;
pub use ordered_map::OrderedMap;
pub use range::{KeyRange, LockRequest};
pub use segment::{Segment, SegmentView, Waiter};
pub use table::{ApplyOutcome, ClaimLedger, PendingClaims, ReleaseOutcome, TableResource};

pub use dtx_primitives::{LockMode, TxnId};
