//! Key ranges and lock requests

use crate::boundary::Boundary;
use crate::error::{LockError, LockResult};
use dtx_primitives::LockMode;
use std::fmt;

/// Non-empty interval `[lo, hi)` between two boundaries
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyRange<K> {
    lo: Boundary<K>,
    hi: Boundary<K>,
}

impl<K: Ord + Clone + fmt::Debug> KeyRange<K> {
    /// Range over `[left, right)`, or the single point `left` when both keys
    /// are equal
    pub fn new(left: K, right: K) -> LockResult<Self> {
        match left.cmp(&right) {
            std::cmp::Ordering::Less => Ok(Self {
                lo: Boundary::Below(left),
                hi: Boundary::Below(right),
            }),
            std::cmp::Ordering::Equal => Ok(Self::point(left)),
            std::cmp::Ordering::Greater => Err(LockError::InvalidRange {
                left: format!("{:?}", left),
                right: format!("{:?}", right),
            }),
        }
    }
}

impl<K: Ord + Clone> KeyRange<K> {
    /// Range holding exactly one key
    pub fn point(key: K) -> Self {
        Self {
            lo: Boundary::Below(key.clone()),
            hi: Boundary::Above(key),
        }
    }

    /// Range between two boundaries, `None` when it would be empty
    pub fn between(lo: Boundary<K>, hi: Boundary<K>) -> Option<Self> {
        (lo < hi).then_some(Self { lo, hi })
    }

    /// Whether the two ranges share any position
    pub fn overlaps(&self, other: &Self) -> bool {
        self.lo < other.hi && other.lo < self.hi
    }

    /// Whether `other` lies entirely inside this range
    pub fn contains(&self, other: &Self) -> bool {
        self.lo <= other.lo && other.hi <= self.hi
    }

    /// Intersection of the two ranges
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let lo = (&self.lo).max(&other.lo).clone();
        let hi = (&self.hi).min(&other.hi).clone();
        Self::between(lo, hi)
    }
}

impl<K> KeyRange<K> {
    /// Lower boundary, inclusive
    pub fn lo(&self) -> &Boundary<K> {
        &self.lo
    }

    /// Upper boundary, exclusive
    pub fn hi(&self) -> &Boundary<K> {
        &self.hi
    }

    pub(crate) fn set_hi(&mut self, hi: Boundary<K>) {
        self.hi = hi;
    }

    pub(crate) fn set_lo(&mut self, lo: Boundary<K>) {
        self.lo = lo;
    }
}

impl<K: fmt::Display> fmt::Display for KeyRange<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.lo, self.hi)
    }
}

/// One range a transaction asks for, with the mode it needs
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockRequest<K> {
    /// Requested range
    pub range: KeyRange<K>,
    /// Requested mode
    pub mode: LockMode,
}

impl<K> LockRequest<K> {
    /// Create a request
    pub fn new(range: KeyRange<K>, mode: LockMode) -> Self {
        Self { range, mode }
    }
}
