//! Cut points in an ordered key space

use std::cmp::Ordering;
use std::fmt;

/// A cut between two neighbouring positions of a key space
///
/// `Below(k)` sits immediately before `k` and `Above(k)` immediately after
/// it, so `Below(a) < Above(a) < Below(b)` whenever `a < b`. A half-open
/// range `[l, r)` is `[Below(l), Below(r))` and the single point `{p}` is
/// `[Below(p), Above(p))`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Boundary<K> {
    /// Just before the key
    Below(K),
    /// Just after the key
    Above(K),
}

impl<K> Boundary<K> {
    /// The key this boundary is attached to
    pub fn key(&self) -> &K {
        match self {
            Boundary::Below(k) | Boundary::Above(k) => k,
        }
    }

    fn side(&self) -> u8 {
        match self {
            Boundary::Below(_) => 0,
            Boundary::Above(_) => 1,
        }
    }
}

impl<K: Ord> Ord for Boundary<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key()
            .cmp(other.key())
            .then_with(|| self.side().cmp(&other.side()))
    }
}

impl<K: Ord> PartialOrd for Boundary<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: fmt::Display> fmt::Display for Boundary<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Boundary::Below(k) => write!(f, "{}", k),
            Boundary::Above(k) => write!(f, "{}+", k),
        }
    }
}
