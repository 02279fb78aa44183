//! Identifier newtypes

use std::fmt;

/// Transaction identifier
///
/// Usually produced by [`UniqueIdGenerator`](crate::UniqueIdGenerator), so ids
/// issued by one generator are ordered by creation time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TxnId(pub u64);

impl TxnId {
    /// Create a new transaction ID
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TxnId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn#{}", self.0)
    }
}

/// Unit task identifier, unique within one transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TaskId(pub u64);

impl TaskId {
    /// Create a new task ID
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Generation identifier
///
/// A generation is identified by the priority shared by all of its tasks, so
/// ordering generation ids orders the waves of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GenerationId(pub u32);

impl GenerationId {
    /// Create a generation ID from a priority
    pub const fn new(priority: u32) -> Self {
        Self(priority)
    }

    /// The priority this generation runs at
    pub const fn priority(&self) -> u32 {
        self.0
    }
}

impl From<u32> for GenerationId {
    fn from(priority: u32) -> Self {
        Self(priority)
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeSet, HashSet};

    #[test]
    fn test_txn_id_ordering() {
        let ids: BTreeSet<TxnId> = [TxnId::new(3), TxnId::new(1), TxnId::new(2)]
            .into_iter()
            .collect();
        let ordered: Vec<u64> = ids.iter().map(|id| id.as_u64()).collect();
        assert_eq!(ordered, vec![1, 2, 3]);
    }

    #[test]
    fn test_ids_hash() {
        let mut set = HashSet::new();
        set.insert(TaskId::new(7));
        set.insert(TaskId::new(7));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_display() {
        assert_eq!(TxnId::new(42).to_string(), "txn#42");
        assert_eq!(TaskId::new(5).to_string(), "task#5");
        assert_eq!(GenerationId::new(2).to_string(), "gen#2");
    }

    #[test]
    fn test_generation_priority() {
        let gen: GenerationId = 9u32.into();
        assert_eq!(gen.priority(), 9);
        assert!(GenerationId::new(1) < GenerationId::new(2));
    }
}
