//! Lock modes for range requests

use crate::error::PrimitiveError;
use std::fmt;
use std::str::FromStr;

/// Lock mode of a range request
///
/// | Requested \ Held | S   | X  |
/// |------------------|-----|----|
/// |        S         | Yes | No |
/// |        X         | No  | No |
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LockMode {
    /// Read lock, compatible with other shared locks
    Shared,
    /// Write lock, compatible with nothing
    Exclusive,
}

impl LockMode {
    /// Whether a request in `self` mode may share a segment held in `held` mode
    pub const fn is_compatible_with(self, held: LockMode) -> bool {
        matches!((self, held), (LockMode::Shared, LockMode::Shared))
    }

    /// The stronger of two modes
    pub fn strongest(self, other: LockMode) -> LockMode {
        self.max(other)
    }

    /// Short name used in logs (`S` / `X`)
    pub const fn as_str(&self) -> &'static str {
        match self {
            LockMode::Shared => "S",
            LockMode::Exclusive => "X",
        }
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LockMode {
    type Err = PrimitiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "s" | "shared" | "read" => Ok(LockMode::Shared),
            "x" | "exclusive" | "write" => Ok(LockMode::Exclusive),
            _ => Err(PrimitiveError::UnknownLockMode(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compatibility_matrix() {
        assert!(LockMode::Shared.is_compatible_with(LockMode::Shared));
        assert!(!LockMode::Shared.is_compatible_with(LockMode::Exclusive));
        assert!(!LockMode::Exclusive.is_compatible_with(LockMode::Shared));
        assert!(!LockMode::Exclusive.is_compatible_with(LockMode::Exclusive));
    }

    #[test]
    fn test_strongest() {
        assert_eq!(LockMode::Shared.strongest(LockMode::Exclusive), LockMode::Exclusive);
        assert_eq!(LockMode::Shared.strongest(LockMode::Shared), LockMode::Shared);
    }

    #[test]
    fn test_parse() {
        assert_eq!("X".parse::<LockMode>().unwrap(), LockMode::Exclusive);
        assert_eq!("shared".parse::<LockMode>().unwrap(), LockMode::Shared);
        assert_eq!(
            "upgrade".parse::<LockMode>(),
            Err(PrimitiveError::UnknownLockMode("upgrade".into()))
        );
    }
}
