//! Totally ordered float wrappers
//!
//! `Double` and `Float` tables need keys that implement `Ord`. NaN is rejected
//! at construction so `total_cmp` agrees with the numeric order.

use crate::error::{PrimitiveError, PrimitiveResult};
use std::cmp::Ordering;
use std::fmt;

macro_rules! ordered_float {
    ($name:ident, $float:ty) => {
        #[doc = concat!("`", stringify!($float), "` with a total order, never NaN")]
        #[derive(Clone, Copy, Debug)]
        pub struct $name($float);

        impl $name {
            /// Wrap a float, rejecting NaN
            pub fn new(value: $float) -> PrimitiveResult<Self> {
                if value.is_nan() {
                    Err(PrimitiveError::NanKey)
                } else {
                    Ok(Self(value))
                }
            }

            /// The wrapped value
            pub fn get(&self) -> $float {
                self.0
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.cmp(other) == Ordering::Equal
            }
        }

        impl Eq for $name {}

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                self.0.total_cmp(&other.0)
            }
        }

        impl std::hash::Hash for $name {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                self.0.to_bits().hash(state);
            }
        }

        impl TryFrom<$float> for $name {
            type Error = PrimitiveError;

            fn try_from(value: $float) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

ordered_float!(OrderedF64, f64);
ordered_float!(OrderedF32, f32);
