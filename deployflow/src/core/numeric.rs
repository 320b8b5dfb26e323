//! Exact integer types for ledger quantities.
//!
//! Quantities routinely exceed 2^53, the largest integer a JSON reader backed
//! by `f64` keeps exactly. Both types therefore serialize as decimal strings,
//! accept plain JSON integers on input, and refuse floating-point input
//! outright instead of truncating it.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Prefix of the deserialization error raised for floating-point input.
pub const PRECISION_LOSS_MARKER: &str = "precision loss";

macro_rules! exact_integer {
    ($(#[$meta:meta])* $name:ident, $inner:ty, $expecting:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name($inner);

        impl $name {
            /// Zero.
            pub const ZERO: Self = Self(0);

            /// Wraps a raw value.
            #[must_use]
            pub const fn new(value: $inner) -> Self {
                Self(value)
            }

            /// Returns the raw value.
            #[must_use]
            pub const fn get(self) -> $inner {
                self.0
            }

            /// Adds, returning `None` on overflow.
            #[must_use]
            pub const fn checked_add(self, other: Self) -> Option<Self> {
                match self.0.checked_add(other.0) {
                    Some(v) => Some(Self(v)),
                    None => None,
                }
            }

            /// Subtracts, returning `None` on underflow.
            #[must_use]
            pub const fn checked_sub(self, other: Self) -> Option<Self> {
                match self.0.checked_sub(other.0) {
                    Some(v) => Some(Self(v)),
                    None => None,
                }
            }
        }

        impl From<$inner> for $name {
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<$inner>().map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                struct ExactVisitor;

                impl<'de> Visitor<'de> for ExactVisitor {
                    type Value = $name;

                    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                        f.write_str($expecting)
                    }

                    fn visit_str<E: de::Error>(self, v: &str) -> Result<$name, E> {
                        v.parse::<$name>().map_err(|e| E::custom(format!("invalid integer '{v}': {e}")))
                    }

                    fn visit_u64<E: de::Error>(self, v: u64) -> Result<$name, E> {
                        <$inner>::try_from(v)
                            .map($name)
                            .map_err(|_| E::custom(format!("integer {v} out of range")))
                    }

                    fn visit_i64<E: de::Error>(self, v: i64) -> Result<$name, E> {
                        <$inner>::try_from(v)
                            .map($name)
                            .map_err(|_| E::custom(format!("integer {v} out of range")))
                    }

                    fn visit_u128<E: de::Error>(self, v: u128) -> Result<$name, E> {
                        <$inner>::try_from(v)
                            .map($name)
                            .map_err(|_| E::custom(format!("integer {v} out of range")))
                    }

                    fn visit_i128<E: de::Error>(self, v: i128) -> Result<$name, E> {
                        <$inner>::try_from(v)
                            .map($name)
                            .map_err(|_| E::custom(format!("integer {v} out of range")))
                    }

                    fn visit_f64<E: de::Error>(self, v: f64) -> Result<$name, E> {
                        Err(E::custom(format!(
                            "{PRECISION_LOSS_MARKER}: floating-point value {v} cannot represent an exact integer"
                        )))
                    }
                }

                deserializer.deserialize_any(ExactVisitor)
            }
        }
    };
}

exact_integer!(
    /// A non-negative ledger quantity (coin, token amount, execution budget).
    Quantity,
    u128,
    "a non-negative integer or decimal string"
);

exact_integer!(
    /// A signed integer carried in datums.
    Integer,
    i128,
    "an integer or decimal string"
);

impl From<u64> for Quantity {
    fn from(value: u64) -> Self {
        Self(u128::from(value))
    }
}

impl From<u32> for Quantity {
    fn from(value: u32) -> Self {
        Self(u128::from(value))
    }
}

impl From<i64> for Integer {
    fn from(value: i64) -> Self {
        Self(i128::from(value))
    }
}

impl From<u64> for Integer {
    fn from(value: u64) -> Self {
        Self(i128::from(value))
    }
}

impl TryFrom<Integer> for Quantity {
    type Error = std::num::TryFromIntError;

    fn try_from(value: Integer) -> Result<Self, Self::Error> {
        u128::try_from(value.get()).map(Self)
    }
}
