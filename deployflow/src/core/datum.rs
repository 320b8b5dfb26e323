//! Structured data payloads attached to entity outputs.

use super::identity::hex_serde;
use super::{DatumHash, Integer};
use serde::{Deserialize, Serialize};

/// A schema-agnostic data record, the shape contract datums take on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Datum {
    /// Exact integer.
    Int(Integer),
    /// Raw bytes, hex encoded in JSON.
    Bytes(#[serde(with = "hex_serde")] Vec<u8>),
    /// Ordered list.
    List(Vec<Datum>),
    /// Association list; order is significant.
    Map(Vec<(Datum, Datum)>),
    /// Tagged constructor with positional fields.
    Constr {
        /// Constructor index.
        tag: u64,
        /// Constructor fields.
        fields: Vec<Datum>,
    },
}

impl Datum {
    /// The unit value, constructor 0 with no fields.
    #[must_use]
    pub const fn unit() -> Self {
        Self::Constr {
            tag: 0,
            fields: Vec::new(),
        }
    }

    /// Creates an integer datum.
    #[must_use]
    pub fn int(value: impl Into<Integer>) -> Self {
        Self::Int(value.into())
    }

    /// Creates a bytes datum.
    #[must_use]
    pub fn bytes(value: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(value.into())
    }

    /// Creates a constructor datum.
    #[must_use]
    pub const fn constr(tag: u64, fields: Vec<Self>) -> Self {
        Self::Constr { tag, fields }
    }

    /// Returns a constructor field by position.
    #[must_use]
    pub fn field(&self, index: usize) -> Option<&Self> {
        match self {
            Self::Constr { fields, .. } => fields.get(index),
            _ => None,
        }
    }

    /// Returns a copy with one constructor field replaced.
    #[must_use]
    pub fn with_field(&self, index: usize, value: Self) -> Option<Self> {
        match self {
            Self::Constr { tag, fields } if index < fields.len() => {
                let mut fields = fields.clone();
                fields[index] = value;
                Some(Self::Constr { tag: *tag, fields })
            }
            _ => None,
        }
    }

    /// Returns the integer if this is an `Int`.
    #[must_use]
    pub const fn as_int(&self) -> Option<Integer> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Canonical byte encoding.
    #[must_use]
    pub fn to_canonical_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Content hash of the datum.
    #[must_use]
    pub fn hash(&self) -> DatumHash {
        DatumHash::digest(&self.to_canonical_bytes())
    }
}

/// Encodes an unsigned integer as a CBOR data item.
///
/// Values above `u64::MAX` use the positive bignum tag.
#[must_use]
pub fn cbor_uint(value: u128) -> Vec<u8> {
    fn head(major: u8, n: u64) -> Vec<u8> {
        let m = major << 5;
        match n {
            0..=23 => vec![m | n as u8],
            24..=0xff => vec![m | 24, n as u8],
            0x100..=0xffff => {
                let mut out = vec![m | 25];
                out.extend_from_slice(&(n as u16).to_be_bytes());
                out
            }
            0x1_0000..=0xffff_ffff => {
                let mut out = vec![m | 26];
                out.extend_from_slice(&(n as u32).to_be_bytes());
                out
            }
            _ => {
                let mut out = vec![m | 27];
                out.extend_from_slice(&n.to_be_bytes());
                out
            }
        }
    }

    match u64::try_from(value) {
        Ok(n) => head(0, n),
        Err(_) => {
            let bytes = value.to_be_bytes();
            let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
            let magnitude = &bytes[first..];
            // tag 2 (positive bignum) wrapping a byte string
            let mut out = vec![0xc2];
            out.extend(head(2, magnitude.len() as u64));
            out.extend_from_slice(magnitude);
            out
        }
    }
}
