//! Content-derived identities, output references and addresses.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised when parsing identities from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityParseError {
    /// The input is not valid hex.
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    /// The decoded bytes have the wrong length.
    #[error("Expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Expected byte length.
        expected: usize,
        /// Actual byte length.
        actual: usize,
    },

    /// The input does not follow the expected `a#b` / `a.b` shape.
    #[error("Malformed reference: {0}")]
    Malformed(String),
}

/// Serde helpers for hex-encoded byte vectors.
pub mod hex_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serializes bytes as a lowercase hex string.
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    /// Deserializes bytes from a hex string.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

macro_rules! fixed_hash {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name([u8; $len]);

        impl $name {
            /// Byte length of this identity.
            pub const LEN: usize = $len;

            /// Wraps raw bytes.
            #[must_use]
            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Returns the raw bytes.
            #[must_use]
            pub const fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Returns the lowercase hex encoding.
            #[must_use]
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Parses a hex string of exactly the right length.
            pub fn from_hex(s: &str) -> Result<Self, IdentityParseError> {
                let bytes = hex::decode(s).map_err(|e| IdentityParseError::InvalidHex(e.to_string()))?;
                let arr: [u8; $len] = bytes.as_slice().try_into().map_err(|_| {
                    IdentityParseError::InvalidLength {
                        expected: $len,
                        actual: bytes.len(),
                    }
                })?;
                Ok(Self(arr))
            }

            /// Derives an identity from content: SHA-256, truncated to the identity length.
            #[must_use]
            pub fn digest(data: &[u8]) -> Self {
                let full = Sha256::digest(data);
                let mut out = [0u8; $len];
                out.copy_from_slice(&full[..$len]);
                Self(out)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = IdentityParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

fixed_hash!(
    /// Identity of a script: validator hash or minting policy id.
    ScriptHash,
    28
);

fixed_hash!(
    /// Hash of a verification key, used for wallet addresses.
    KeyHash,
    28
);

fixed_hash!(
    /// Transaction identifier.
    TxId,
    32
);

fixed_hash!(
    /// Hash of a datum payload.
    DatumHash,
    32
);

/// Reference to a specific transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutputRef {
    /// The producing transaction.
    pub tx_id: TxId,
    /// Position in the transaction's output list.
    pub index: u64,
}

impl OutputRef {
    /// Creates a new output reference.
    #[must_use]
    pub const fn new(tx_id: TxId, index: u64) -> Self {
        Self { tx_id, index }
    }

    /// Canonical byte encoding used when the reference is a script parameter.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(TxId::LEN + 8);
        out.extend_from_slice(self.tx_id.as_bytes());
        out.extend_from_slice(&self.index.to_be_bytes());
        out
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tx_id, self.index)
    }
}

impl FromStr for OutputRef {
    type Err = IdentityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tx, ix) = s
            .split_once('#')
            .ok_or_else(|| IdentityParseError::Malformed(s.to_string()))?;
        let index = ix
            .parse::<u64>()
            .map_err(|_| IdentityParseError::Malformed(s.to_string()))?;
        Ok(Self::new(TxId::from_hex(tx)?, index))
    }
}

/// Maximum asset name length in bytes.
pub const MAX_ASSET_NAME_LEN: usize = 32;

/// Name of a token under a minting policy.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AssetName(Vec<u8>);

impl AssetName {
    /// Creates an asset name from raw bytes.
    pub fn new(bytes: Vec<u8>) -> Result<Self, IdentityParseError> {
        if bytes.len() > MAX_ASSET_NAME_LEN {
            return Err(IdentityParseError::InvalidLength {
                expected: MAX_ASSET_NAME_LEN,
                actual: bytes.len(),
            });
        }
        Ok(Self(bytes))
    }

    /// Creates an asset name from UTF-8 text.
    pub fn utf8(text: &str) -> Result<Self, IdentityParseError> {
        Self::new(text.as_bytes().to_vec())
    }

    /// Creates a run-scoped asset name: `base` followed by the run suffix.
    pub fn suffixed(base: &str, suffix: &str) -> Result<Self, IdentityParseError> {
        Self::utf8(&format!("{base}{suffix}"))
    }

    /// Parses a hex-encoded asset name.
    pub fn from_hex(s: &str) -> Result<Self, IdentityParseError> {
        let bytes = hex::decode(s).map_err(|e| IdentityParseError::InvalidHex(e.to_string()))?;
        Self::new(bytes)
    }

    /// Returns the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the hex encoding.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Display for AssetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for AssetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(text) if text.chars().all(|c| c.is_ascii_graphic()) => write!(f, "AssetName({text:?})"),
            _ => write!(f, "AssetName({})", self.to_hex()),
        }
    }
}

impl Serialize for AssetName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for AssetName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Fully qualified token identity: minting policy plus asset name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssetId {
    /// Minting policy.
    pub policy: ScriptHash,
    /// Asset name under the policy.
    pub name: AssetName,
}

impl AssetId {
    /// Creates a new asset id.
    #[must_use]
    pub const fn new(policy: ScriptHash, name: AssetName) -> Self {
        Self { policy, name }
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.policy, self.name)
    }
}

impl FromStr for AssetId {
    type Err = IdentityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (policy, name) = s
            .split_once('.')
            .ok_or_else(|| IdentityParseError::Malformed(s.to_string()))?;
        Ok(Self::new(ScriptHash::from_hex(policy)?, AssetName::from_hex(name)?))
    }
}

impl Serialize for AssetId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AssetId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A ledger address, owned either by a script or by a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Address {
    /// Locked by a script; spending runs the script.
    Script(ScriptHash),
    /// Locked by a verification key.
    Key(KeyHash),
}

impl Address {
    /// Address that can never be spent from. Reference scripts are parked here.
    #[must_use]
    pub fn locked() -> Self {
        Self::Script(ScriptHash::digest(b"native-script:before-slot:0"))
    }

    /// Returns the script hash if this is a script address.
    #[must_use]
    pub const fn script_hash(&self) -> Option<ScriptHash> {
        match self {
            Self::Script(hash) => Some(*hash),
            Self::Key(_) => None,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Script(hash) => write!(f, "script:{hash}"),
            Self::Key(hash) => write!(f, "key:{hash}"),
        }
    }
}
