//! Core domain model types for deployflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Content-derived identities, output references and addresses
//! - Exact integer quantities
//! - Multi-asset values, execution budgets and datums

mod datum;
pub mod identity;
mod numeric;
mod value;

pub use datum::{cbor_uint, Datum};
pub use identity::{
    Address, AssetId, AssetName, DatumHash, IdentityParseError, KeyHash, OutputRef, ScriptHash,
    TxId,
};
pub use numeric::{Integer, Quantity, PRECISION_LOSS_MARKER};
pub use value::{ExUnits, Value};
