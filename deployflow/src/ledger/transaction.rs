//! Transaction description handed to the ledger client.
//!
//! Balancing, fee calculation and signing belong to the client; a
//! [`Transaction`] only states what must be consumed, referenced, minted and
//! produced.

use crate::core::identity::hex_serde;
use crate::core::{Address, AssetId, AssetName, Datum, DatumHash, OutputRef, Quantity, ScriptHash, Value};
use serde::{Deserialize, Serialize};

/// An input the transaction consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// The consumed output.
    pub out_ref: OutputRef,
    /// Redeemer passed to the guarding script, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redeemer: Option<Datum>,
}

/// A token mint with its policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mint {
    /// Minting policy identity.
    pub policy: ScriptHash,
    /// Asset name under the policy.
    pub asset_name: AssetName,
    /// Minted amount.
    pub quantity: Quantity,
    /// Policy code when attached directly instead of via a reference input.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_hex")]
    pub script: Option<Vec<u8>>,
    /// Mint redeemer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redeemer: Option<Datum>,
}

impl Mint {
    /// Returns the asset id being minted.
    #[must_use]
    pub fn asset_id(&self) -> AssetId {
        AssetId::new(self.policy, self.asset_name.clone())
    }
}

/// How a datum is attached to an output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputDatum {
    /// Datum stored in full inside the output.
    Inline(Datum),
    /// Only the hash is stored in the output; the datum travels in the witness set.
    Hashed(Datum),
}

impl OutputDatum {
    /// Returns the underlying datum.
    #[must_use]
    pub const fn datum(&self) -> &Datum {
        match self {
            Self::Inline(d) | Self::Hashed(d) => d,
        }
    }

    /// Returns the datum hash.
    #[must_use]
    pub fn hash(&self) -> DatumHash {
        self.datum().hash()
    }
}

/// An output produced by a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Owner of the output.
    pub address: Address,
    /// Coin and tokens held.
    pub value: Value,
    /// Attached datum.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datum: Option<OutputDatum>,
    /// Script code published with this output.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_hex")]
    pub script_ref: Option<Vec<u8>>,
}

impl TxOutput {
    /// Creates a plain output.
    #[must_use]
    pub const fn new(address: Address, value: Value) -> Self {
        Self {
            address,
            value,
            datum: None,
            script_ref: None,
        }
    }

    /// Attaches a datum.
    #[must_use]
    pub fn with_datum(mut self, datum: OutputDatum) -> Self {
        self.datum = Some(datum);
        self
    }

    /// Attaches script code as a reusable reference.
    #[must_use]
    pub fn with_script_ref(mut self, code: Vec<u8>) -> Self {
        self.script_ref = Some(code);
        self
    }

    /// Identity of the attached reference script, if any.
    #[must_use]
    pub fn script_ref_hash(&self) -> Option<ScriptHash> {
        self.script_ref.as_deref().map(ScriptHash::digest)
    }
}

/// An unspent output together with its location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    /// Where the output lives.
    pub out_ref: OutputRef,
    /// The output itself.
    pub output: TxOutput,
}

/// A transaction to submit.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Transaction {
    /// Consumed inputs.
    pub inputs: Vec<TxInput>,
    /// Read-only reference inputs.
    pub reference_inputs: Vec<OutputRef>,
    /// Token mints.
    pub mints: Vec<Mint>,
    /// Produced outputs, in order.
    pub outputs: Vec<TxOutput>,
    /// Free-form label for logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Transaction {
    /// Starts building a transaction.
    #[must_use]
    pub fn builder() -> TransactionBuilder {
        TransactionBuilder::default()
    }

    /// Value minted by this transaction.
    #[must_use]
    pub fn minted_value(&self) -> Value {
        self.mints
            .iter()
            .fold(Value::default(), |acc, m| acc.with_asset(m.asset_id(), m.quantity))
    }

    /// Canonical body encoding, used to derive transaction ids.
    #[must_use]
    pub fn body_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Fluent builder for [`Transaction`].
#[derive(Debug, Default)]
pub struct TransactionBuilder {
    tx: Transaction,
}

impl TransactionBuilder {
    /// Consumes an output.
    #[must_use]
    pub fn spend(mut self, out_ref: OutputRef, redeemer: Option<Datum>) -> Self {
        self.tx.inputs.push(TxInput { out_ref, redeemer });
        self
    }

    /// Adds read-only reference inputs, skipping duplicates.
    #[must_use]
    pub fn read_from(mut self, refs: impl IntoIterator<Item = OutputRef>) -> Self {
        for r in refs {
            if !self.tx.reference_inputs.contains(&r) {
                self.tx.reference_inputs.push(r);
            }
        }
        self
    }

    /// Adds a mint.
    #[must_use]
    pub fn mint(mut self, mint: Mint) -> Self {
        self.tx.mints.push(mint);
        self
    }

    /// Adds an output.
    #[must_use]
    pub fn pay_to(mut self, output: TxOutput) -> Self {
        self.tx.outputs.push(output);
        self
    }

    /// Sets the log label.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.tx.label = Some(label.into());
        self
    }

    /// Finishes the transaction.
    #[must_use]
    pub fn build(self) -> Transaction {
        self.tx
    }
}

mod opt_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => super::hex_serde::serialize(b, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let s: Option<String> = Option::deserialize(deserializer)?;
        s.map(|s| hex::decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
