//! Deterministic in-memory ledger.

use super::{LedgerClient, LedgerError, Transaction, TxOutput, TxStatus, Utxo};
use crate::core::{Address, KeyHash, OutputRef, Quantity, ScriptHash, TxId, Value};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Coin held by the wallet's genesis output.
const GENESIS_COIN: u128 = 1_000_000_000_000;
/// Coin placed on change outputs.
const CHANGE_COIN: u128 = 2_000_000;

#[derive(Debug)]
struct TxRecord {
    ordinal: usize,
    polls: usize,
    tx: Transaction,
    effects: Option<Effects>,
}

/// State changes held back until a transaction confirms.
#[derive(Debug)]
struct Effects {
    spent: Vec<OutputRef>,
    produced: Vec<TxOutput>,
}

#[derive(Debug, Default)]
struct LedgerState {
    utxos: BTreeMap<OutputRef, TxOutput>,
    spent: HashSet<OutputRef>,
    /// Inputs claimed by submitted but unconfirmed transactions.
    reserved: HashSet<OutputRef>,
    txs: HashMap<TxId, TxRecord>,
    history: Vec<TxId>,
    submissions: usize,
    never_confirm: HashSet<usize>,
    reject_submission: HashSet<usize>,
    reject_confirmation: HashSet<usize>,
    confirm_after_polls: usize,
}

/// A simulated ledger with a single funded wallet.
///
/// Transactions are validated on submission: inputs must exist and be
/// unspent, reference inputs must exist, and every mint must have its policy
/// code attached or available through a reference input. Token amounts the
/// outputs need beyond what inputs and mints supply are drawn from wallet
/// outputs; leftover tokens return to the wallet as a change output placed
/// after the declared outputs.
///
/// Effects apply when a status poll first reports the transaction confirmed.
/// Transaction ids hash the body together with the submission ordinal, so two
/// fresh ledgers fed the same sequence produce the same ids.
#[derive(Debug)]
pub struct InMemoryLedger {
    wallet: Address,
    state: Mutex<LedgerState>,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    /// Creates a ledger whose wallet holds one genesis output.
    #[must_use]
    pub fn new() -> Self {
        let wallet = Address::Key(KeyHash::digest(b"deployflow-wallet"));
        let mut state = LedgerState::default();
        state.utxos.insert(
            OutputRef::new(TxId::digest(b"genesis"), 0),
            TxOutput::new(wallet, Value::coin(Quantity::new(GENESIS_COIN))),
        );
        Self {
            wallet,
            state: Mutex::new(state),
        }
    }

    /// The funded wallet address.
    #[must_use]
    pub const fn wallet(&self) -> Address {
        self.wallet
    }

    /// Transactions with this 1-based submission ordinal stay pending forever.
    #[must_use]
    pub fn never_confirm(self, ordinal: usize) -> Self {
        self.state.lock().never_confirm.insert(ordinal);
        self
    }

    /// Submissions with this 1-based ordinal are refused outright.
    #[must_use]
    pub fn reject_submission(self, ordinal: usize) -> Self {
        self.state.lock().reject_submission.insert(ordinal);
        self
    }

    /// Transactions with this 1-based ordinal are accepted, then reported rejected.
    #[must_use]
    pub fn reject_confirmation(self, ordinal: usize) -> Self {
        self.state.lock().reject_confirmation.insert(ordinal);
        self
    }

    /// Every transaction reports pending for this many polls before confirming.
    #[must_use]
    pub fn confirm_after_polls(self, polls: usize) -> Self {
        self.state.lock().confirm_after_polls = polls;
        self
    }

    /// Adds an output directly, bypassing transactions.
    pub fn insert_output(&self, out_ref: OutputRef, output: TxOutput) {
        self.state.lock().utxos.insert(out_ref, output);
    }

    /// Number of submissions attempted, including refused ones.
    #[must_use]
    pub fn submission_count(&self) -> usize {
        self.state.lock().submissions
    }

    /// Accepted transactions in submission order.
    #[must_use]
    pub fn transactions(&self) -> Vec<Transaction> {
        let state = self.state.lock();
        state
            .history
            .iter()
            .filter_map(|id| state.txs.get(id).map(|r| r.tx.clone()))
            .collect()
    }

    /// Returns an unspent output.
    #[must_use]
    pub fn utxo(&self, out_ref: &OutputRef) -> Option<TxOutput> {
        self.state.lock().utxos.get(out_ref).cloned()
    }

    /// Returns true if the output was consumed by a confirmed transaction.
    #[must_use]
    pub fn is_spent(&self, out_ref: &OutputRef) -> bool {
        self.state.lock().spent.contains(out_ref)
    }

    fn validate(&self, state: &LedgerState, tx: &Transaction) -> Result<Effects, LedgerError> {
        let mut spent = Vec::with_capacity(tx.inputs.len());
        let mut supply = tx.minted_value();

        for input in &tx.inputs {
            if state.spent.contains(&input.out_ref) || state.reserved.contains(&input.out_ref) {
                return Err(LedgerError::InputSpent(input.out_ref));
            }
            let output = state
                .utxos
                .get(&input.out_ref)
                .ok_or(LedgerError::UnknownInput(input.out_ref))?;
            supply = add(&supply, &output.value)?;
            spent.push(input.out_ref);
        }

        let mut referenced_scripts: HashSet<ScriptHash> = HashSet::new();
        for r in &tx.reference_inputs {
            let output = state
                .utxos
                .get(r)
                .ok_or(LedgerError::MissingReference(*r))?;
            if let Some(hash) = output.script_ref_hash() {
                referenced_scripts.insert(hash);
            }
        }

        for mint in &tx.mints {
            let attached = mint
                .script
                .as_deref()
                .is_some_and(|code| ScriptHash::digest(code) == mint.policy);
            if !attached && !referenced_scripts.contains(&mint.policy) {
                return Err(LedgerError::MissingScript(mint.policy));
            }
        }

        let demand = tx
            .outputs
            .iter()
            .try_fold(Value::default(), |acc, o| add(&acc, &o.value))?;

        // Draw missing tokens from wallet outputs not already used.
        for (asset, needed) in &demand.assets {
            for (out_ref, output) in &state.utxos {
                if supply.asset(asset) >= *needed {
                    break;
                }
                if output.address != self.wallet
                    || output.value.asset(asset) == Quantity::ZERO
                    || spent.contains(out_ref)
                    || state.reserved.contains(out_ref)
                {
                    continue;
                }
                supply = add(&supply, &output.value)?;
                spent.push(*out_ref);
            }
            if supply.asset(asset) < *needed {
                return Err(LedgerError::InsufficientFunds(format!(
                    "wallet holds {} of {asset}, transaction needs {needed}",
                    supply.asset(asset)
                )));
            }
        }

        let change = supply
            .checked_sub_assets(&demand)
            .ok_or_else(|| LedgerError::InsufficientFunds("token balance underflow".into()))?;

        let mut produced = tx.outputs.clone();
        if !change.has_no_assets() {
            let mut value = Value::coin(Quantity::new(CHANGE_COIN));
            value.assets = change.assets;
            produced.push(TxOutput::new(self.wallet, value));
        }

        Ok(Effects { spent, produced })
    }
}

fn add(a: &Value, b: &Value) -> Result<Value, LedgerError> {
    a.checked_add(b)
        .ok_or_else(|| LedgerError::Rejected("value overflow".into()))
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn wallet_address(&self) -> Result<Address, LedgerError> {
        Ok(self.wallet)
    }

    async fn submit(&self, tx: Transaction) -> Result<TxId, LedgerError> {
        let mut state = self.state.lock();
        state.submissions += 1;
        let ordinal = state.submissions;

        if state.reject_submission.contains(&ordinal) {
            return Err(LedgerError::Rejected(format!("submission {ordinal} refused")));
        }

        let effects = self.validate(&state, &tx)?;

        let mut body = tx.body_bytes();
        body.extend_from_slice(&(ordinal as u64).to_be_bytes());
        let tx_id = TxId::digest(&body);

        state.reserved.extend(effects.spent.iter().copied());
        debug!(
            tx_id = %tx_id,
            ordinal = ordinal,
            label = tx.label.as_deref().unwrap_or(""),
            outputs = effects.produced.len(),
            "Transaction accepted"
        );
        state.history.push(tx_id);
        state.txs.insert(
            tx_id,
            TxRecord {
                ordinal,
                polls: 0,
                tx,
                effects: Some(effects),
            },
        );
        Ok(tx_id)
    }

    async fn confirmation_status(&self, tx_id: TxId) -> Result<TxStatus, LedgerError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let confirm_after = state.confirm_after_polls;
        let record = state
            .txs
            .get_mut(&tx_id)
            .ok_or(LedgerError::UnknownTransaction(tx_id))?;

        if state.never_confirm.contains(&record.ordinal) {
            return Ok(TxStatus::Pending);
        }
        if state.reject_confirmation.contains(&record.ordinal) {
            if let Some(effects) = record.effects.take() {
                for r in &effects.spent {
                    state.reserved.remove(r);
                }
            }
            return Ok(TxStatus::Rejected(format!("transaction {tx_id} dropped")));
        }

        record.polls += 1;
        if record.polls <= confirm_after {
            return Ok(TxStatus::Pending);
        }

        if let Some(effects) = record.effects.take() {
            for r in effects.spent {
                state.reserved.remove(&r);
                state.utxos.remove(&r);
                state.spent.insert(r);
            }
            for (index, output) in effects.produced.into_iter().enumerate() {
                state.utxos.insert(OutputRef::new(tx_id, index as u64), output);
            }
        }
        Ok(TxStatus::Confirmed)
    }

    async fn query_outputs_by_reference(
        &self,
        refs: &[OutputRef],
    ) -> Result<Vec<Option<TxOutput>>, LedgerError> {
        let state = self.state.lock();
        Ok(refs.iter().map(|r| state.utxos.get(r).cloned()).collect())
    }

    async fn select_spendable_inputs(&self, address: &Address) -> Result<Vec<Utxo>, LedgerError> {
        let state = self.state.lock();
        Ok(state
            .utxos
            .iter()
            .filter(|(r, o)| o.address == *address && !state.reserved.contains(r))
            .map(|(r, o)| Utxo {
                out_ref: *r,
                output: o.clone(),
            })
            .collect())
    }
}
