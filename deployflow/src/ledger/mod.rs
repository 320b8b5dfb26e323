//! Ledger client boundary.
//!
//! The orchestrator never talks to a node directly. Everything it needs from
//! the ledger goes through [`LedgerClient`]: submitting a transaction,
//! polling its confirmation status, reading outputs back and selecting
//! wallet inputs. [`InMemoryLedger`] is a deterministic simulation used by
//! the test suite and local dry runs.

mod memory;
mod transaction;

pub use memory::InMemoryLedger;
pub use transaction::{Mint, OutputDatum, Transaction, TransactionBuilder, TxInput, TxOutput, Utxo};

use crate::core::{Address, OutputRef, ScriptHash, TxId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Errors reported by a ledger client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The ledger refused the transaction.
    #[error("Transaction rejected: {0}")]
    Rejected(String),

    /// An input was already spent.
    #[error("Input {0} is already spent")]
    InputSpent(OutputRef),

    /// An input does not exist.
    #[error("Input {0} does not exist")]
    UnknownInput(OutputRef),

    /// A reference input does not exist.
    #[error("Reference input {0} does not exist")]
    MissingReference(OutputRef),

    /// A mint names a policy whose code is neither attached nor referenced.
    #[error("No script available for policy {0}")]
    MissingScript(ScriptHash),

    /// The wallet cannot cover what the transaction requires.
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    /// The ledger has never seen this transaction.
    #[error("Unknown transaction {0}")]
    UnknownTransaction(TxId),

    /// The connection to the ledger failed.
    #[error("Ledger transport error: {0}")]
    Transport(String),
}

/// Status of a submitted transaction as reported by one poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    /// Not yet included.
    Pending,
    /// Included and final.
    Confirmed,
    /// Dropped by the ledger.
    Rejected(String),
}

/// Outcome of a bounded confirmation wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confirmation {
    /// The transaction is confirmed.
    Confirmed,
    /// The wait ran out; the outcome is unknown.
    TimedOut,
    /// The ledger rejected the transaction after submission.
    Rejected(String),
}

/// How long to wait for confirmations, and how often to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    /// Upper bound on the wait.
    pub timeout: Duration,
    /// Delay between status polls.
    pub poll_interval: Duration,
    /// Extra pause after a confirmation before the next stage builds on it.
    pub settle_delay: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(2),
            settle_delay: Duration::ZERO,
        }
    }
}

impl ConfirmationPolicy {
    /// A policy that polls quickly and never settles; for tests.
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(1),
            settle_delay: Duration::ZERO,
        }
    }
}

/// Abstract ledger operations used by the deployment stages.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Address of the wallet funding the deployment.
    async fn wallet_address(&self) -> Result<Address, LedgerError>;

    /// Submits a transaction, returning its id.
    async fn submit(&self, tx: Transaction) -> Result<TxId, LedgerError>;

    /// Polls the status of a submitted transaction once.
    async fn confirmation_status(&self, tx_id: TxId) -> Result<TxStatus, LedgerError>;

    /// Waits until the transaction is confirmed, rejected, or the policy timeout elapses.
    async fn await_confirmation(
        &self,
        tx_id: TxId,
        policy: ConfirmationPolicy,
    ) -> Result<Confirmation, LedgerError> {
        let started = Instant::now();
        loop {
            match self.confirmation_status(tx_id).await? {
                TxStatus::Confirmed => return Ok(Confirmation::Confirmed),
                TxStatus::Rejected(reason) => return Ok(Confirmation::Rejected(reason)),
                TxStatus::Pending => {}
            }

            let elapsed = started.elapsed();
            if elapsed >= policy.timeout {
                return Ok(Confirmation::TimedOut);
            }
            debug!(tx_id = %tx_id, elapsed_ms = elapsed.as_millis() as u64, "Transaction pending");
            tokio::time::sleep(policy.poll_interval.min(policy.timeout - elapsed)).await;
        }
    }

    /// Reads outputs back by reference; `None` for outputs that do not exist.
    async fn query_outputs_by_reference(
        &self,
        refs: &[OutputRef],
    ) -> Result<Vec<Option<TxOutput>>, LedgerError>;

    /// Lists unspent outputs owned by an address.
    ///
    /// Seed preparation funds itself from these. Other transactions leave
    /// fee and coin selection to the client.
    async fn select_spendable_inputs(&self, address: &Address) -> Result<Vec<Utxo>, LedgerError>;
}
