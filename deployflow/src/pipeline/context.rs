//! Shared handles every stage works with.

use crate::checkpoint::Checkpoints;
use crate::errors::DeployError;
use crate::events::{EventKind, RunEvents};
use crate::ledger::{Confirmation, ConfirmationPolicy, LedgerClient, LedgerError, Transaction};
use crate::core::TxId;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Ledger, checkpoints, events and confirmation policy for one run.
#[derive(Clone)]
pub struct StageContext {
    /// Ledger client.
    pub ledger: Arc<dyn LedgerClient>,
    /// Typed checkpoint access scoped to the run.
    pub checkpoints: Checkpoints,
    /// Event emitter stamped with the run identity.
    pub events: RunEvents,
    /// Bounded confirmation wait.
    pub policy: ConfirmationPolicy,
}

impl std::fmt::Debug for StageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageContext")
            .field("checkpoints", &self.checkpoints)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl StageContext {
    /// Creates a stage context.
    #[must_use]
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        checkpoints: Checkpoints,
        events: RunEvents,
        policy: ConfirmationPolicy,
    ) -> Self {
        Self {
            ledger,
            checkpoints,
            events,
            policy,
        }
    }

    /// Submits a transaction and reports it.
    pub async fn submit(&self, tx: Transaction) -> Result<TxId, LedgerError> {
        let label = tx.label.clone().unwrap_or_default();
        let tx_id = self.ledger.submit(tx).await?;
        info!(tx_id = %tx_id, label = %label, "Transaction submitted");
        self.events
            .emit(EventKind::TxSubmitted, json!({"tx_id": tx_id.to_hex(), "label": label}))
            .await;
        Ok(tx_id)
    }

    /// Waits for a submitted transaction.
    ///
    /// A timeout is `ConfirmationTimeout` and a post-submission rejection is
    /// a ledger `Rejected` error. Neither is retried. After a confirmation
    /// the policy's settle delay is observed before returning.
    pub async fn confirm(&self, tx_id: TxId) -> Result<(), DeployError> {
        match self.ledger.await_confirmation(tx_id, self.policy).await? {
            Confirmation::Confirmed => {
                info!(tx_id = %tx_id, "Transaction confirmed");
                self.events
                    .emit(EventKind::TxConfirmed, json!({"tx_id": tx_id.to_hex()}))
                    .await;
                if !self.policy.settle_delay.is_zero() {
                    tokio::time::sleep(self.policy.settle_delay).await;
                }
                Ok(())
            }
            Confirmation::TimedOut => Err(DeployError::ConfirmationTimeout {
                tx_id,
                waited: self.policy.timeout,
            }),
            Confirmation::Rejected(reason) => Err(LedgerError::Rejected(reason).into()),
        }
    }

    /// Submits a transaction and waits for it.
    pub async fn submit_and_confirm(&self, tx: Transaction) -> Result<TxId, DeployError> {
        let tx_id = self.submit(tx).await?;
        self.confirm(tx_id).await?;
        Ok(tx_id)
    }
}
