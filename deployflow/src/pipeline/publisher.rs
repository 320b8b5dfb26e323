//! Batched publication of artifact code as reference outputs.
//!
//! Artifacts are cut into fixed-size batches in resolver order. Each batch is
//! one transaction whose outputs sit at the unspendable lock address and carry
//! the artifact code, so later transactions can reference the code instead of
//! attaching it. Confirmed batches are recorded after each confirmation, which
//! lets a failed run resume at the first unconfirmed batch.

use super::context::StageContext;
use crate::artifacts::ResolvedArtifact;
use crate::checkpoint::StageName;
use crate::core::{Address, OutputRef, Quantity, ScriptHash, TxId, Value};
use crate::errors::DeployError;
use crate::events::EventKind;
use crate::ledger::{Transaction, TxOutput};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// A resolved artifact together with where its code lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedArtifact {
    /// The artifact.
    pub artifact: ResolvedArtifact,
    /// Reference output holding the code.
    pub location: OutputRef,
    /// Zero-based publication batch.
    pub batch: usize,
}

impl PublishedArtifact {
    /// Artifact identity.
    #[must_use]
    pub const fn identity(&self) -> ScriptHash {
        self.artifact.identity
    }
}

/// A confirmed publication batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedBatch {
    /// Zero-based batch index.
    pub index: usize,
    /// The confirmed transaction.
    pub tx_id: TxId,
}

/// Publication state saved after every confirmed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationProgress {
    /// Batch size the batches were cut with.
    pub batch_size: usize,
    /// Artifact names and identities in publication order.
    pub artifacts: Vec<(String, ScriptHash)>,
    /// Batches confirmed so far, in order.
    pub batches: Vec<ConfirmedBatch>,
}

impl PublicationProgress {
    fn confirmed(&self, index: usize) -> Option<TxId> {
        self.batches
            .iter()
            .find(|b| b.index == index)
            .map(|b| b.tx_id)
    }
}

/// Publishes resolved artifacts in sequential batches.
#[derive(Debug)]
pub struct PublicationStager {
    ctx: StageContext,
    reference_coin: Quantity,
    max_batch_code_bytes: usize,
}

impl PublicationStager {
    /// Creates a stager with default output coin and batch capacity.
    #[must_use]
    pub fn new(ctx: StageContext) -> Self {
        Self {
            ctx,
            reference_coin: Quantity::new(15_000_000),
            max_batch_code_bytes: 14_000,
        }
    }

    /// Sets the coin locked with each reference output.
    #[must_use]
    pub const fn with_reference_coin(mut self, coin: Quantity) -> Self {
        self.reference_coin = coin;
        self
    }

    /// Sets the code capacity of one batch transaction.
    #[must_use]
    pub const fn with_max_batch_code_bytes(mut self, limit: usize) -> Self {
        self.max_batch_code_bytes = limit;
        self
    }

    /// Publishes every artifact and returns their locations by name.
    pub async fn publish(
        &self,
        resolved: &[ResolvedArtifact],
        batch_size: usize,
    ) -> Result<BTreeMap<String, PublishedArtifact>, DeployError> {
        if batch_size == 0 {
            return Err(DeployError::InvalidConfig("batch_size must be at least 1".into()));
        }

        let mut progress = self.load_progress(resolved, batch_size).await?;
        let mut batch_ids = Vec::new();

        for (index, chunk) in resolved.chunks(batch_size).enumerate() {
            if let Some(tx_id) = progress.confirmed(index) {
                info!(batch = index, tx_id = %tx_id, "Batch already published, skipping");
                batch_ids.push(tx_id);
                continue;
            }

            let tx_id = self.publish_batch(index, chunk).await?;
            progress.batches.push(ConfirmedBatch { index, tx_id });
            self.ctx
                .checkpoints
                .save(StageName::PublicationProgress, &progress)
                .await?;
            self.ctx
                .events
                .emit(
                    EventKind::BatchConfirmed,
                    json!({
                        "batch": index,
                        "tx_id": tx_id.to_hex(),
                        "artifacts": chunk.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(),
                    }),
                )
                .await;
            batch_ids.push(tx_id);
        }

        let mut published = Vec::with_capacity(resolved.len());
        for ((index, chunk), tx_id) in resolved.chunks(batch_size).enumerate().zip(&batch_ids) {
            for (position, artifact) in (0u64..).zip(chunk) {
                published.push(PublishedArtifact {
                    artifact: artifact.clone(),
                    location: OutputRef::new(*tx_id, position),
                    batch: index,
                });
            }
        }

        self.verify(&published).await?;

        let published: BTreeMap<String, PublishedArtifact> = published
            .into_iter()
            .map(|p| (p.artifact.name.clone(), p))
            .collect();
        self.ctx
            .checkpoints
            .save(StageName::PublishedArtifacts, &published)
            .await?;
        info!(
            artifacts = published.len(),
            batches = batch_ids.len(),
            "Artifacts published"
        );
        Ok(published)
    }

    async fn load_progress(
        &self,
        resolved: &[ResolvedArtifact],
        batch_size: usize,
    ) -> Result<PublicationProgress, DeployError> {
        let artifacts: Vec<(String, ScriptHash)> = resolved
            .iter()
            .map(|a| (a.name.clone(), a.identity))
            .collect();

        let Some(progress) = self
            .ctx
            .checkpoints
            .load::<PublicationProgress>(StageName::PublicationProgress)
            .await?
        else {
            return Ok(PublicationProgress {
                batch_size,
                artifacts,
                batches: Vec::new(),
            });
        };

        if progress.batch_size != batch_size {
            return Err(DeployError::mismatch(
                StageName::PublicationProgress,
                format!(
                    "batches were cut at size {}, this run uses {batch_size}",
                    progress.batch_size
                ),
            ));
        }
        if progress.artifacts != artifacts {
            return Err(DeployError::mismatch(
                StageName::PublicationProgress,
                "artifact list differs from the one being published",
            ));
        }
        info!(
            confirmed = progress.batches.len(),
            "Resuming publication from saved progress"
        );
        Ok(progress)
    }

    async fn publish_batch(&self, index: usize, chunk: &[ResolvedArtifact]) -> Result<TxId, DeployError> {
        let size: usize = chunk.iter().map(|a| a.code.len()).sum();
        if size > self.max_batch_code_bytes {
            return Err(DeployError::BatchTooLarge {
                batch: index,
                size,
                limit: self.max_batch_code_bytes,
            });
        }

        let tx = chunk
            .iter()
            .fold(Transaction::builder(), |builder, artifact| {
                builder.pay_to(
                    TxOutput::new(Address::locked(), Value::coin(self.reference_coin))
                        .with_script_ref(artifact.code.clone()),
                )
            })
            .label(format!("publish-batch-{index}"))
            .build();

        info!(batch = index, artifacts = chunk.len(), code_bytes = size, "Publishing batch");
        let tx_id = self
            .ctx
            .submit(tx)
            .await
            .map_err(|e| DeployError::PublicationFailed {
                batch: index,
                tx_id: None,
                reason: e.to_string(),
                timed_out: false,
            })?;

        if let Err(e) = self.ctx.confirm(tx_id).await {
            warn!(batch = index, tx_id = %tx_id, error = %e, "Batch did not confirm");
            return Err(DeployError::PublicationFailed {
                batch: index,
                tx_id: Some(tx_id),
                reason: e.to_string(),
                timed_out: e.is_ambiguous(),
            });
        }
        Ok(tx_id)
    }

    /// Reads every location back and checks it holds the expected code.
    async fn verify(&self, published: &[PublishedArtifact]) -> Result<(), DeployError> {
        let refs: Vec<OutputRef> = published.iter().map(|p| p.location).collect();
        let outputs = self.ctx.ledger.query_outputs_by_reference(&refs).await?;

        for (artifact, output) in published.iter().zip(outputs) {
            let failed = |reason: String| DeployError::PublicationFailed {
                batch: artifact.batch,
                tx_id: Some(artifact.location.tx_id),
                reason,
                timed_out: false,
            };
            let Some(output) = output else {
                return Err(failed(format!(
                    "'{}' is missing at {}",
                    artifact.artifact.name, artifact.location
                )));
            };
            if output.script_ref_hash() != Some(artifact.identity()) {
                return Err(failed(format!(
                    "output {} does not hold the code of '{}'",
                    artifact.location, artifact.artifact.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::InMemoryCheckpointStore;
    use crate::ledger::InMemoryLedger;
    use crate::testing::{sample_artifacts, stage_context};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_eleven_artifacts_in_two_batches() {
        let ledger = Arc::new(InMemoryLedger::new());
        let stager = PublicationStager::new(stage_context(
            ledger.clone(),
            InMemoryCheckpointStore::new(),
            "p1",
        ));
        let artifacts = sample_artifacts(11);

        let published = stager.publish(&artifacts, 6).await.unwrap();

        let txs = ledger.transactions();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].outputs.len(), 6);
        assert_eq!(txs[1].outputs.len(), 5);

        for (k, artifact) in artifacts.iter().enumerate() {
            let p = &published[&artifact.name];
            assert_eq!(p.batch, k / 6);
            assert_eq!(p.location.index, (k % 6) as u64);
            let on_ledger = ledger.utxo(&p.location).unwrap();
            assert_eq!(on_ledger.address, Address::locked());
            assert_eq!(on_ledger.script_ref_hash(), Some(artifact.identity));
        }
    }

    #[tokio::test]
    async fn test_resume_skips_confirmed_batches() {
        let ledger = Arc::new(InMemoryLedger::new().never_confirm(2));
        let store = InMemoryCheckpointStore::new();
        let artifacts = sample_artifacts(11);

        let stager = PublicationStager::new(stage_context(ledger.clone(), store.clone(), "p1"));
        let err = stager.publish(&artifacts, 6).await.unwrap_err();
        assert!(matches!(
            err,
            DeployError::PublicationFailed { batch: 1, tx_id: Some(_), timed_out: true, .. }
        ));
        assert!(err.is_ambiguous());

        let stager = PublicationStager::new(stage_context(ledger.clone(), store, "p1"));
        let published = stager.publish(&artifacts, 6).await.unwrap();

        // Batch 0 once, the stuck batch 1, then its retry.
        assert_eq!(ledger.submission_count(), 3);
        assert_eq!(published.len(), 11);
        let first = &published[&artifacts[0].name];
        let seventh = &published[&artifacts[6].name];
        assert_ne!(first.location.tx_id, seventh.location.tx_id);
        assert!(ledger.utxo(&first.location).is_some());
        assert!(ledger.utxo(&seventh.location).is_some());
    }

    #[tokio::test]
    async fn test_progress_with_other_batch_size_rejected() {
        let ledger = Arc::new(InMemoryLedger::new().never_confirm(2));
        let store = InMemoryCheckpointStore::new();
        let artifacts = sample_artifacts(11);

        let stager = PublicationStager::new(stage_context(ledger.clone(), store.clone(), "p1"));
        assert!(stager.publish(&artifacts, 6).await.is_err());

        let err = stager.publish(&artifacts, 5).await.unwrap_err();
        assert!(matches!(err, DeployError::CheckpointMismatch { .. }));
        let err = stager.publish(&artifacts[..10], 6).await.unwrap_err();
        assert!(matches!(err, DeployError::CheckpointMismatch { .. }));
    }

    #[tokio::test]
    async fn test_oversized_batch_not_submitted() {
        let ledger = Arc::new(InMemoryLedger::new());
        let stager = PublicationStager::new(stage_context(
            ledger.clone(),
            InMemoryCheckpointStore::new(),
            "p1",
        ))
        .with_max_batch_code_bytes(16);

        let err = stager.publish(&sample_artifacts(3), 3).await.unwrap_err();
        assert!(matches!(err, DeployError::BatchTooLarge { batch: 0, limit: 16, .. }));
        assert_eq!(ledger.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_rejected_submission_is_publication_failure() {
        let ledger = Arc::new(InMemoryLedger::new().reject_submission(1));
        let store = InMemoryCheckpointStore::new();
        let stager = PublicationStager::new(stage_context(ledger, store.clone(), "p1"));

        let err = stager.publish(&sample_artifacts(2), 6).await.unwrap_err();
        assert!(matches!(
            err,
            DeployError::PublicationFailed { batch: 0, tx_id: None, timed_out: false, .. }
        ));
        assert!(!err.is_ambiguous());
        assert!(store.is_empty());
    }
}
