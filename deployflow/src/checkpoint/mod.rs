//! Durable per-stage checkpoints.
//!
//! Storage is a plain key-value boundary ([`CheckpointStore`]) holding raw
//! bytes. [`Checkpoints`] layers typed access on top: payloads are wrapped in
//! a versioned envelope keyed by stage name and run id, and every document is
//! scanned for lossy numbers before it is decoded.

mod file;
mod memory;
mod precision;

pub use file::FileCheckpointStore;
pub use memory::InMemoryCheckpointStore;
pub use precision::find_lossy_number;

use crate::core::PRECISION_LOSS_MARKER;
use crate::errors::{CheckpointError, DeployError};
use crate::utils::iso_timestamp;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Current checkpoint envelope version.
pub const CHECKPOINT_VERSION: u32 = 1;

/// Names of the checkpointed stages, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageName {
    /// Minted bootstrap tokens.
    BootstrapTokens,
    /// Resolved artifacts in instantiation order.
    ResolvedArtifacts,
    /// Batches confirmed so far during publication.
    PublicationProgress,
    /// Published artifact locations.
    PublishedArtifacts,
    /// Entities, follow-up outcomes and the run summary.
    FinalSummary,
}

impl StageName {
    /// All stages in pipeline order.
    pub const ALL: [Self; 5] = [
        Self::BootstrapTokens,
        Self::ResolvedArtifacts,
        Self::PublicationProgress,
        Self::PublishedArtifacts,
        Self::FinalSummary,
    ];

    /// Returns the stage name as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BootstrapTokens => "bootstrap-tokens",
            Self::ResolvedArtifacts => "resolved-artifacts",
            Self::PublicationProgress => "publication-progress",
            Self::PublishedArtifacts => "published-artifacts",
            Self::FinalSummary => "final-summary",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Byte-level storage backend for checkpoints.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Stores a document, replacing any previous one.
    async fn save(&self, name: &str, bytes: &[u8]) -> Result<(), CheckpointError>;

    /// Loads a document; `None` if absent.
    async fn load(&self, name: &str) -> Result<Option<Vec<u8>>, CheckpointError>;

    /// Removes a document. Removing an absent document is not an error.
    async fn remove(&self, name: &str) -> Result<(), CheckpointError>;

    /// Lists stored document names.
    async fn list(&self) -> Result<Vec<String>, CheckpointError>;
}

/// Versioned checkpoint envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint<T> {
    /// Stage that wrote the checkpoint.
    pub stage: StageName,
    /// Deployment run id.
    pub run_id: String,
    /// Envelope version.
    pub version: u32,
    /// RFC 3339 write time.
    pub created_at: String,
    /// Stage payload.
    pub payload: T,
}

/// Typed checkpoint access for one deployment run.
#[derive(Clone)]
pub struct Checkpoints {
    store: Arc<dyn CheckpointStore>,
    run_id: String,
}

impl fmt::Debug for Checkpoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Checkpoints")
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

impl Checkpoints {
    /// Creates typed access over a store.
    #[must_use]
    pub fn new(store: Arc<dyn CheckpointStore>, run_id: impl Into<String>) -> Self {
        Self {
            store,
            run_id: run_id.into(),
        }
    }

    /// The run id checkpoints are scoped to.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Storage key for a stage: the stage name followed by the run id.
    #[must_use]
    pub fn key(&self, stage: StageName) -> String {
        format!("{}{}", stage.as_str(), self.run_id)
    }

    /// Writes a stage checkpoint.
    pub async fn save<T: Serialize + Sync>(&self, stage: StageName, payload: &T) -> Result<(), DeployError> {
        let payload = serde_json::to_value(payload)?;
        if let Some(path) = find_lossy_number(&payload) {
            return Err(DeployError::PrecisionLoss {
                stage: stage.to_string(),
                path,
            });
        }

        let envelope = Checkpoint {
            stage,
            run_id: self.run_id.clone(),
            version: CHECKPOINT_VERSION,
            created_at: iso_timestamp(),
            payload,
        };
        let bytes = serde_json::to_vec_pretty(&envelope)?;
        let key = self.key(stage);
        self.store.save(&key, &bytes).await?;
        debug!(checkpoint = %key, "Checkpoint saved");
        Ok(())
    }

    /// Reads a stage checkpoint, `None` if absent.
    pub async fn load<T: DeserializeOwned>(&self, stage: StageName) -> Result<Option<T>, DeployError> {
        let key = self.key(stage);
        let Some(bytes) = self.store.load(&key).await? else {
            return Ok(None);
        };

        let invalid = |reason: String| CheckpointError::Invalid {
            name: key.clone(),
            reason,
        };

        let document: Json =
            serde_json::from_slice(&bytes).map_err(|e| invalid(format!("not valid JSON: {e}")))?;
        if let Some(path) = find_lossy_number(&document) {
            return Err(DeployError::PrecisionLoss {
                stage: stage.to_string(),
                path,
            });
        }

        let envelope: Checkpoint<Json> =
            serde_json::from_value(document).map_err(|e| invalid(format!("bad envelope: {e}")))?;
        if envelope.stage != stage {
            return Err(invalid(format!("written by stage '{}'", envelope.stage)).into());
        }
        if envelope.run_id != self.run_id {
            return Err(invalid(format!("belongs to run '{}'", envelope.run_id)).into());
        }
        if envelope.version != CHECKPOINT_VERSION {
            return Err(invalid(format!(
                "version {} is not supported (expected {CHECKPOINT_VERSION})",
                envelope.version
            ))
            .into());
        }

        match serde_json::from_value(envelope.payload) {
            Ok(payload) => Ok(Some(payload)),
            Err(e) if e.to_string().contains(PRECISION_LOSS_MARKER) => Err(DeployError::PrecisionLoss {
                stage: stage.to_string(),
                path: "$.payload".into(),
            }),
            Err(e) => Err(invalid(format!("bad payload: {e}")).into()),
        }
    }

    /// Reads a stage checkpoint that must exist.
    pub async fn require<T: DeserializeOwned>(&self, stage: StageName) -> Result<T, DeployError> {
        self.load(stage)
            .await?
            .ok_or_else(|| CheckpointError::NotFound(self.key(stage)).into())
    }

    /// Returns true if a checkpoint exists for the stage.
    pub async fn exists(&self, stage: StageName) -> Result<bool, DeployError> {
        Ok(self.store.load(&self.key(stage)).await?.is_some())
    }

    /// Removes a stage checkpoint.
    pub async fn remove(&self, stage: StageName) -> Result<(), DeployError> {
        self.store.remove(&self.key(stage)).await?;
        Ok(())
    }

    /// Stages with a checkpoint for this run, in pipeline order.
    pub async fn list(&self) -> Result<Vec<StageName>, DeployError> {
        let names = self.store.list().await?;
        Ok(StageName::ALL
            .into_iter()
            .filter(|stage| names.contains(&self.key(*stage)))
            .collect())
    }

    /// The furthest stage with a checkpoint for this run.
    pub async fn latest(&self) -> Result<Option<StageName>, DeployError> {
        Ok(self.list().await?.last().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Quantity;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn checkpoints() -> (InMemoryCheckpointStore, Checkpoints) {
        let store = InMemoryCheckpointStore::new();
        let cps = Checkpoints::new(Arc::new(store.clone()), "run1");
        (store, cps)
    }

    #[tokio::test]
    async fn test_roundtrip_large_quantities() {
        let (_, cps) = checkpoints();
        let mut payload = BTreeMap::new();
        payload.insert("e18".to_string(), Quantity::new(1_000_000_000_000_000_000));
        payload.insert("beyond_u64".to_string(), Quantity::new(u128::from(u64::MAX) * 7));
        payload.insert("gt".to_string(), Quantity::new(45_000_000_000_000_000));

        cps.save(StageName::BootstrapTokens, &payload).await.unwrap();
        let back: BTreeMap<String, Quantity> = cps.require(StageName::BootstrapTokens).await.unwrap();
        assert_eq!(back, payload);
    }

    #[tokio::test]
    async fn test_float_in_stored_document_is_precision_loss() {
        let (store, cps) = checkpoints();
        let doc = serde_json::json!({
            "stage": "bootstrap-tokens",
            "run_id": "run1",
            "version": 1,
            "created_at": "2024-01-01T00:00:00+00:00",
            "payload": {"gt": {"quantity": 4.5e16}}
        });
        store.put_raw("bootstrap-tokensrun1", serde_json::to_vec(&doc).unwrap());

        let err = cps
            .load::<Json>(StageName::BootstrapTokens)
            .await
            .unwrap_err();
        match err {
            DeployError::PrecisionLoss { stage, path } => {
                assert_eq!(stage, "bootstrap-tokens");
                assert_eq!(path, "$.payload.gt.quantity");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_save_refuses_float_payload() {
        let (store, cps) = checkpoints();
        let err = cps
            .save(StageName::FinalSummary, &serde_json::json!({"x": 0.5}))
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::PrecisionLoss { .. }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_missing_checkpoint() {
        let (_, cps) = checkpoints();
        assert!(cps.load::<Json>(StageName::FinalSummary).await.unwrap().is_none());
        let err = cps.require::<Json>(StageName::FinalSummary).await.unwrap_err();
        assert!(matches!(err, DeployError::Checkpoint(CheckpointError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_run_id_mismatch_rejected() {
        let store = InMemoryCheckpointStore::new();
        let a = Checkpoints::new(Arc::new(store.clone()), "a");
        a.save(StageName::BootstrapTokens, &1u64).await.unwrap();

        // Copy run a's document under run b's key.
        let bytes = store.load("bootstrap-tokensa").await.unwrap().unwrap();
        store.put_raw("bootstrap-tokensb", bytes);

        let b = Checkpoints::new(Arc::new(store), "b");
        let err = b.load::<u64>(StageName::BootstrapTokens).await.unwrap_err();
        assert!(matches!(err, DeployError::Checkpoint(CheckpointError::Invalid { .. })));
    }

    #[tokio::test]
    async fn test_latest_follows_pipeline_order() {
        let (_, cps) = checkpoints();
        assert_eq!(cps.latest().await.unwrap(), None);

        cps.save(StageName::ResolvedArtifacts, &0u64).await.unwrap();
        cps.save(StageName::BootstrapTokens, &0u64).await.unwrap();
        assert_eq!(cps.latest().await.unwrap(), Some(StageName::ResolvedArtifacts));
        assert_eq!(
            cps.list().await.unwrap(),
            vec![StageName::BootstrapTokens, StageName::ResolvedArtifacts]
        );
    }

    #[test]
    fn test_stage_name_serde_matches_display() {
        for stage in StageName::ALL {
            let json = serde_json::to_string(&stage).unwrap();
            assert_eq!(json, format!("\"{stage}\""));
        }
    }
}
