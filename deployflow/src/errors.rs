//! Error types for the deployment orchestrator.
//!
//! Every failure a deployment run can hit is a [`DeployError`] variant. Each
//! variant maps to an [`ErrorInfo`] with a stable code and an operator hint,
//! and fatal run errors are wrapped in a [`StageFailure`] that records where
//! the run stopped.

use crate::checkpoint::StageName;
use crate::core::{OutputRef, TxId};
use crate::ledger::LedgerError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The main error type for deployment operations.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The artifact reference graph contains a cycle.
    #[error("Cyclic dependency between artifacts: {}", cycle_path.join(" -> "))]
    CyclicDependency {
        /// Artifacts forming the cycle, first element repeated at the end.
        cycle_path: Vec<String>,
    },

    /// An artifact names a reference or binding that is not available.
    #[error("Artifact '{artifact}' references unknown '{reference}'")]
    UnresolvedReference {
        /// The referencing artifact.
        artifact: String,
        /// The missing reference.
        reference: String,
    },

    /// Two artifact specs share a name.
    #[error("Artifact '{0}' is declared more than once")]
    DuplicateArtifact(String),

    /// A fixed instantiation order places an artifact before its dependency.
    #[error("Artifact '{artifact}' is ordered before its dependency '{dependency}'")]
    OrderViolation {
        /// The misplaced artifact.
        artifact: String,
        /// The dependency that must precede it.
        dependency: String,
    },

    /// The artifact builder failed.
    #[error("Failed to build artifact '{artifact}': {reason}")]
    Build {
        /// The artifact being built.
        artifact: String,
        /// Builder message.
        reason: String,
    },

    /// The ledger did not confirm a transaction within the bounded wait.
    #[error("Transaction {tx_id} not confirmed within {}ms", waited.as_millis())]
    ConfirmationTimeout {
        /// The submitted transaction.
        tx_id: TxId,
        /// How long the orchestrator waited.
        waited: Duration,
    },

    /// A seed input was already consumed.
    #[error("Seed input {seed} has already been consumed")]
    SeedConsumed {
        /// The consumed output reference.
        seed: OutputRef,
    },

    /// A publication batch failed to land.
    #[error("Publication batch {batch} failed{}: {reason}", tx_id.as_ref().map(|id| format!(" (tx {id})")).unwrap_or_default())]
    PublicationFailed {
        /// Zero-based batch index.
        batch: usize,
        /// The batch transaction, if it was submitted.
        tx_id: Option<TxId>,
        /// What went wrong.
        reason: String,
        /// The batch was submitted but its confirmation wait ran out.
        timed_out: bool,
    },

    /// A publication batch exceeds the per-transaction code capacity.
    #[error("Publication batch {batch} carries {size} bytes of code, limit is {limit}")]
    BatchTooLarge {
        /// Zero-based batch index.
        batch: usize,
        /// Total code size in the batch.
        size: usize,
        /// Configured capacity.
        limit: usize,
    },

    /// An entity requires a token that was never minted.
    #[error("Entity '{entity}' requires token '{token}' which is not in the minted set")]
    MissingToken {
        /// The entity being created.
        entity: String,
        /// The missing token name.
        token: String,
    },

    /// An entity or follow-up names an artifact that was not published.
    #[error("'{owner}' requires artifact '{artifact}' which was not published")]
    MissingArtifact {
        /// The entity or follow-up.
        owner: String,
        /// The missing artifact.
        artifact: String,
    },

    /// A checkpoint contains a numeric field that cannot round-trip exactly.
    #[error("Checkpoint '{stage}' has a lossy numeric value at {path}")]
    PrecisionLoss {
        /// The checkpoint stage.
        stage: String,
        /// JSON path of the offending value.
        path: String,
    },

    /// A checkpoint could not be read or written.
    #[error("{0}")]
    Checkpoint(#[from] CheckpointError),

    /// A checkpoint exists but describes a different deployment.
    #[error("Checkpoint '{stage}' does not match this plan: {reason}")]
    CheckpointMismatch {
        /// The checkpoint stage.
        stage: String,
        /// Mismatch description.
        reason: String,
    },

    /// Configuration or plan is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The run was cancelled between stages.
    #[error("Deployment cancelled: {0}")]
    Cancelled(String),

    /// The ledger client reported an error.
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeployError {
    /// Creates a build error.
    #[must_use]
    pub fn build(artifact: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Build {
            artifact: artifact.into(),
            reason: reason.into(),
        }
    }

    /// Creates an unresolved reference error.
    #[must_use]
    pub fn unresolved(artifact: impl Into<String>, reference: impl Into<String>) -> Self {
        Self::UnresolvedReference {
            artifact: artifact.into(),
            reference: reference.into(),
        }
    }

    /// Creates a checkpoint mismatch error.
    #[must_use]
    pub fn mismatch(stage: StageName, reason: impl Into<String>) -> Self {
        Self::CheckpointMismatch {
            stage: stage.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns true when the ledger outcome is unknown and needs manual inspection.
    #[must_use]
    pub const fn is_ambiguous(&self) -> bool {
        matches!(
            self,
            Self::ConfirmationTimeout { .. } | Self::PublicationFailed { timed_out: true, .. }
        )
    }

    /// Returns the diagnostic info for this error.
    #[must_use]
    pub fn error_info(&self) -> ErrorInfo {
        let (code, hint) = match self {
            Self::CyclicDependency { .. } => (
                "DEPLOY-001-CYCLE",
                Some("Remove one of the artifact references in the cycle."),
            ),
            Self::UnresolvedReference { .. } => (
                "DEPLOY-002-UNRESOLVED",
                Some("Declare the referenced artifact or supply the binding."),
            ),
            Self::DuplicateArtifact(_) => ("DEPLOY-003-DUPLICATE", None),
            Self::OrderViolation { .. } => (
                "DEPLOY-004-ORDER",
                Some("Let the resolver compute the order instead of fixing it by hand."),
            ),
            Self::Build { .. } => ("DEPLOY-005-BUILD", None),
            Self::ConfirmationTimeout { .. } => (
                "DEPLOY-010-TIMEOUT",
                Some("Inspect the ledger for the transaction before re-running the stage."),
            ),
            Self::SeedConsumed { .. } => (
                "DEPLOY-011-SEED",
                Some("Supply a fresh seed input or resume from the bootstrap-tokens checkpoint."),
            ),
            Self::PublicationFailed { timed_out: true, .. } => (
                "DEPLOY-022-PUBLICATION_TIMEOUT",
                Some("Inspect the ledger for the batch transaction before re-running; it may have landed."),
            ),
            Self::PublicationFailed { .. } => (
                "DEPLOY-020-PUBLICATION",
                Some("Re-run to resume from the first unconfirmed batch."),
            ),
            Self::BatchTooLarge { .. } => (
                "DEPLOY-021-BATCH_SIZE",
                Some("Lower batch_size so each transaction fits."),
            ),
            Self::MissingToken { .. } => ("DEPLOY-030-TOKEN", None),
            Self::MissingArtifact { .. } => ("DEPLOY-031-ARTIFACT", None),
            Self::PrecisionLoss { .. } => (
                "DEPLOY-040-PRECISION",
                Some("Quantities must be stored as integers or decimal strings, never floats."),
            ),
            Self::Checkpoint(_) => ("DEPLOY-041-CHECKPOINT", None),
            Self::CheckpointMismatch { .. } => (
                "DEPLOY-042-MISMATCH",
                Some("Use a new run id or delete the stale checkpoint."),
            ),
            Self::InvalidConfig(_) => ("DEPLOY-050-CONFIG", None),
            Self::Cancelled(_) => ("DEPLOY-060-CANCELLED", None),
            Self::Ledger(_) => ("DEPLOY-070-LEDGER", None),
            Self::Serialization(_) => ("DEPLOY-080-SERDE", None),
            Self::Io(_) => ("DEPLOY-081-IO", None),
        };

        let info = ErrorInfo::new(code, self.to_string());
        match hint {
            Some(hint) => info.with_fix_hint(hint),
            None => info,
        }
    }
}

/// Errors raised by checkpoint storage backends.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// No checkpoint exists under this name.
    #[error("Checkpoint not found: {0}")]
    NotFound(String),

    /// The checkpoint envelope is inconsistent with the requested key.
    #[error("Checkpoint '{name}' is invalid: {reason}")]
    Invalid {
        /// Checkpoint name.
        name: String,
        /// Reason.
        reason: String,
    },

    /// The storage backend failed.
    #[error("Checkpoint storage failure for '{name}': {source}")]
    Storage {
        /// Checkpoint name.
        name: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Diagnostic metadata for an error.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ErrorInfo {
    /// Error code (e.g., "DEPLOY-001-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ErrorInfo {
    /// Creates a new error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// A fatal error annotated with where the run stopped.
#[derive(Debug, Error)]
pub struct StageFailure {
    /// The stage that failed, or `None` when the run was refused before any
    /// stage started.
    pub stage: Option<StageName>,
    /// The last checkpoint known to be written for this run.
    pub last_checkpoint: Option<StageName>,
    /// The underlying error.
    #[source]
    pub error: DeployError,
}

impl StageFailure {
    /// Creates a new stage failure.
    #[must_use]
    pub const fn new(stage: StageName, last_checkpoint: Option<StageName>, error: DeployError) -> Self {
        Self {
            stage: Some(stage),
            last_checkpoint,
            error,
        }
    }

    /// Creates a failure for a run refused before its first stage.
    #[must_use]
    pub const fn preflight(error: DeployError) -> Self {
        Self {
            stage: None,
            last_checkpoint: None,
            error,
        }
    }

    /// Returns the raw ledger error, if the failure came from the ledger.
    #[must_use]
    pub const fn ledger_error(&self) -> Option<&LedgerError> {
        match &self.error {
            DeployError::Ledger(err) => Some(err),
            _ => None,
        }
    }

    /// Returns diagnostic info including stage context.
    #[must_use]
    pub fn error_info(&self) -> ErrorInfo {
        let info = self
            .error
            .error_info()
            .with_context_entry("stage", self.stage.map_or("preflight", StageName::as_str));
        match self.last_checkpoint {
            Some(last) => info.with_context_entry("last_checkpoint", last.as_str()),
            None => info,
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(stage) = self.stage else {
            return write!(f, "Deployment refused before any stage ran: {}", self.error);
        };
        let last = self.last_checkpoint.map_or("none", StageName::as_str);
        write!(
            f,
            "Stage '{}' failed (last checkpoint: {}): {}",
            stage, last, self.error
        )
    }
}
