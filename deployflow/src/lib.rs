//! # Deployflow
//!
//! Dependency-ordered deployment of parameterized on-chain validators.
//!
//! A deployment runs as a fixed sequence of checkpointed stages:
//!
//! - **Bootstrap tokens**: mint every authentication and governance token in
//!   one transaction under per-token one-shot policies
//! - **Resolve artifacts**: instantiate validators in dependency order, each
//!   parameterized by token policies and the identities of earlier artifacts
//! - **Publish artifacts**: attach the code as reference scripts, in bounded
//!   batches, with resumable progress
//! - **Bootstrap entities**: create the initial state outputs and run
//!   follow-up actions against them
//!
//! Every stage persists a versioned checkpoint; a rerun with the same run id
//! skips completed stages and never resubmits confirmed transactions.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use deployflow::prelude::*;
//!
//! let ledger = Arc::new(InMemoryLedger::new());
//! let store = Arc::new(FileCheckpointStore::new("checkpoints"));
//! let deployment = Deployment::new(ledger, store, DeployConfig::new("_22"))
//!     .with_event_sink(Arc::new(LoggingEventSink::default()));
//!
//! let input = DaoInput::new("_22", owner_key)?;
//! let plan = dao_plan(&input, &Blueprint::from_file("plutus.json")?)?;
//! let summary = deployment.run(&plan).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod artifacts;
pub mod cancellation;
pub mod checkpoint;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod observability;
pub mod pipeline;
pub mod protocol;
pub mod utils;

#[cfg(test)]
mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::artifacts::{
        ArtifactBuilder, ArtifactSpec, Bindings, Blueprint, OneShotPolicyBuilder, ParamValue,
        ResolvedArtifact, TemplateBuilder,
    };
    pub use crate::cancellation::CancellationToken;
    pub use crate::checkpoint::{
        CheckpointStore, Checkpoints, FileCheckpointStore, InMemoryCheckpointStore, StageName,
    };
    pub use crate::config::DeployConfig;
    pub use crate::context::RunIdentity;
    pub use crate::core::{
        Address, AssetId, AssetName, Datum, Integer, OutputRef, Quantity, ScriptHash, TxId, Value,
    };
    pub use crate::errors::{DeployError, StageFailure};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::ledger::{ConfirmationPolicy, InMemoryLedger, LedgerClient, LedgerError};
    pub use crate::pipeline::{
        DatumMode, Deployment, DeploymentPlan, DeploymentSummary, EntitySpec, FollowUp,
        RegisterChild, TokenDescriptor,
    };
    pub use crate::protocol::{dao_plan, DaoInput};
    pub use std::sync::Arc;
}
