//! The deployment pipeline.
//!
//! This module provides:
//! - Dependency resolution of artifact specs
//! - Bootstrap token minting from a single seed
//! - Batched publication of artifact code
//! - Entity creation and follow-up transitions
//! - The checkpointed [`Deployment`] run tying them together

mod bootstrapper;
mod context;
mod followup;
mod minter;
mod orchestrator;
mod publisher;
mod resolver;

#[cfg(test)]
mod integration_tests;

pub use bootstrapper::{DatumMode, EntityBootstrapper, EntitySpec, EntityState, TokenRequirement};
pub use context::StageContext;
pub use followup::{FollowUp, FollowUpContext, FollowUpOutcome, FollowUpReport, RegisterChild};
pub use minter::{BootstrapMinter, BootstrapToken, TokenDescriptor};
pub use orchestrator::{token_bindings, Deployment, DeploymentPlan, DeploymentSummary};
pub use publisher::{ConfirmedBatch, PublicationProgress, PublicationStager, PublishedArtifact};
pub use resolver::{resolve, resolve_in_order, resolve_order, verify_order};
