//! The DAO deployment, expressed as a [`DeploymentPlan`](crate::pipeline::DeploymentPlan).
//!
//! Seven bootstrap tokens, twelve validators wired by identity, seven
//! entities and one follow-up that registers the first farm.

mod input;
mod plan;

pub use input::{
    AcceptedAsset, DaoInput, FarmFactoryState, VotingEscrowState, WpFactoryState, SPLASH_ASSET_NAME,
    SPLASH_POLICY,
};
pub use plan::{dao_plan, DAO_VALIDATORS};
