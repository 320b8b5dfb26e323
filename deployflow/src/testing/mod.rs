//! Test support: instrumented builders and deterministic fixtures.

mod fixtures;
mod mocks;

pub use fixtures::{
    dao_blueprint, publish_samples, sample_artifacts, sample_plan, sample_tokens, stage_context,
    test_config,
};
pub use mocks::{CountingBuilder, FailingBuilder};
