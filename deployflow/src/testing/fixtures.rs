//! Deterministic building blocks for stage and pipeline tests.

use crate::artifacts::{
    ArtifactBuilder, ArtifactSpec, Blueprint, ParamValue, ResolvedArtifact, TemplateBuilder,
};
use crate::checkpoint::{Checkpoints, InMemoryCheckpointStore};
use crate::config::DeployConfig;
use crate::core::{AssetName, Datum, ExUnits, Integer, Quantity};
use crate::events::RunEvents;
use crate::ledger::{ConfirmationPolicy, InMemoryLedger};
use crate::pipeline::{
    BootstrapMinter, BootstrapToken, DatumMode, DeploymentPlan, EntitySpec, PublicationStager,
    PublishedArtifact, RegisterChild, StageContext, TokenDescriptor,
};
use crate::protocol::DAO_VALIDATORS;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Stage handles over an in-memory ledger with fast confirmation polling.
pub fn stage_context(
    ledger: Arc<InMemoryLedger>,
    store: InMemoryCheckpointStore,
    run_id: &str,
) -> StageContext {
    StageContext::new(
        ledger,
        Checkpoints::new(Arc::new(store), run_id),
        RunEvents::noop(run_id),
        ConfirmationPolicy::immediate(),
    )
}

/// A config suited to in-memory runs.
pub fn test_config(run_id: &str) -> DeployConfig {
    DeployConfig::new(run_id).with_confirmation(1, 1)
}

/// `count` resolved artifacts named `artifact_0`, `artifact_1`, ...
pub fn sample_artifacts(count: usize) -> Vec<ResolvedArtifact> {
    let builder = TemplateBuilder::new(b"sample-validator".to_vec());
    (0..count)
        .map(|i| {
            let params = vec![ParamValue::Int(Integer::new(i as i128))];
            let compiled = builder.instantiate(&params).expect("template accepts any params");
            ResolvedArtifact {
                name: format!("artifact_{i}"),
                identity: compiled.identity,
                code: compiled.code,
                cost: ExUnits::default(),
                params,
            }
        })
        .collect()
}

/// Tokens `auth` (1) and `gt` (1 000 000) used by the sample plans.
pub fn sample_tokens() -> Vec<TokenDescriptor> {
    vec![
        TokenDescriptor::new("auth", AssetName::from_hex("a4").expect("valid hex"), 1u64),
        TokenDescriptor::new("gt", AssetName::utf8("gt").expect("short name"), 1_000_000u64),
    ]
}

/// Mints the sample tokens and publishes `count` sample artifacts.
pub async fn publish_samples(
    ctx: &StageContext,
    count: usize,
) -> (
    BTreeMap<String, BootstrapToken>,
    BTreeMap<String, PublishedArtifact>,
) {
    let mut minter = BootstrapMinter::new(ctx.clone());
    let seed = minter
        .prepare_seed(Quantity::new(20_000_000))
        .await
        .expect("seed prepared");
    let tokens = minter.mint(seed, &sample_tokens()).await.expect("tokens minted");
    let published = PublicationStager::new(ctx.clone())
        .publish(&sample_artifacts(count), 6)
        .await
        .expect("artifacts published");
    (tokens, published)
}

/// A plan over `count` chained artifacts (each references its predecessor),
/// two entities and one follow-up.
///
/// `artifact_0` takes the `auth` policy as a binding, so resolution depends
/// on the minted tokens. The `registry` entity sits at `artifact_0` with a
/// counter in datum field 0; the follow-up mints under `artifact_1`.
pub fn sample_plan(count: usize) -> DeploymentPlan {
    assert!(count >= 2, "sample plan needs at least two artifacts");
    let builder: Arc<dyn ArtifactBuilder> = Arc::new(TemplateBuilder::new(b"chain-validator".to_vec()));

    let mut plan = DeploymentPlan::new();
    plan.tokens = sample_tokens();
    for i in 0..count {
        let spec = ArtifactSpec::new(format!("artifact_{i}"), Arc::clone(&builder))
            .literal(ParamValue::Int(Integer::new(i as i128)));
        let spec = if i == 0 {
            spec.binding("auth.policy")
        } else {
            spec.reference(format!("artifact_{}", i - 1))
        };
        plan.artifacts.push(spec);
    }

    plan.with_entity(
        EntitySpec::new("registry", "artifact_0", 50_000_000u64)
            .with_datum(
                Datum::constr(0, vec![Datum::int(99i64), Datum::bytes(vec![0x40])]),
                DatumMode::Inline,
            )
            .with_token("auth", 1u64),
    )
    .with_entity(
        EntitySpec::new("treasury", "artifact_1", 10_000_000u64)
            .with_datum(Datum::unit(), DatumMode::Hash)
            .with_full_token("gt"),
    )
    .with_follow_up(Arc::new(RegisterChild::new(
        "register_child",
        "registry",
        "artifact_1",
        0,
    )))
}

/// A blueprint holding a distinct template for every DAO validator.
pub fn dao_blueprint() -> Blueprint {
    Blueprint::from_templates(
        DAO_VALIDATORS
            .iter()
            .map(|(_, title)| (*title, format!("compiled:{title}").into_bytes())),
    )
}
