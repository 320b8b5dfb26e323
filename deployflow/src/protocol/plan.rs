use super::input::{DaoInput, FarmFactoryState};
use crate::artifacts::{ArtifactSpec, Blueprint, OneShotPolicyBuilder, ParamValue};
use crate::core::{AssetName, Datum, Integer, Quantity};
use crate::errors::DeployError;
use crate::pipeline::{DatumMode, DeploymentPlan, EntitySpec, RegisterChild, TokenDescriptor};
use std::sync::Arc;

/// Asset name shared by the single-unit authentication tokens.
const FIXED_AUTH_NAME: &str = "a4";

/// Blueprint title of the one-shot mint policy.
const ONE_SHOT_TITLE: &str = "deployment/minting.onetime_mint";

/// Artifact names and the blueprint validators they instantiate.
pub const DAO_VALIDATORS: [(&str, &str); 12] = [
    ("governance_power", "voting_escrow.mint_governance_power"),
    ("gov_proxy", "gov_proxy.gov_proxy"),
    ("ve_composition", "ve_factory.mint_ve_composition_token"),
    ("voting_escrow", "voting_escrow.voting_escrow"),
    ("ve_factory", "ve_factory.ve_factory"),
    ("smart_farm", "smart_farm.mint_farm_auth_token"),
    ("wp_auth", "weighting_poll.mint_wp_auth_token"),
    ("wp_factory", "weighting_poll.wp_factory"),
    ("farm_factory", "smart_farm.farm_factory"),
    ("weighting_power", "voting_escrow.mint_weighting_power"),
    ("inflation", "inflation.inflation"),
    ("perm_manager", "perm_manager.perm_manager"),
];

enum Slot {
    Token(&'static str),
    Ref(&'static str),
    Splash,
    ZerothEpoch,
}

fn wiring(artifact: &str) -> &'static [Slot] {
    use Slot::{Ref, Splash, Token, ZerothEpoch};
    match artifact {
        "governance_power" => &[Token("proposal_auth"), Token("gt")],
        "gov_proxy" => &[
            Token("ve_factory_auth"),
            Token("proposal_auth"),
            Ref("governance_power"),
            Token("gt"),
        ],
        "ve_composition" => &[Token("factory_auth")],
        "voting_escrow" => &[Token("ve_factory_auth"), Ref("ve_composition")],
        "ve_factory" => &[
            Token("factory_auth"),
            Token("ve_identifier"),
            Ref("ve_composition"),
            Token("gt"),
            Ref("voting_escrow"),
            Ref("gov_proxy"),
        ],
        "smart_farm" => &[Splash, Token("factory_auth")],
        "wp_auth" => &[Splash, Ref("smart_farm"), Token("factory_auth"), ZerothEpoch],
        "wp_factory" => &[Ref("wp_auth"), Ref("gov_proxy")],
        "farm_factory" => &[Ref("smart_farm"), Ref("gov_proxy")],
        "weighting_power" => &[ZerothEpoch, Token("proposal_auth"), Token("gt")],
        "inflation" => &[Splash, Ref("wp_auth"), Ref("weighting_power"), ZerothEpoch],
        "perm_manager" => &[Token("edao_msig"), Token("perm_auth")],
        _ => &[],
    }
}

fn tokens(input: &DaoInput) -> Result<Vec<TokenDescriptor>, DeployError> {
    let fixed = |name: &str| -> Result<TokenDescriptor, DeployError> {
        let asset_name = AssetName::from_hex(FIXED_AUTH_NAME)
            .map_err(|e| DeployError::InvalidConfig(e.to_string()))?;
        Ok(TokenDescriptor::new(name, asset_name, 1u64))
    };
    Ok(vec![
        fixed("factory_auth")?,
        fixed("ve_factory_auth")?,
        fixed("perm_auth")?,
        TokenDescriptor::suffixed("proposal_auth", &input.run_id, 1u64)?,
        TokenDescriptor::suffixed("edao_msig", &input.run_id, 1u64)?,
        fixed("ve_identifier")?,
        TokenDescriptor::suffixed("gt", &input.run_id, input.gt_quantity)?,
    ])
}

fn artifacts(input: &DaoInput, blueprint: &Blueprint) -> Result<Vec<ArtifactSpec>, DeployError> {
    DAO_VALIDATORS
        .iter()
        .map(|(name, title)| {
            let slots = wiring(name);
            let builder = blueprint.template(title)?.with_arity(slots.len());
            let spec = slots
                .iter()
                .fold(ArtifactSpec::new(*name, Arc::new(builder)), |spec, slot| match slot {
                    Slot::Token(token) => spec.binding(format!("{token}.policy")),
                    Slot::Ref(artifact) => spec.reference(*artifact),
                    Slot::Splash => spec.literal(ParamValue::Identity(input.splash.policy)),
                    Slot::ZerothEpoch => spec.literal(ParamValue::Int(input.zeroth_epoch_start)),
                });
            Ok(spec)
        })
        .collect()
}

fn entities(input: &DaoInput) -> Result<Vec<EntitySpec>, DeployError> {
    let coin = input.entity_coin;
    let factory_coin = coin
        .get()
        .checked_mul(5)
        .map(Quantity::new)
        .ok_or_else(|| DeployError::InvalidConfig("entity_coin is too large".into()))?;

    Ok(vec![
        EntitySpec::new("inflation", "inflation", coin)
            .with_datum(Datum::Int(input.inflation_epoch), DatumMode::Hash),
        EntitySpec::new("voting_escrow", "voting_escrow", coin)
            .with_datum(input.voting_escrow.to_datum(), DatumMode::Hash)
            .with_token("ve_factory_auth", 1u64)
            .with_full_token("gt"),
        EntitySpec::new("farm_factory", "farm_factory", factory_coin)
            .with_datum(input.farm_factory.to_datum(), DatumMode::Inline)
            .with_token("factory_auth", 1u64)
            .with_reference("smart_farm"),
        EntitySpec::new("wp_factory", "wp_factory", coin)
            .with_datum(input.wp_factory.to_datum(), DatumMode::Hash),
        EntitySpec::new("ve_factory", "ve_factory", coin)
            .with_datum(input.ve_factory_datum(), DatumMode::Hash),
        EntitySpec::new("gov_proxy", "gov_proxy", coin),
        EntitySpec::new("perm_manager", "perm_manager", coin)
            .with_datum(Datum::unit(), DatumMode::Hash)
            .with_token("perm_auth", 1u64),
    ])
}

/// Registers a farm under the farm factory: bumps `last_farm_id` and mints
/// the farm's auth token.
fn create_farm(input: &DaoInput) -> RegisterChild {
    RegisterChild::new(
        "create_farm",
        "farm_factory",
        "smart_farm",
        FarmFactoryState::SEQUENCE_FIELD,
    )
    .with_child(input.entity_coin, Datum::bytes(Vec::new()))
    .with_redeemers(
        // CreateFarm
        Datum::constr(0, Vec::new()),
        // MintAuthToken { factory_in_ix: 0 }
        Datum::constr(0, vec![Datum::Int(Integer::ZERO)]),
    )
}

/// Builds the full DAO deployment plan.
///
/// Every validator title in [`DAO_VALIDATORS`] must be present in the
/// blueprint. The one-shot mint policy is taken from the blueprint when it
/// has one and falls back to the built-in template otherwise.
pub fn dao_plan(input: &DaoInput, blueprint: &Blueprint) -> Result<DeploymentPlan, DeployError> {
    let mint_policy = blueprint
        .template(ONE_SHOT_TITLE)
        .map_or_else(|_| OneShotPolicyBuilder::new(), OneShotPolicyBuilder::with_template);

    let mut plan = DeploymentPlan::new()
        .with_mint_policy(mint_policy)
        .with_follow_up(Arc::new(create_farm(input)));
    plan.seed = input.seed;
    plan.tokens = tokens(input)?;
    plan.artifacts = artifacts(input, blueprint)?;
    plan.entities = entities(input)?;
    Ok(plan)
}
