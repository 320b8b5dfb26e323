//! Initial entity creation.

use super::context::StageContext;
use super::followup::{FollowUp, FollowUpContext, FollowUpOutcome, FollowUpReport};
use super::minter::BootstrapToken;
use super::publisher::PublishedArtifact;
use crate::core::{Address, Datum, OutputRef, Quantity, Value};
use crate::errors::DeployError;
use crate::events::EventKind;
use crate::ledger::{OutputDatum, Transaction, TxOutput};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

/// How an entity's datum is attached to its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatumMode {
    /// The full datum sits in the output.
    #[default]
    Inline,
    /// Only the datum hash sits in the output.
    Hash,
}

impl DatumMode {
    /// Wraps a datum for an output.
    #[must_use]
    pub fn attach(self, datum: Datum) -> OutputDatum {
        match self {
            Self::Inline => OutputDatum::Inline(datum),
            Self::Hash => OutputDatum::Hashed(datum),
        }
    }
}

/// A token amount an entity output must carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRequirement {
    /// Bootstrap token name.
    pub token: String,
    /// Amount, or `None` for everything that was minted.
    pub quantity: Option<Quantity>,
}

/// Initial state of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySpec {
    /// Entity name.
    pub name: String,
    /// Published artifact whose address holds the entity.
    pub artifact: String,
    /// Initial datum, if any.
    pub datum: Option<Datum>,
    /// Datum attachment.
    #[serde(default)]
    pub datum_mode: DatumMode,
    /// Coin in the entity output.
    pub coin: Quantity,
    /// Tokens in the entity output.
    #[serde(default)]
    pub tokens: Vec<TokenRequirement>,
    /// Extra published artifacts the creating transaction reads.
    #[serde(default)]
    pub references: Vec<String>,
}

impl EntitySpec {
    /// Creates an entity with no datum and no tokens.
    #[must_use]
    pub fn new(name: impl Into<String>, artifact: impl Into<String>, coin: impl Into<Quantity>) -> Self {
        Self {
            name: name.into(),
            artifact: artifact.into(),
            datum: None,
            datum_mode: DatumMode::Inline,
            coin: coin.into(),
            tokens: Vec::new(),
            references: Vec::new(),
        }
    }

    /// Attaches a datum.
    #[must_use]
    pub fn with_datum(mut self, datum: Datum, mode: DatumMode) -> Self {
        self.datum = Some(datum);
        self.datum_mode = mode;
        self
    }

    /// Requires an exact amount of a token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, quantity: impl Into<Quantity>) -> Self {
        self.tokens.push(TokenRequirement {
            token: token.into(),
            quantity: Some(quantity.into()),
        });
        self
    }

    /// Requires the full minted amount of a token.
    #[must_use]
    pub fn with_full_token(mut self, token: impl Into<String>) -> Self {
        self.tokens.push(TokenRequirement {
            token: token.into(),
            quantity: None,
        });
        self
    }

    /// Reads another published artifact when creating the entity.
    #[must_use]
    pub fn with_reference(mut self, artifact: impl Into<String>) -> Self {
        self.references.push(artifact.into());
        self
    }
}

/// A created entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityState {
    /// Entity name.
    pub name: String,
    /// Backing artifact.
    pub artifact: String,
    /// Output holding the entity.
    pub location: OutputRef,
    /// Entity address.
    pub address: Address,
    /// Datum, if any.
    pub datum: Option<Datum>,
    /// Datum attachment.
    pub datum_mode: DatumMode,
    /// Output value.
    pub value: Value,
}

impl EntityState {
    /// Moves the entity to where a confirmed transition recreated it.
    pub fn advance(&mut self, report: &FollowUpReport) {
        self.location = report.entity_location;
        self.datum = Some(report.entity_datum.clone());
    }
}

/// Creates entity outputs at their artifacts' addresses.
#[derive(Debug)]
pub struct EntityBootstrapper {
    ctx: StageContext,
}

impl EntityBootstrapper {
    /// Creates a bootstrapper.
    #[must_use]
    pub const fn new(ctx: StageContext) -> Self {
        Self { ctx }
    }

    /// Creates every entity in one transaction.
    ///
    /// Token and artifact requirements are checked before anything is
    /// submitted.
    pub async fn bootstrap(
        &self,
        published: &BTreeMap<String, PublishedArtifact>,
        specs: &[EntitySpec],
        tokens: &BTreeMap<String, BootstrapToken>,
    ) -> Result<BTreeMap<String, EntityState>, DeployError> {
        if specs.is_empty() {
            return Ok(BTreeMap::new());
        }

        let mut names = HashSet::new();
        let mut reads = Vec::new();
        let mut outputs = Vec::with_capacity(specs.len());

        for spec in specs {
            if !names.insert(spec.name.as_str()) {
                return Err(DeployError::InvalidConfig(format!(
                    "entity '{}' is declared more than once",
                    spec.name
                )));
            }

            let lookup = |artifact: &str| {
                published
                    .get(artifact)
                    .ok_or_else(|| DeployError::MissingArtifact {
                        owner: spec.name.clone(),
                        artifact: artifact.to_string(),
                    })
            };
            let backing = lookup(spec.artifact.as_str())?;
            reads.push(backing.location);
            for reference in &spec.references {
                reads.push(lookup(reference.as_str())?.location);
            }

            let mut value = Value::coin(spec.coin);
            for requirement in &spec.tokens {
                let token = tokens
                    .get(&requirement.token)
                    .ok_or_else(|| DeployError::MissingToken {
                        entity: spec.name.clone(),
                        token: requirement.token.clone(),
                    })?;
                let quantity = requirement.quantity.unwrap_or(token.quantity);
                value = value.with_asset(token.asset.clone(), quantity);
            }

            let address = Address::Script(backing.identity());
            let mut output = TxOutput::new(address, value);
            if let Some(datum) = &spec.datum {
                output = output.with_datum(spec.datum_mode.attach(datum.clone()));
            }
            outputs.push(output);
        }

        let tx = outputs
            .iter()
            .cloned()
            .fold(Transaction::builder().read_from(reads), |builder, output| {
                builder.pay_to(output)
            })
            .label("create-entities")
            .build();
        let tx_id = self.ctx.submit_and_confirm(tx).await?;

        let entities: BTreeMap<String, EntityState> = specs
            .iter()
            .zip(outputs)
            .zip(0u64..)
            .map(|((spec, output), index)| {
                let state = EntityState {
                    name: spec.name.clone(),
                    artifact: spec.artifact.clone(),
                    location: OutputRef::new(tx_id, index),
                    address: output.address,
                    datum: spec.datum.clone(),
                    datum_mode: spec.datum_mode,
                    value: output.value,
                };
                (spec.name.clone(), state)
            })
            .collect();

        info!(tx_id = %tx_id, entities = entities.len(), "Entities created");
        Ok(entities)
    }

    /// Runs follow-up transitions in order.
    ///
    /// A failing follow-up is logged and recorded; it never fails the stage.
    pub async fn run_follow_ups(
        &self,
        follow_ups: &[Arc<dyn FollowUp>],
        published: &BTreeMap<String, PublishedArtifact>,
        entities: &BTreeMap<String, EntityState>,
    ) -> Vec<FollowUpOutcome> {
        let cx = FollowUpContext::new(&self.ctx, published, entities);
        let mut outcomes = Vec::with_capacity(follow_ups.len());

        for follow_up in follow_ups {
            let outcome = match follow_up.run(&cx).await {
                Ok(report) => {
                    info!(follow_up = follow_up.name(), tx_id = %report.tx_id, "Follow-up completed");
                    FollowUpOutcome::Succeeded(report)
                }
                Err(e) => {
                    warn!(follow_up = follow_up.name(), error = %e, "Follow-up failed, continuing");
                    self.ctx
                        .events
                        .emit(
                            EventKind::FollowUpFailed,
                            json!({"follow_up": follow_up.name(), "error": e.to_string()}),
                        )
                        .await;
                    FollowUpOutcome::Failed {
                        name: follow_up.name().to_string(),
                        reason: e.to_string(),
                    }
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }
}
