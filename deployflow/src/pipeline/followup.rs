//! Follow-up transitions applied to freshly created entities.

use super::bootstrapper::EntityState;
use super::context::StageContext;
use super::publisher::PublishedArtifact;
use crate::core::{cbor_uint, Address, AssetId, AssetName, Datum, Integer, OutputRef, Quantity, TxId, Value};
use crate::errors::DeployError;
use crate::ledger::{LedgerError, Mint, OutputDatum, Transaction, TxOutput};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// What a successful follow-up produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpReport {
    /// Follow-up name.
    pub name: String,
    /// The transition transaction.
    pub tx_id: TxId,
    /// Entity the transition advanced.
    pub entity: String,
    /// New location of the entity.
    pub entity_location: OutputRef,
    /// Entity datum after the transition.
    pub entity_datum: Datum,
    /// Output created for the child.
    pub child_location: OutputRef,
    /// Token minted for the child.
    pub minted: AssetId,
    /// Sequence number after the transition.
    pub sequence: Integer,
}

/// Result of one follow-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FollowUpOutcome {
    /// The transition confirmed.
    Succeeded(FollowUpReport),
    /// The transition failed. Primary entities are unaffected.
    Failed {
        /// Follow-up name.
        name: String,
        /// What went wrong.
        reason: String,
    },
}

impl FollowUpOutcome {
    /// Returns true for a confirmed transition.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }
}

/// State shared by the follow-ups of one run.
pub struct FollowUpContext<'a> {
    /// Stage handles.
    pub stage: &'a StageContext,
    /// Published artifacts by name.
    pub published: &'a BTreeMap<String, PublishedArtifact>,
    /// Created entities by name.
    pub entities: &'a BTreeMap<String, EntityState>,
    consumed: Mutex<HashSet<OutputRef>>,
}

impl<'a> FollowUpContext<'a> {
    /// Creates a context with nothing consumed yet.
    #[must_use]
    pub fn new(
        stage: &'a StageContext,
        published: &'a BTreeMap<String, PublishedArtifact>,
        entities: &'a BTreeMap<String, EntityState>,
    ) -> Self {
        Self {
            stage,
            published,
            entities,
            consumed: Mutex::new(HashSet::new()),
        }
    }

    /// Marks an output as consumed. Returns false if it already was.
    pub fn claim(&self, out_ref: OutputRef) -> bool {
        self.consumed.lock().insert(out_ref)
    }

    /// Looks up a published artifact on behalf of `owner`.
    pub fn artifact(&self, owner: &str, name: &str) -> Result<&'a PublishedArtifact, DeployError> {
        self.published
            .get(name)
            .ok_or_else(|| DeployError::MissingArtifact {
                owner: owner.to_string(),
                artifact: name.to_string(),
            })
    }

    /// Looks up a created entity on behalf of `owner`.
    pub fn entity(&self, owner: &str, name: &str) -> Result<&'a EntityState, DeployError> {
        self.entities
            .get(name)
            .ok_or_else(|| DeployError::InvalidConfig(format!("'{owner}' targets unknown entity '{name}'")))
    }
}

/// A transition run after the entities exist.
#[async_trait]
pub trait FollowUp: Send + Sync {
    /// Name used in logs and outcomes.
    fn name(&self) -> &str;

    /// Builds, submits and confirms the transition.
    async fn run(&self, cx: &FollowUpContext<'_>) -> Result<FollowUpReport, DeployError>;
}

/// Registers a child under a counter-carrying entity.
///
/// The entity's output is spent and recreated with its sequence field
/// incremented. A token named after the CBOR encoding of the new sequence is
/// minted under `minting_artifact` and locked, with the child datum, at that
/// artifact's address.
#[derive(Debug, Clone)]
pub struct RegisterChild {
    name: String,
    entity: String,
    minting_artifact: String,
    sequence_field: usize,
    child_coin: Quantity,
    child_datum: Datum,
    spend_redeemer: Datum,
    mint_redeemer: Datum,
}

impl RegisterChild {
    /// Creates a transition on `entity` whose datum keeps its counter at
    /// constructor field `sequence_field`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        entity: impl Into<String>,
        minting_artifact: impl Into<String>,
        sequence_field: usize,
    ) -> Self {
        Self {
            name: name.into(),
            entity: entity.into(),
            minting_artifact: minting_artifact.into(),
            sequence_field,
            child_coin: Quantity::new(10_000_000),
            child_datum: Datum::bytes(Vec::new()),
            spend_redeemer: Datum::unit(),
            mint_redeemer: Datum::unit(),
        }
    }

    /// Sets the child output's coin and datum.
    #[must_use]
    pub fn with_child(mut self, coin: impl Into<Quantity>, datum: Datum) -> Self {
        self.child_coin = coin.into();
        self.child_datum = datum;
        self
    }

    /// Sets the redeemers for spending the entity and minting the token.
    #[must_use]
    pub fn with_redeemers(mut self, spend: Datum, mint: Datum) -> Self {
        self.spend_redeemer = spend;
        self.mint_redeemer = mint;
        self
    }

    fn build_error(&self, reason: impl Into<String>) -> DeployError {
        DeployError::build(&self.name, reason)
    }
}

#[async_trait]
impl FollowUp for RegisterChild {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, cx: &FollowUpContext<'_>) -> Result<FollowUpReport, DeployError> {
        let entity = cx.entity(&self.name, &self.entity)?;
        let minting = cx.artifact(&self.name, &self.minting_artifact)?;
        let backing = cx.artifact(&self.name, &entity.artifact)?;

        if !cx.claim(entity.location) {
            return Err(LedgerError::InputSpent(entity.location).into());
        }
        let current = cx
            .stage
            .ledger
            .query_outputs_by_reference(&[entity.location])
            .await?;
        let Some(Some(output)) = current.into_iter().next() else {
            return Err(LedgerError::InputSpent(entity.location).into());
        };

        let datum = output
            .datum
            .as_ref()
            .map(OutputDatum::datum)
            .or(entity.datum.as_ref())
            .ok_or_else(|| self.build_error(format!("entity '{}' carries no datum", self.entity)))?;
        let sequence = datum
            .field(self.sequence_field)
            .and_then(Datum::as_int)
            .ok_or_else(|| self.build_error(format!("datum field {} is not an integer", self.sequence_field)))?;
        let next = sequence
            .checked_add(Integer::new(1))
            .ok_or_else(|| self.build_error("sequence overflow"))?;
        let encoded = u128::try_from(next.get())
            .map(cbor_uint)
            .map_err(|_| self.build_error("sequence is negative"))?;
        let asset_name = AssetName::new(encoded).map_err(|e| self.build_error(e.to_string()))?;
        let successor = datum
            .with_field(self.sequence_field, Datum::Int(next))
            .ok_or_else(|| self.build_error("datum is not a constructor"))?;
        debug!(follow_up = %self.name, sequence = %next, "Advancing entity sequence");

        let minted = AssetId::new(minting.identity(), asset_name.clone());
        let child_value = Value::coin(self.child_coin).with_asset(minted.clone(), Quantity::new(1));
        let tx = Transaction::builder()
            .read_from([backing.location, minting.location])
            .spend(entity.location, Some(self.spend_redeemer.clone()))
            .mint(Mint {
                policy: minting.identity(),
                asset_name,
                quantity: Quantity::new(1),
                script: None,
                redeemer: Some(self.mint_redeemer.clone()),
            })
            .pay_to(TxOutput::new(entity.address, output.value.clone()).with_datum(entity.datum_mode.attach(successor.clone())))
            .pay_to(
                TxOutput::new(Address::Script(minting.identity()), child_value)
                    .with_datum(OutputDatum::Inline(self.child_datum.clone())),
            )
            .label(self.name.clone())
            .build();

        let tx_id = cx.stage.submit_and_confirm(tx).await?;
        Ok(FollowUpReport {
            name: self.name.clone(),
            tx_id,
            entity: self.entity.clone(),
            entity_location: OutputRef::new(tx_id, 0),
            entity_datum: successor,
            child_location: OutputRef::new(tx_id, 1),
            minted,
            sequence: next,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::InMemoryCheckpointStore;
    use crate::ledger::InMemoryLedger;
    use crate::pipeline::{DatumMode, EntityBootstrapper, EntitySpec};
    use crate::testing::{publish_samples, stage_context};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn factory_datum(last_id: i64) -> Datum {
        Datum::constr(0, vec![Datum::int(last_id), Datum::bytes(vec![0x40])])
    }

    async fn setup(
        ledger: Arc<InMemoryLedger>,
    ) -> (
        StageContext,
        BTreeMap<String, PublishedArtifact>,
        BTreeMap<String, EntityState>,
    ) {
        let ctx = stage_context(ledger, InMemoryCheckpointStore::new(), "f1");
        let (tokens, published) = publish_samples(&ctx, 2).await;
        let specs = vec![EntitySpec::new("factory", "artifact_0", 50_000_000u64)
            .with_datum(factory_datum(41), DatumMode::Inline)
            .with_token("auth", 1u64)];
        let entities = EntityBootstrapper::new(ctx.clone())
            .bootstrap(&published, &specs, &tokens)
            .await
            .unwrap();
        (ctx, published, entities)
    }

    #[tokio::test]
    async fn test_register_child_advances_sequence() {
        let ledger = Arc::new(InMemoryLedger::new());
        let (ctx, published, entities) = setup(ledger.clone()).await;
        let cx = FollowUpContext::new(&ctx, &published, &entities);

        let report = RegisterChild::new("create_child", "factory", "artifact_1", 0)
            .run(&cx)
            .await
            .unwrap();

        assert_eq!(report.sequence, Integer::new(42));
        assert_eq!(report.entity_datum, factory_datum(42));
        assert_eq!(report.minted.name.as_bytes(), &[0x18, 42]);
        assert!(ledger.is_spent(&entities["factory"].location));

        let factory = ledger.utxo(&report.entity_location).unwrap();
        assert_eq!(
            factory.datum.as_ref().map(OutputDatum::datum),
            Some(&factory_datum(42))
        );
        assert_eq!(factory.value, entities["factory"].value);

        let child = ledger.utxo(&report.child_location).unwrap();
        assert_eq!(child.address, Address::Script(published["artifact_1"].identity()));
        assert_eq!(child.value.asset(&report.minted), Quantity::new(1));
    }

    #[tokio::test]
    async fn test_entity_output_consumed_only_once() {
        let ledger = Arc::new(InMemoryLedger::new());
        let (ctx, published, entities) = setup(ledger.clone()).await;
        let cx = FollowUpContext::new(&ctx, &published, &entities);
        let follow_up = RegisterChild::new("create_child", "factory", "artifact_1", 0);

        follow_up.run(&cx).await.unwrap();
        let before = ledger.submission_count();
        let err = follow_up.run(&cx).await.unwrap_err();

        assert!(matches!(err, DeployError::Ledger(LedgerError::InputSpent(_))));
        assert_eq!(ledger.submission_count(), before);
    }

    #[tokio::test]
    async fn test_non_integer_sequence_field() {
        let ledger = Arc::new(InMemoryLedger::new());
        let (ctx, published, entities) = setup(ledger).await;
        let cx = FollowUpContext::new(&ctx, &published, &entities);

        let err = RegisterChild::new("create_child", "factory", "artifact_1", 1)
            .run(&cx)
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::Build { .. }));
    }
}
