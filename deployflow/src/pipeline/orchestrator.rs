//! The deployment run: four checkpointed stages in a fixed order.
//!
//! Each stage first looks for its own checkpoint. When one exists the stage
//! is skipped and the checkpoint feeds the next stage, so a rerun after any
//! failure resumes where the previous attempt stopped. Cancellation is only
//! observed between stages.

use super::bootstrapper::{EntityBootstrapper, EntitySpec, EntityState};
use super::context::StageContext;
use super::followup::{FollowUp, FollowUpOutcome};
use super::minter::{BootstrapMinter, BootstrapToken, TokenDescriptor};
use super::publisher::{PublicationStager, PublishedArtifact};
use super::resolver::{resolve, verify_order};
use crate::artifacts::{ArtifactSpec, Bindings, OneShotPolicyBuilder, ParamValue, ResolvedArtifact};
use crate::cancellation::CancellationToken;
use crate::checkpoint::{CheckpointStore, Checkpoints, StageName};
use crate::config::DeployConfig;
use crate::context::RunIdentity;
use crate::core::{OutputRef, Quantity};
use crate::errors::{DeployError, StageFailure};
use crate::events::{EventKind, EventSink, NoOpEventSink, RunEvents};
use crate::ledger::{ConfirmationPolicy, LedgerClient};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Everything a deployment creates, described as data.
#[derive(Clone, Default)]
pub struct DeploymentPlan {
    /// Seed output for the token mint; a fresh one is prepared when absent.
    pub seed: Option<OutputRef>,
    /// Bootstrap tokens, minted from one seed.
    pub tokens: Vec<TokenDescriptor>,
    /// Template for the tokens' one-shot policies.
    pub mint_policy: OneShotPolicyBuilder,
    /// Artifacts to resolve and publish.
    pub artifacts: Vec<ArtifactSpec>,
    /// Values for binding slots beyond the token bindings.
    pub bindings: Bindings,
    /// Initial entities.
    pub entities: Vec<EntitySpec>,
    /// Transitions run after the entities exist.
    pub follow_ups: Vec<Arc<dyn FollowUp>>,
}

impl fmt::Debug for DeploymentPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploymentPlan")
            .field("seed", &self.seed)
            .field("tokens", &self.tokens)
            .field("mint_policy", &self.mint_policy)
            .field("artifacts", &self.artifacts)
            .field("bindings", &self.bindings)
            .field("entities", &self.entities)
            .field("follow_ups", &self.follow_ups.iter().map(|f| f.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl DeploymentPlan {
    /// Creates an empty plan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses an existing output as the mint seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: OutputRef) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Adds a bootstrap token.
    #[must_use]
    pub fn with_token(mut self, token: TokenDescriptor) -> Self {
        self.tokens.push(token);
        self
    }

    /// Uses a different one-shot policy template.
    #[must_use]
    pub fn with_mint_policy(mut self, policy: OneShotPolicyBuilder) -> Self {
        self.mint_policy = policy;
        self
    }

    /// Adds an artifact.
    #[must_use]
    pub fn with_artifact(mut self, spec: ArtifactSpec) -> Self {
        self.artifacts.push(spec);
        self
    }

    /// Adds a binding.
    #[must_use]
    pub fn with_binding(mut self, key: impl Into<String>, value: ParamValue) -> Self {
        self.bindings.insert(key, value);
        self
    }

    /// Adds an entity.
    #[must_use]
    pub fn with_entity(mut self, entity: EntitySpec) -> Self {
        self.entities.push(entity);
        self
    }

    /// Adds a follow-up transition.
    #[must_use]
    pub fn with_follow_up(mut self, follow_up: Arc<dyn FollowUp>) -> Self {
        self.follow_ups.push(follow_up);
        self
    }
}

/// The final record of a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentSummary {
    /// Run id.
    pub run_id: String,
    /// Minted tokens by name.
    pub tokens: BTreeMap<String, BootstrapToken>,
    /// Published artifacts by name.
    pub artifacts: BTreeMap<String, PublishedArtifact>,
    /// Created entities by name.
    pub entities: BTreeMap<String, EntityState>,
    /// Follow-up outcomes in plan order.
    pub follow_ups: Vec<FollowUpOutcome>,
}

/// Bindings exposing each token's policy and asset name to artifact specs.
///
/// Keys are `<token>.policy` and `<token>.asset_name`.
#[must_use]
pub fn token_bindings(tokens: &BTreeMap<String, BootstrapToken>) -> Bindings {
    let mut bindings = Bindings::new();
    for (name, token) in tokens {
        bindings.insert(format!("{name}.policy"), ParamValue::Identity(token.asset.policy));
        bindings.insert(
            format!("{name}.asset_name"),
            ParamValue::Bytes(token.asset.name.as_bytes().to_vec()),
        );
    }
    bindings
}

type StageResult<T> = Result<T, (StageName, DeployError)>;

/// Reports a run whose future is dropped before the stages return.
struct AbandonGuard<'a> {
    events: &'a RunEvents,
    armed: bool,
}

impl<'a> AbandonGuard<'a> {
    const fn new(events: &'a RunEvents) -> Self {
        Self { events, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!(run_id = %self.events.identity().run_id, "Deployment dropped before finishing");
            self.events.try_emit(EventKind::RunAbandoned, json!({}));
        }
    }
}

/// Runs a deployment plan against a ledger, checkpointing every stage.
pub struct Deployment {
    ledger: Arc<dyn LedgerClient>,
    store: Arc<dyn CheckpointStore>,
    config: DeployConfig,
    sink: Arc<dyn EventSink>,
    cancellation: CancellationToken,
    policy: ConfirmationPolicy,
}

impl fmt::Debug for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deployment")
            .field("config", &self.config)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Deployment {
    /// Creates a deployment. Confirmation waits follow the config.
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerClient>, store: Arc<dyn CheckpointStore>, config: DeployConfig) -> Self {
        let policy = config.confirmation_policy();
        Self {
            ledger,
            store,
            config,
            sink: Arc::new(NoOpEventSink),
            cancellation: CancellationToken::new(),
            policy,
        }
    }

    /// Routes events to a sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Observes a cancellation token between stages.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Overrides the confirmation wait derived from the config.
    #[must_use]
    pub const fn with_confirmation_policy(mut self, policy: ConfirmationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The run configuration.
    #[must_use]
    pub const fn config(&self) -> &DeployConfig {
        &self.config
    }

    /// Runs every stage, skipping those already checkpointed.
    pub async fn run(&self, plan: &DeploymentPlan) -> Result<DeploymentSummary, StageFailure> {
        let identity = RunIdentity::new(&self.config.run_id);
        let ctx = StageContext::new(
            Arc::clone(&self.ledger),
            Checkpoints::new(Arc::clone(&self.store), &self.config.run_id),
            RunEvents::new(Arc::clone(&self.sink), identity.clone()),
            self.policy,
        );

        if let Err(e) = self.config.validate() {
            error!(run_id = %identity.run_id, error = %e, "Deployment refused");
            ctx.events
                .emit(
                    EventKind::StageFailed,
                    json!({
                        "stage": Json::Null,
                        "code": e.error_info().code,
                        "error": e.to_string(),
                        "ambiguous": false,
                    }),
                )
                .await;
            return Err(StageFailure::preflight(e));
        }

        info!(
            run_id = %identity.run_id,
            attempt_id = %identity.attempt_id,
            artifacts = plan.artifacts.len(),
            entities = plan.entities.len(),
            "Deployment started"
        );
        let start = Instant::now();

        let guard = AbandonGuard::new(&ctx.events);
        let outcome = self.run_stages(&ctx, plan).await;
        guard.disarm();

        match outcome {
            Ok(summary) => {
                info!(
                    run_id = %identity.run_id,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Deployment finished"
                );
                Ok(summary)
            }
            Err((stage, e)) => Err(self.failure(&ctx, stage, e).await),
        }
    }

    async fn run_stages(&self, ctx: &StageContext, plan: &DeploymentPlan) -> StageResult<DeploymentSummary> {
        let stage = StageName::BootstrapTokens;
        let tokens = self.tokens_stage(ctx, plan).await.map_err(|e| (stage, e))?;

        let stage = StageName::ResolvedArtifacts;
        let resolved = self
            .resolve_stage(ctx, plan, &tokens)
            .await
            .map_err(|e| (stage, e))?;

        let stage = StageName::PublishedArtifacts;
        let published = self
            .publish_stage(ctx, &resolved)
            .await
            .map_err(|e| (stage, e))?;

        let stage = StageName::FinalSummary;
        self.summary_stage(ctx, plan, tokens, published)
            .await
            .map_err(|e| (stage, e))
    }

    async fn tokens_stage(
        &self,
        ctx: &StageContext,
        plan: &DeploymentPlan,
    ) -> Result<BTreeMap<String, BootstrapToken>, DeployError> {
        let stage = StageName::BootstrapTokens;
        self.cancellation.check()?;
        if let Some(tokens) = ctx
            .checkpoints
            .load::<BTreeMap<String, BootstrapToken>>(stage)
            .await?
        {
            let expected: BTreeSet<&str> = plan.tokens.iter().map(|t| t.name.as_str()).collect();
            let found: BTreeSet<&str> = tokens.keys().map(String::as_str).collect();
            if expected != found {
                return Err(DeployError::mismatch(stage, "minted tokens differ from the plan"));
            }
            self.skipped(ctx, stage).await;
            return Ok(tokens);
        }

        let started = self.started(ctx, stage).await;
        let tokens = if plan.tokens.is_empty() {
            let tokens = BTreeMap::new();
            ctx.checkpoints.save(stage, &tokens).await?;
            tokens
        } else {
            let mut minter =
                BootstrapMinter::new(ctx.clone()).with_policy_builder(plan.mint_policy.clone());
            let seed = match plan.seed {
                Some(seed) => seed,
                None => {
                    minter
                        .prepare_seed(Quantity::from(self.config.seed_output_coin))
                        .await?
                }
            };
            minter.mint(seed, &plan.tokens).await?
        };
        self.completed(ctx, stage, started, json!({"tokens": tokens.len()}))
            .await;
        Ok(tokens)
    }

    async fn resolve_stage(
        &self,
        ctx: &StageContext,
        plan: &DeploymentPlan,
        tokens: &BTreeMap<String, BootstrapToken>,
    ) -> Result<Vec<ResolvedArtifact>, DeployError> {
        let stage = StageName::ResolvedArtifacts;
        self.cancellation.check()?;
        if let Some(resolved) = ctx.checkpoints.load::<Vec<ResolvedArtifact>>(stage).await? {
            let names: Vec<&str> = resolved.iter().map(|a| a.name.as_str()).collect();
            if names.len() != plan.artifacts.len() {
                return Err(DeployError::mismatch(
                    stage,
                    format!(
                        "checkpoint holds {} artifacts, plan declares {}",
                        names.len(),
                        plan.artifacts.len()
                    ),
                ));
            }
            verify_order(&plan.artifacts, &names).map_err(|e| DeployError::mismatch(stage, e.to_string()))?;
            self.skipped(ctx, stage).await;
            return Ok(resolved);
        }

        let started = self.started(ctx, stage).await;
        let mut bindings = token_bindings(tokens);
        bindings.extend(&plan.bindings);
        let resolved = resolve(&plan.artifacts, &bindings)?;
        ctx.checkpoints.save(stage, &resolved).await?;
        self.completed(ctx, stage, started, json!({"artifacts": resolved.len()}))
            .await;
        Ok(resolved)
    }

    async fn publish_stage(
        &self,
        ctx: &StageContext,
        resolved: &[ResolvedArtifact],
    ) -> Result<BTreeMap<String, PublishedArtifact>, DeployError> {
        let stage = StageName::PublishedArtifacts;
        self.cancellation.check()?;
        if let Some(published) = ctx
            .checkpoints
            .load::<BTreeMap<String, PublishedArtifact>>(stage)
            .await?
        {
            let expected: BTreeSet<&str> = resolved.iter().map(|a| a.name.as_str()).collect();
            let found: BTreeSet<&str> = published.keys().map(String::as_str).collect();
            if expected != found {
                return Err(DeployError::mismatch(stage, "published artifacts differ from the resolved set"));
            }
            self.skipped(ctx, stage).await;
            return Ok(published);
        }

        let started = self.started(ctx, stage).await;
        let published = PublicationStager::new(ctx.clone())
            .with_reference_coin(Quantity::from(self.config.reference_output_coin))
            .with_max_batch_code_bytes(self.config.max_batch_code_bytes)
            .publish(resolved, self.config.batch_size)
            .await?;
        let batches = published.values().map(|p| p.batch + 1).max().unwrap_or(0);
        self.completed(
            ctx,
            stage,
            started,
            json!({"artifacts": published.len(), "batches": batches}),
        )
        .await;
        Ok(published)
    }

    async fn summary_stage(
        &self,
        ctx: &StageContext,
        plan: &DeploymentPlan,
        tokens: BTreeMap<String, BootstrapToken>,
        artifacts: BTreeMap<String, PublishedArtifact>,
    ) -> Result<DeploymentSummary, DeployError> {
        let stage = StageName::FinalSummary;
        self.cancellation.check()?;
        if let Some(summary) = ctx.checkpoints.load::<DeploymentSummary>(stage).await? {
            self.skipped(ctx, stage).await;
            return Ok(summary);
        }

        let started = self.started(ctx, stage).await;
        let bootstrapper = EntityBootstrapper::new(ctx.clone());
        let mut entities = bootstrapper.bootstrap(&artifacts, &plan.entities, &tokens).await?;
        let follow_ups = bootstrapper
            .run_follow_ups(&plan.follow_ups, &artifacts, &entities)
            .await;
        for outcome in &follow_ups {
            if let FollowUpOutcome::Succeeded(report) = outcome {
                if let Some(entity) = entities.get_mut(&report.entity) {
                    entity.advance(report);
                }
            }
        }

        let summary = DeploymentSummary {
            run_id: self.config.run_id.clone(),
            tokens,
            artifacts,
            entities,
            follow_ups,
        };
        ctx.checkpoints.save(stage, &summary).await?;
        let failed = summary.follow_ups.iter().filter(|o| !o.is_success()).count();
        self.completed(
            ctx,
            stage,
            started,
            json!({"entities": summary.entities.len(), "follow_ups_failed": failed}),
        )
        .await;
        Ok(summary)
    }

    async fn started(&self, ctx: &StageContext, stage: StageName) -> Instant {
        info!(stage = %stage, "Stage started");
        ctx.events
            .emit(EventKind::StageStarted, json!({"stage": stage.as_str()}))
            .await;
        Instant::now()
    }

    async fn skipped(&self, ctx: &StageContext, stage: StageName) {
        warn!(stage = %stage, "Checkpoint found, skipping stage");
        ctx.events
            .emit(
                EventKind::StageSkipped,
                json!({"stage": stage.as_str(), "reason": "checkpoint exists"}),
            )
            .await;
    }

    async fn completed(&self, ctx: &StageContext, stage: StageName, started: Instant, data: Json) {
        let duration_ms = started.elapsed().as_millis() as u64;
        info!(stage = %stage, duration_ms, "Stage completed");
        let mut payload = json!({"stage": stage.as_str(), "duration_ms": duration_ms});
        if let (Json::Object(target), Json::Object(extra)) = (&mut payload, data) {
            target.extend(extra);
        }
        ctx.events.emit(EventKind::StageCompleted, payload).await;
    }

    async fn failure(&self, ctx: &StageContext, stage: StageName, error: DeployError) -> StageFailure {
        // A store error here yields no checkpoint rather than replacing the stage error.
        let last_checkpoint = ctx.checkpoints.latest().await.unwrap_or_default();
        let info = error.error_info();
        error!(stage = %stage, code = %info.code, error = %error, "Stage failed");
        ctx.events
            .emit(
                EventKind::StageFailed,
                json!({
                    "stage": stage.as_str(),
                    "code": info.code,
                    "error": error.to_string(),
                    "ambiguous": error.is_ambiguous(),
                }),
            )
            .await;
        StageFailure::new(stage, last_checkpoint, error)
    }
}
