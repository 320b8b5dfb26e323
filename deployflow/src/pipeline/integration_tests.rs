//! End-to-end tests of deployment runs.

#[cfg(test)]
mod tests {
    use crate::artifacts::ParamValue;
    use crate::cancellation::CancellationToken;
    use crate::checkpoint::{
        CheckpointStore, Checkpoints, FileCheckpointStore, InMemoryCheckpointStore, StageName,
    };
    use crate::core::{Address, AssetName, KeyHash, OutputRef, Quantity, TxId, Value};
    use crate::errors::DeployError;
    use crate::events::{CollectingEventSink, EventSink};
    use crate::ledger::{
        Confirmation, ConfirmationPolicy, InMemoryLedger, LedgerClient, MockLedgerClient, TxOutput,
    };
    use crate::pipeline::{
        Deployment, DeploymentPlan, DeploymentSummary, FollowUpOutcome, RegisterChild,
        TokenDescriptor,
    };
    use crate::protocol::{dao_plan, DaoInput};
    use crate::testing::{dao_blueprint, sample_plan, test_config};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value as Json};
    use std::sync::Arc;
    use std::time::Duration;

    /// Cancels the run once a given stage reports completion.
    struct CancelAfter {
        stage: StageName,
        token: CancellationToken,
        inner: CollectingEventSink,
    }

    #[async_trait]
    impl EventSink for CancelAfter {
        async fn emit(&self, event_type: &str, data: Option<Json>) {
            let stage = data.as_ref().and_then(|d| d.get("stage")).and_then(Json::as_str);
            if event_type == "stage.completed" && stage == Some(self.stage.as_str()) {
                self.token.cancel("operator interrupt");
            }
            self.inner.emit(event_type, data).await;
        }

        fn try_emit(&self, event_type: &str, data: Option<Json>) {
            self.inner.try_emit(event_type, data);
        }
    }

    fn deployment(ledger: Arc<dyn LedgerClient>, store: InMemoryCheckpointStore, run_id: &str) -> Deployment {
        Deployment::new(ledger, Arc::new(store), test_config(run_id))
            .with_confirmation_policy(ConfirmationPolicy::immediate())
    }

    fn publish_labels(ledger: &InMemoryLedger) -> Vec<String> {
        ledger
            .transactions()
            .into_iter()
            .filter_map(|tx| tx.label)
            .filter(|label| label.starts_with("publish-batch"))
            .collect()
    }

    #[tokio::test]
    async fn test_full_run_publishes_in_batches() {
        let ledger = Arc::new(InMemoryLedger::new());
        let store = InMemoryCheckpointStore::new();
        let sink = Arc::new(CollectingEventSink::new());

        let summary = deployment(ledger.clone(), store.clone(), "full")
            .with_event_sink(sink.clone())
            .run(&sample_plan(11))
            .await
            .unwrap();

        assert_eq!(publish_labels(&ledger), vec!["publish-batch-0", "publish-batch-1"]);
        assert_eq!(summary.artifacts.len(), 11);
        assert_eq!(summary.artifacts["artifact_5"].batch, 0);
        assert_eq!(summary.artifacts["artifact_6"].batch, 1);
        assert_eq!(summary.artifacts["artifact_6"].location.index, 0);
        assert_eq!(sink.events_of_type("batch.confirmed").len(), 2);
        assert_eq!(sink.events_of_type("stage.completed").len(), 4);
        assert!(sink.events_of_type("stage.failed").is_empty());

        // Seed, mint, two batches, entities, follow-up.
        assert_eq!(ledger.submission_count(), 6);
        let checkpoints = Checkpoints::new(Arc::new(store), "full");
        let saved: DeploymentSummary = checkpoints.require(StageName::FinalSummary).await.unwrap();
        assert_eq!(saved, summary);
    }

    #[tokio::test]
    async fn test_chained_identities_follow_dependencies() {
        let ledger = Arc::new(InMemoryLedger::new());
        let summary = deployment(ledger, InMemoryCheckpointStore::new(), "chain")
            .run(&sample_plan(3))
            .await
            .unwrap();

        let auth_policy = summary.tokens["auth"].asset.policy;
        let first = &summary.artifacts["artifact_0"].artifact;
        assert!(first.params.contains(&ParamValue::Identity(auth_policy)));
        let second = &summary.artifacts["artifact_1"].artifact;
        assert!(second.params.contains(&ParamValue::Identity(first.identity)));
    }

    #[tokio::test]
    async fn test_resume_after_publication_skips_to_entities() {
        let ledger = Arc::new(InMemoryLedger::new());
        let store = InMemoryCheckpointStore::new();
        let token = CancellationToken::new();
        let sink = Arc::new(CancelAfter {
            stage: StageName::PublishedArtifacts,
            token: token.clone(),
            inner: CollectingEventSink::new(),
        });

        let failure = deployment(ledger.clone(), store.clone(), "resume")
            .with_event_sink(sink.clone())
            .with_cancellation(token)
            .run(&sample_plan(11))
            .await
            .unwrap_err();
        assert_eq!(failure.stage, Some(StageName::FinalSummary));
        assert_eq!(failure.last_checkpoint, Some(StageName::PublishedArtifacts));
        assert!(matches!(failure.error, DeployError::Cancelled(_)));
        assert_eq!(ledger.submission_count(), 4);

        let resumed_sink = Arc::new(CollectingEventSink::new());
        let resumed = deployment(ledger.clone(), store, "resume")
            .with_event_sink(resumed_sink.clone())
            .run(&sample_plan(11))
            .await
            .unwrap();

        assert_eq!(resumed_sink.events_of_type("stage.skipped").len(), 3);
        assert_eq!(publish_labels(&ledger).len(), 2);
        assert_eq!(ledger.submission_count(), 6);

        // A fresh ledger fed the same submissions ends in the same place.
        let fresh = deployment(Arc::new(InMemoryLedger::new()), InMemoryCheckpointStore::new(), "resume")
            .run(&sample_plan(11))
            .await
            .unwrap();
        assert_eq!(resumed.entities, fresh.entities);
        assert_eq!(resumed.artifacts, fresh.artifacts);
    }

    #[tokio::test]
    async fn test_completed_run_reruns_without_submitting() {
        let ledger = Arc::new(InMemoryLedger::new());
        let store = InMemoryCheckpointStore::new();
        let first = deployment(ledger.clone(), store.clone(), "again")
            .run(&sample_plan(4))
            .await
            .unwrap();
        let submitted = ledger.submission_count();

        let second = deployment(ledger.clone(), store, "again")
            .run(&sample_plan(4))
            .await
            .unwrap();

        assert_eq!(ledger.submission_count(), submitted);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_changed_plan_conflicts_with_checkpoint() {
        let ledger = Arc::new(InMemoryLedger::new());
        let store = InMemoryCheckpointStore::new();
        deployment(ledger.clone(), store.clone(), "drift")
            .run(&sample_plan(4))
            .await
            .unwrap();

        let mut plan = sample_plan(4);
        plan.tokens.push(TokenDescriptor::new(
            "extra",
            AssetName::utf8("extra").unwrap(),
            1u64,
        ));
        let failure = deployment(ledger, store, "drift").run(&plan).await.unwrap_err();

        assert_eq!(failure.stage, Some(StageName::BootstrapTokens));
        assert!(matches!(failure.error, DeployError::CheckpointMismatch { .. }));
    }

    #[tokio::test]
    async fn test_confirmation_timeout_is_not_retried() {
        let seed = OutputRef::new(TxId::digest(b"seed"), 0);
        let wallet = Address::Key(KeyHash::digest(b"wallet"));

        let mut ledger = MockLedgerClient::new();
        ledger.expect_wallet_address().returning(move || Ok(wallet));
        ledger.expect_query_outputs_by_reference().returning(move |refs| {
            Ok(refs
                .iter()
                .map(|_| Some(TxOutput::new(wallet, Value::coin(Quantity::new(20_000_000)))))
                .collect())
        });
        ledger
            .expect_submit()
            .times(1)
            .returning(|_| Ok(TxId::digest(b"mint")));
        ledger
            .expect_await_confirmation()
            .times(1)
            .returning(|_, _| Ok(Confirmation::TimedOut));

        let sink = Arc::new(CollectingEventSink::new());
        let store = InMemoryCheckpointStore::new();
        let plan = DeploymentPlan::new().with_seed(seed).with_token(TokenDescriptor::new(
            "auth",
            AssetName::from_hex("a4").unwrap(),
            1u64,
        ));
        let failure = deployment(Arc::new(ledger), store.clone(), "slow")
            .with_event_sink(sink.clone())
            .run(&plan)
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Some(StageName::BootstrapTokens));
        assert_eq!(failure.last_checkpoint, None);
        assert!(matches!(
            failure.error,
            DeployError::ConfirmationTimeout { tx_id, .. } if tx_id == TxId::digest(b"mint")
        ));
        assert!(failure.error.is_ambiguous());
        assert!(store.is_empty());

        let failed = sink.events_of_type("stage.failed");
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].as_ref().unwrap()["ambiguous"], json!(true));
    }

    #[tokio::test]
    async fn test_unconfirmed_batch_is_reported_as_ambiguous() {
        // Seed, mint, batch 0, then batch 1 never confirms.
        let ledger = Arc::new(InMemoryLedger::new().never_confirm(4));
        let store = InMemoryCheckpointStore::new();
        let sink = Arc::new(CollectingEventSink::new());

        let failure = deployment(ledger.clone(), store.clone(), "stuck")
            .with_event_sink(sink.clone())
            .run(&sample_plan(11))
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Some(StageName::PublishedArtifacts));
        assert!(matches!(
            failure.error,
            DeployError::PublicationFailed { batch: 1, timed_out: true, .. }
        ));
        assert!(failure.error.is_ambiguous());
        assert_eq!(ledger.submission_count(), 4);
        let hint = failure.error_info().fix_hint.unwrap();
        assert!(hint.contains("Inspect the ledger"));

        let failed = sink.events_of_type("stage.failed");
        assert_eq!(failed.len(), 1);
        let payload = failed[0].as_ref().unwrap();
        assert_eq!(payload["ambiguous"], json!(true));
        assert_eq!(payload["stage"], json!("published-artifacts"));
        assert_eq!(payload["code"], json!("DEPLOY-022-PUBLICATION_TIMEOUT"));
    }

    #[tokio::test]
    async fn test_invalid_config_is_refused_before_any_stage() {
        let ledger = Arc::new(InMemoryLedger::new());
        let store = InMemoryCheckpointStore::new();
        let sink = Arc::new(CollectingEventSink::new());

        let failure = Deployment::new(
            ledger.clone(),
            Arc::new(store.clone()),
            test_config("refused").with_batch_size(0),
        )
        .with_event_sink(sink.clone())
        .run(&sample_plan(2))
        .await
        .unwrap_err();

        assert_eq!(failure.stage, None);
        assert_eq!(failure.last_checkpoint, None);
        assert!(matches!(failure.error, DeployError::InvalidConfig(_)));
        assert_eq!(ledger.submission_count(), 0);
        assert!(store.is_empty());
        assert!(sink.events_of_type("stage.started").is_empty());

        let failed = sink.events_of_type("stage.failed");
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].as_ref().unwrap()["stage"], Json::Null);
    }

    #[tokio::test]
    async fn test_summary_tracks_entities_moved_by_follow_ups() {
        let ledger = Arc::new(InMemoryLedger::new());
        let store = InMemoryCheckpointStore::new();

        let summary = deployment(ledger.clone(), store.clone(), "moved")
            .run(&sample_plan(3))
            .await
            .unwrap();

        let FollowUpOutcome::Succeeded(report) = &summary.follow_ups[0] else {
            panic!("register_child should succeed");
        };
        let registry = &summary.entities["registry"];
        assert_eq!(registry.location, report.entity_location);
        assert_eq!(registry.datum.as_ref(), Some(&report.entity_datum));
        for entity in summary.entities.values() {
            assert!(!ledger.is_spent(&entity.location), "{} points at a spent output", entity.name);
            assert!(ledger.utxo(&entity.location).is_some());
        }

        let checkpoints = Checkpoints::new(Arc::new(store), "moved");
        let saved: DeploymentSummary = checkpoints.require(StageName::FinalSummary).await.unwrap();
        assert_eq!(saved.entities["registry"].location, report.entity_location);
    }

    #[tokio::test]
    async fn test_dropped_run_reports_abandonment() {
        // The seed transaction never confirms and the wait outlasts the caller.
        let ledger = Arc::new(InMemoryLedger::new().never_confirm(1));
        let sink = Arc::new(CollectingEventSink::new());
        let deployment = deployment(ledger, InMemoryCheckpointStore::new(), "dropped")
            .with_event_sink(sink.clone())
            .with_confirmation_policy(ConfirmationPolicy {
                timeout: Duration::from_secs(30),
                poll_interval: Duration::from_millis(5),
                settle_delay: Duration::ZERO,
            });

        let plan = sample_plan(2);
        let result = tokio::time::timeout(Duration::from_millis(50), deployment.run(&plan)).await;
        assert!(result.is_err());

        let abandoned = sink.events_of_type("run.abandoned");
        assert_eq!(abandoned.len(), 1);
        assert_eq!(abandoned[0].as_ref().unwrap()["run_id"], json!("dropped"));
        assert!(sink.events_of_type("stage.failed").is_empty());
    }

    #[tokio::test]
    async fn test_finished_run_reports_no_abandonment() {
        let sink = Arc::new(CollectingEventSink::new());
        deployment(Arc::new(InMemoryLedger::new()), InMemoryCheckpointStore::new(), "kept")
            .with_event_sink(sink.clone())
            .run(&sample_plan(2))
            .await
            .unwrap();

        assert!(sink.events_of_type("run.abandoned").is_empty());
    }

    #[tokio::test]
    async fn test_consumed_seed_fails_the_mint() {
        let ledger = Arc::new(InMemoryLedger::new());
        let seed = OutputRef::new(TxId::digest(b"funding"), 0);
        ledger.insert_output(
            seed,
            TxOutput::new(ledger.wallet(), Value::coin(Quantity::new(20_000_000))),
        );
        let plan = sample_plan(2).with_seed(seed);

        deployment(ledger.clone(), InMemoryCheckpointStore::new(), "seeded")
            .run(&plan)
            .await
            .unwrap();
        assert!(ledger.is_spent(&seed));

        // Checkpoints lost: the rerun must not mint a second set.
        let submitted = ledger.submission_count();
        let failure = deployment(ledger.clone(), InMemoryCheckpointStore::new(), "seeded")
            .run(&plan)
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Some(StageName::BootstrapTokens));
        assert!(matches!(failure.error, DeployError::SeedConsumed { seed: s } if s == seed));
        assert_eq!(ledger.submission_count(), submitted);
    }

    #[tokio::test]
    async fn test_failed_follow_up_does_not_fail_the_run() {
        let ledger = Arc::new(InMemoryLedger::new());
        let store = InMemoryCheckpointStore::new();
        let sink = Arc::new(CollectingEventSink::new());
        // The treasury datum is an empty constructor with no counter field.
        let plan = sample_plan(3).with_follow_up(Arc::new(RegisterChild::new(
            "broken_child",
            "treasury",
            "artifact_1",
            0,
        )));

        let summary = deployment(ledger, store.clone(), "partial")
            .with_event_sink(sink.clone())
            .run(&plan)
            .await
            .unwrap();

        assert_eq!(summary.follow_ups.len(), 2);
        let FollowUpOutcome::Succeeded(report) = &summary.follow_ups[0] else {
            panic!("first follow-up should succeed");
        };
        assert_eq!(report.minted.name.as_bytes(), &[0x18, 100]);
        assert!(matches!(
            &summary.follow_ups[1],
            FollowUpOutcome::Failed { name, .. } if name == "broken_child"
        ));
        assert_eq!(sink.events_of_type("followup.failed").len(), 1);

        let checkpoints = Checkpoints::new(Arc::new(store), "partial");
        assert_eq!(checkpoints.latest().await.unwrap(), Some(StageName::FinalSummary));
    }

    #[tokio::test]
    async fn test_lossy_checkpoint_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let envelope = json!({
            "stage": "bootstrap-tokens",
            "run_id": "lossy",
            "version": 1,
            "created_at": "2024-01-01T00:00:00Z",
            "payload": {"gt": {"quantity": 4.5e16}},
        });
        store
            .save("bootstrap-tokenslossy", &serde_json::to_vec(&envelope).unwrap())
            .await
            .unwrap();

        let ledger = Arc::new(InMemoryLedger::new());
        let failure = Deployment::new(ledger.clone(), Arc::new(store), test_config("lossy"))
            .with_confirmation_policy(ConfirmationPolicy::immediate())
            .run(&sample_plan(2))
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Some(StageName::BootstrapTokens));
        let DeployError::PrecisionLoss { path, .. } = &failure.error else {
            panic!("expected precision loss, got {}", failure.error);
        };
        assert!(path.ends_with("gt.quantity"));
        assert_eq!(ledger.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_file_checkpoints_resume_across_stores() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(InMemoryLedger::new());
        let deploy = |ledger: Arc<InMemoryLedger>| {
            Deployment::new(ledger, Arc::new(FileCheckpointStore::new(dir.path())), test_config("disk"))
                .with_confirmation_policy(ConfirmationPolicy::immediate())
        };

        let first = deploy(ledger.clone()).run(&sample_plan(3)).await.unwrap();
        let submitted = ledger.submission_count();
        let second = deploy(ledger.clone()).run(&sample_plan(3)).await.unwrap();

        assert_eq!(ledger.submission_count(), submitted);
        assert_eq!(first, second);
        assert!(dir.path().join("final-summarydisk.json").exists());
    }

    #[tokio::test]
    async fn test_dao_plan_end_to_end() {
        let input = DaoInput::new("_22", vec![0x11; 32]).unwrap();
        let plan = dao_plan(&input, &dao_blueprint()).unwrap();
        let ledger = Arc::new(InMemoryLedger::new());

        let summary = deployment(ledger.clone(), InMemoryCheckpointStore::new(), "_22")
            .run(&plan)
            .await
            .unwrap();

        assert_eq!(summary.tokens.len(), 7);
        assert_eq!(summary.artifacts.len(), 12);
        assert_eq!(summary.entities.len(), 7);
        assert_eq!(publish_labels(&ledger).len(), 2);

        let gt = &summary.tokens["gt"];
        assert_eq!(gt.asset.name.as_bytes(), b"gt_22");
        let escrow = &summary.entities["voting_escrow"];
        assert_eq!(escrow.value.asset(&gt.asset), input.gt_quantity);

        let [FollowUpOutcome::Succeeded(farm)] = summary.follow_ups.as_slice() else {
            panic!("create_farm should succeed: {:?}", summary.follow_ups);
        };
        assert_eq!(farm.sequence.get(), 10_007_199_254_740_992);
        assert_eq!(farm.minted.policy, summary.artifacts["smart_farm"].identity());
        let child = ledger.utxo(&farm.child_location).unwrap();
        assert_eq!(child.address, Address::Script(summary.artifacts["smart_farm"].identity()));
    }
}
