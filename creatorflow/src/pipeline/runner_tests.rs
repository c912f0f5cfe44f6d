//! Comprehensive tests for the stage runner module.

#[cfg(test)]
mod tests {
    use crate::core::{
        CreatorId, PipelineStatus, RunDescriptor, RunId, RunStatus, RunTrigger,
    };
    use crate::errors::{InsufficientContent, PipelineError, SourceError};
    use crate::pipeline::{PipelineStage, RunContext, RunOutcome, StageRunner};
    use crate::testing::PipelineHarness;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tokio_test::assert_ok;

    struct RecordingStage {
        name: &'static str,
        entry: PipelineStatus,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl PipelineStage for RecordingStage {
        fn name(&self) -> &'static str {
            self.name
        }

        fn entry_status(&self) -> PipelineStatus {
            self.entry
        }

        async fn execute(&self, _ctx: &RunContext) -> Result<(), PipelineError> {
            self.log.lock().push(self.name);
            Ok(())
        }
    }

    struct FailingStage;

    #[async_trait]
    impl PipelineStage for FailingStage {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn entry_status(&self) -> PipelineStatus {
            PipelineStatus::Transcribing
        }

        async fn execute(&self, _ctx: &RunContext) -> Result<(), PipelineError> {
            Err(SourceError::new("list_content", "platform down").into())
        }
    }

    struct ThinCatalogStage;

    #[async_trait]
    impl PipelineStage for ThinCatalogStage {
        fn name(&self) -> &'static str {
            "thin"
        }

        fn entry_status(&self) -> PipelineStatus {
            PipelineStatus::Transcribing
        }

        async fn execute(&self, ctx: &RunContext) -> Result<(), PipelineError> {
            Err(InsufficientContent::new(ctx.creator_id().clone(), 1, 5).into())
        }
    }

    /// Takes the pointer for a competing run mid-stage, the way a second
    /// launch would.
    struct StealingStage {
        thief: RunId,
    }

    #[async_trait]
    impl PipelineStage for StealingStage {
        fn name(&self) -> &'static str {
            "stealing"
        }

        fn entry_status(&self) -> PipelineStatus {
            PipelineStatus::Scraping
        }

        async fn execute(&self, ctx: &RunContext) -> Result<(), PipelineError> {
            ctx.registry()
                .take_ownership(ctx.creator_id(), &self.thief)
                .await?;
            Ok(())
        }
    }

    fn descriptor(run_id: &str, creator_id: &str) -> RunDescriptor {
        RunDescriptor::new(RunId::new(run_id), CreatorId::new(creator_id))
            .with_trigger(RunTrigger::Onboarding)
    }

    #[tokio::test]
    async fn test_stages_run_in_order_and_run_completes() {
        let harness = PipelineHarness::new();
        let descriptor = descriptor("r1", "c1");
        tokio_test::assert_ok!(harness.begin_owned(&descriptor).await);

        let log = Arc::new(Mutex::new(Vec::new()));
        let runner = StageRunner::new(vec![
            Arc::new(RecordingStage {
                name: "first",
                entry: PipelineStatus::Scraping,
                log: log.clone(),
            }),
            Arc::new(RecordingStage {
                name: "second",
                entry: PipelineStatus::Transcribing,
                log: log.clone(),
            }),
        ]);

        let ctx = harness.context(descriptor.clone());
        let outcome = runner.run(&ctx).await;

        assert!(outcome.is_ready());
        assert_eq!(*log.lock(), vec!["first", "second"]);

        let run = harness
            .registry
            .get_run(&descriptor.run_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.finished_at.is_some());
        assert!(run.heartbeat_at.is_some());
        assert!(run.metrics.get("stage_first_ms").is_some());

        let state = harness
            .registry
            .get_state(&descriptor.creator_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.status, PipelineStatus::Transcribing);
    }

    #[tokio::test]
    async fn test_failed_stage_fails_run_and_keeps_pointer() {
        let harness = PipelineHarness::new();
        let descriptor = descriptor("r1", "c1");
        tokio_test::assert_ok!(harness.begin_owned(&descriptor).await);

        let runner = StageRunner::new(vec![Arc::new(FailingStage)]);
        let ctx = harness.context(descriptor.clone());
        let outcome = runner.run(&ctx).await;

        match outcome {
            RunOutcome::Failed { error } => assert!(error.to_string().contains("platform down")),
            other => panic!("expected failure, got {other:?}"),
        }

        let run = harness
            .registry
            .get_run(&descriptor.run_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.failure_reason.as_deref().unwrap().contains("platform down"));
        // The last stage metric names where the run died.
        assert_eq!(run.metrics.get("stage"), Some(&serde_json::Value::from("failing")));

        // The pointer stays with the failed run so a manual retry swaps
        // from a known value instead of racing a blank.
        let state = harness
            .registry
            .get_state(&descriptor.creator_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.status, PipelineStatus::Error);
        assert_eq!(state.pipeline_run_id, Some(descriptor.run_id.clone()));
        assert!(state.last_error.as_deref().unwrap().contains("platform down"));
    }

    #[tokio::test]
    async fn test_insufficient_content_is_a_clean_exit() {
        let harness = PipelineHarness::new();
        let descriptor = descriptor("r1", "c1");
        tokio_test::assert_ok!(harness.begin_owned(&descriptor).await);

        let runner = StageRunner::new(vec![Arc::new(ThinCatalogStage)]);
        let ctx = harness.context(descriptor.clone());
        let outcome = runner.run(&ctx).await;

        match outcome {
            RunOutcome::InsufficientContent { found, required } => {
                assert_eq!(found, 1);
                assert_eq!(required, 5);
            }
            other => panic!("expected insufficient content, got {other:?}"),
        }

        // The run record completes; thin content is an answer, not a failure.
        let run = harness
            .registry
            .get_run(&descriptor.run_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(run.status, RunStatus::Completed);

        let state = harness
            .registry
            .get_state(&descriptor.creator_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.status, PipelineStatus::InsufficientContent);
        assert_eq!(state.pipeline_run_id, None);
    }

    #[tokio::test]
    async fn test_superseded_mid_run_stops_at_next_boundary() {
        let harness = PipelineHarness::new();
        let descriptor = descriptor("r1", "c1");
        tokio_test::assert_ok!(harness.begin_owned(&descriptor).await);

        let log = Arc::new(Mutex::new(Vec::new()));
        let thief = RunId::new("r2");
        let runner = StageRunner::new(vec![
            Arc::new(StealingStage {
                thief: thief.clone(),
            }),
            Arc::new(RecordingStage {
                name: "never",
                entry: PipelineStatus::Transcribing,
                log: log.clone(),
            }),
        ]);

        let ctx = harness.context(descriptor.clone());
        let outcome = runner.run(&ctx).await;

        match outcome {
            RunOutcome::Superseded { by } => assert_eq!(by, Some(thief.clone())),
            other => panic!("expected supersession, got {other:?}"),
        }
        assert!(log.lock().is_empty());

        let run = harness
            .registry
            .get_run(&descriptor.run_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(run.status, RunStatus::Superseded);
        assert_eq!(run.superseded_by, Some(thief.clone()));

        // The thief keeps the pointer; the loser never touched it on exit.
        let state = harness
            .registry
            .get_state(&descriptor.creator_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.pipeline_run_id, Some(thief));
    }

    #[tokio::test]
    async fn test_run_without_ownership_supersedes_immediately() {
        let harness = PipelineHarness::new();
        let descriptor = descriptor("r1", "c1");
        // Record exists but the pointer was never taken.
        tokio_test::assert_ok!(harness.registry.begin_run(descriptor.clone()).await);

        let log = Arc::new(Mutex::new(Vec::new()));
        let runner = StageRunner::new(vec![Arc::new(RecordingStage {
            name: "never",
            entry: PipelineStatus::Scraping,
            log: log.clone(),
        })]);

        let ctx = harness.context(descriptor.clone());
        let outcome = runner.run(&ctx).await;

        assert!(matches!(outcome, RunOutcome::Superseded { .. }));
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn test_record_progress_lands_in_run_metrics() {
        let harness = PipelineHarness::new();
        let descriptor = descriptor("r1", "c1");
        tokio_test::assert_ok!(harness.begin_owned(&descriptor).await);

        let ctx = harness.context(descriptor.clone());
        ctx.record_progress("pages_fetched", 3).await;
        ctx.record_progress("stop_reason", "source_exhausted").await;

        let run = harness
            .registry
            .get_run(&descriptor.run_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(run.metrics.get("pages_fetched"), Some(&serde_json::Value::from(3)));
        assert_eq!(
            run.metrics.get("stop_reason"),
            Some(&serde_json::Value::from("source_exhausted"))
        );
        assert!(run.heartbeat_at.is_some());
    }
}
