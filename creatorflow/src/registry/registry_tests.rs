//! Comprehensive tests for registry module.

#[cfg(test)]
mod tests {
    use crate::core::{
        CreatorId, PipelineStatus, RunDescriptor, RunId, RunMetrics, RunStatus, RunTrigger,
    };
    use crate::errors::PipelineError;
    use crate::events::{clear_alert_sink, set_alert_sink, Alert, CollectingAlertSink};
    use crate::registry::{InMemoryRegistryStore, PipelineRegistry};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn registry() -> (PipelineRegistry, Arc<InMemoryRegistryStore>) {
        let store = Arc::new(InMemoryRegistryStore::new());
        (PipelineRegistry::new(store.clone()), store)
    }

    fn descriptor(run_id: &str, creator_id: &str) -> RunDescriptor {
        RunDescriptor::new(RunId::new(run_id), CreatorId::new(creator_id))
            .with_trigger(RunTrigger::Onboarding)
    }

    #[tokio::test]
    async fn test_begin_run_is_idempotent() {
        let (registry, store) = registry();

        let first = registry.begin_run(descriptor("r1", "c1")).await.unwrap();
        let second = registry.begin_run(descriptor("r1", "c1")).await.unwrap();

        assert_eq!(first.started_at, second.started_at);
        assert_eq!(store.run_count(), 1);
    }

    #[tokio::test]
    async fn test_ensure_active_run_passes_for_owner() {
        let (registry, _) = registry();
        let creator = CreatorId::new("c1");
        let run = RunId::new("r1");

        registry.take_ownership(&creator, &run).await.unwrap();
        assert!(registry.ensure_active_run(&creator, &run).await.is_ok());
    }

    #[tokio::test]
    async fn test_ensure_active_run_reports_current_owner() {
        let (registry, _) = registry();
        let creator = CreatorId::new("c1");

        registry.take_ownership(&creator, &RunId::new("r2")).await.unwrap();

        let err = registry
            .ensure_active_run(&creator, &RunId::new("r1"))
            .await
            .unwrap_err();
        match err {
            PipelineError::Superseded(exit) => {
                assert_eq!(exit.run_id, RunId::new("r1"));
                assert_eq!(exit.current_owner, Some(RunId::new("r2")));
            }
            other => panic!("expected superseded exit, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_ensure_active_run_fails_for_unseen_creator() {
        let (registry, _) = registry();
        let err = registry
            .ensure_active_run(&CreatorId::new("ghost"), &RunId::new("r1"))
            .await
            .unwrap_err();
        assert!(err.is_superseded());
    }

    #[tokio::test]
    async fn test_take_ownership_resets_to_pending() {
        let (registry, _) = registry();
        let creator = CreatorId::new("c1");

        let previous = registry.take_ownership(&creator, &RunId::new("r1")).await.unwrap();
        assert_eq!(previous, None);

        let state = registry.get_state(&creator).await.unwrap().unwrap();
        assert_eq!(state.pipeline_run_id, Some(RunId::new("r1")));
        assert_eq!(state.status, PipelineStatus::Pending);
    }

    #[tokio::test]
    async fn test_newer_run_supersedes_older() {
        let (registry, _) = registry();
        let creator = CreatorId::new("c1");
        let r1 = RunId::new("r1");
        let r2 = RunId::new("r2");

        // r1 launches and gets partway through.
        registry.begin_run(descriptor("r1", "c1")).await.unwrap();
        registry.take_ownership(&creator, &r1).await.unwrap();
        assert!(registry.set_status(&creator, &r1, PipelineStatus::Indexing).await.unwrap());

        // r2 launches while r1 is mid-flight.
        registry.begin_run(descriptor("r2", "c1")).await.unwrap();
        let previous = registry.take_ownership(&creator, &r2).await.unwrap();
        assert_eq!(previous, Some(r1.clone()));
        registry.mark_superseded(&r1, Some(&r2)).await.unwrap();

        // r1's guard now reports the supersession, naming r2.
        let err = registry.ensure_active_run(&creator, &r1).await.unwrap_err();
        match err {
            PipelineError::Superseded(exit) => {
                assert_eq!(exit.current_owner, Some(r2.clone()));
            }
            other => panic!("expected superseded exit, got {other}"),
        }

        // r1's writes no longer apply.
        assert!(!registry.set_status(&creator, &r1, PipelineStatus::Clustering).await.unwrap());
        let state = registry.get_state(&creator).await.unwrap().unwrap();
        assert_eq!(state.status, PipelineStatus::Pending);
        assert_eq!(state.pipeline_run_id, Some(r2.clone()));

        // r1's record says superseded, and a late failure cannot rewrite it.
        registry.fail_run(&creator, &r1, "late failure").await.unwrap();
        let run = registry.get_run(&r1).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Superseded);
        assert_eq!(run.superseded_by, Some(r2));
        assert_eq!(run.failure_reason, None);
    }

    #[tokio::test]
    async fn test_claim_ownership_if_requires_expected_owner() {
        let (registry, _) = registry();
        let creator = CreatorId::new("c1");
        let r1 = RunId::new("r1");
        let fallback = r1.to_fallback();

        registry.take_ownership(&creator, &r1).await.unwrap();
        assert!(registry.claim_ownership_if(&creator, &r1, &fallback).await.unwrap());

        // A second claim against the original owner must lose.
        assert!(!registry.claim_ownership_if(&creator, &r1, &RunId::new("other")).await.unwrap());

        let state = registry.get_state(&creator).await.unwrap().unwrap();
        assert_eq!(state.pipeline_run_id, Some(fallback));
    }

    #[tokio::test]
    async fn test_release_ownership_only_for_owner() {
        let (registry, _) = registry();
        let creator = CreatorId::new("c1");
        let run = RunId::new("r1");

        registry.take_ownership(&creator, &run).await.unwrap();
        assert!(!registry.release_ownership(&creator, &RunId::new("r2")).await.unwrap());
        assert!(registry.release_ownership(&creator, &run).await.unwrap());

        let state = registry.get_state(&creator).await.unwrap().unwrap();
        assert_eq!(state.pipeline_run_id, None);
    }

    #[tokio::test]
    async fn test_fail_run_records_error_and_alerts() {
        let (registry, _) = registry();
        let creator = CreatorId::new("c-fail");
        let run = RunId::new("r-fail");
        let alerts = Arc::new(CollectingAlertSink::new());
        set_alert_sink(alerts.clone());

        registry.begin_run(descriptor("r-fail", "c-fail")).await.unwrap();
        registry.take_ownership(&creator, &run).await.unwrap();
        registry.fail_run(&creator, &run, "source exploded").await.unwrap();

        let record = registry.get_run(&run).await.unwrap().unwrap();
        assert_eq!(record.status, RunStatus::Failed);
        assert_eq!(record.failure_reason, Some("source exploded".to_string()));

        let state = registry.get_state(&creator).await.unwrap().unwrap();
        assert_eq!(state.status, PipelineStatus::Error);
        assert_eq!(state.last_error, Some("source exploded".to_string()));
        // Failure does not release the pointer; a host retry may still
        // relaunch under a fresh run id.
        assert_eq!(state.pipeline_run_id, Some(run.clone()));

        let raised = alerts.alerts_with_code(Alert::RUN_FAILED);
        assert!(raised.iter().any(|alert| alert.run_id == Some(run.clone())));
        clear_alert_sink();
    }

    #[tokio::test]
    async fn test_heartbeat_merges_until_terminal() {
        let (registry, _) = registry();
        let run = RunId::new("r1");
        registry.begin_run(descriptor("r1", "c1")).await.unwrap();

        let mut metrics = RunMetrics::new();
        metrics.set("items", 10);
        registry.heartbeat(&run, &metrics).await;

        let record = registry.get_run(&run).await.unwrap().unwrap();
        assert!(record.heartbeat_at.is_some());
        assert_eq!(record.metrics.get("items"), Some(&serde_json::Value::from(10)));

        registry.complete_run(&run).await.unwrap();
        let mut late = RunMetrics::new();
        late.set("items", 99);
        registry.heartbeat(&run, &late).await;

        let record = registry.get_run(&run).await.unwrap().unwrap();
        assert_eq!(record.metrics.get("items"), Some(&serde_json::Value::from(10)));
    }
}
