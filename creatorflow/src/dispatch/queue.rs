//! The start message and the queue transport that carries it.
//!
//! A start message is the only thing that crosses the process boundary at
//! launch time. Its event id is derived from the creator and run ids, so
//! re-sending the same logical start is recognizable as a duplicate by any
//! transport that remembers what it accepted.

use crate::core::{CreatorId, RunDescriptor, RunId, RunTrigger};
use crate::errors::DispatchError;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Derives the deterministic event id for a creator/run pair.
///
/// The same pair always produces the same id, which is what lets a queue
/// dedup a re-dispatched start instead of executing it twice.
#[must_use]
pub fn derive_event_id(creator_id: &CreatorId, run_id: &RunId) -> String {
    let digest = Sha256::digest(format!("{creator_id}:{run_id}").as_bytes());
    format!("evt:{}", &hex::encode(digest)[..32])
}

/// One request to execute a pipeline run, as it travels over a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartMessage {
    /// Creator to ingest.
    pub creator_id: CreatorId,
    /// Platform username the consumer's scraper works under.
    pub handle: String,
    /// Run the consumer must execute.
    pub run_id: RunId,
    /// What prompted the launch.
    pub trigger: RunTrigger,
    /// The failed run this start replays, for dead-letter replays.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub replay_of_run_id: Option<RunId>,
    /// Deterministic id of this logical start.
    pub event_id: String,
}

impl StartMessage {
    /// Builds a start message, deriving its event id.
    #[must_use]
    pub fn new(
        creator_id: CreatorId,
        handle: impl Into<String>,
        run_id: RunId,
        trigger: RunTrigger,
    ) -> Self {
        let event_id = derive_event_id(&creator_id, &run_id);
        Self {
            creator_id,
            handle: handle.into(),
            run_id,
            trigger,
            replay_of_run_id: None,
            event_id,
        }
    }

    /// Links the message to the failed run it replays.
    #[must_use]
    pub fn with_replay_of(mut self, run_id: RunId) -> Self {
        self.replay_of_run_id = Some(run_id);
        self
    }

    /// The descriptor a consumer executes this message as.
    #[must_use]
    pub fn to_descriptor(&self) -> RunDescriptor {
        let mut descriptor = RunDescriptor::new(self.run_id.clone(), self.creator_id.clone())
            .with_trigger(self.trigger)
            .with_event_id(self.event_id.clone());
        if let Some(replay_of) = &self.replay_of_run_id {
            descriptor = descriptor.with_replay_of(replay_of.clone());
        }
        descriptor
    }
}

/// Transport that carries start messages to whatever executes runs.
///
/// Sends must be idempotent on the event id: the dispatcher may deliver the
/// same logical start more than once and expects at most one execution.
#[async_trait]
pub trait StartQueue: Send + Sync {
    /// Delivers one start message.
    async fn send_start(&self, message: &StartMessage) -> Result<(), DispatchError>;

    /// Run ids a consumer has started for an event id. Only meaningful when
    /// [`can_verify_delivery`](Self::can_verify_delivery) returns true.
    async fn runs_for_event(&self, event_id: &str) -> Result<Vec<RunId>, DispatchError>;

    /// Whether this transport can answer [`runs_for_event`](Self::runs_for_event).
    fn can_verify_delivery(&self) -> bool {
        false
    }
}

/// In-process queue for tests and single-node deployments.
///
/// Sends are recorded in order and deduplicated by event id. There is no
/// built-in consumer: the embedding app (or the test) drains
/// [`sent`](Self::sent) itself and reports started runs back through
/// [`mark_run_started`](Self::mark_run_started).
#[derive(Debug, Default)]
pub struct LocalStartQueue {
    messages: Mutex<Vec<StartMessage>>,
    started: DashMap<String, Vec<RunId>>,
    fail_sends: AtomicUsize,
}

impl LocalStartQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` sends fail, to exercise transport fallback.
    pub fn fail_next_sends(&self, count: usize) {
        self.fail_sends.store(count, Ordering::SeqCst);
    }

    /// Messages accepted so far, in send order.
    #[must_use]
    pub fn sent(&self) -> Vec<StartMessage> {
        self.messages.lock().clone()
    }

    /// Records that a consumer started `run_id` for `event_id`.
    pub fn mark_run_started(&self, event_id: impl Into<String>, run_id: RunId) {
        self.started.entry(event_id.into()).or_default().push(run_id);
    }
}

#[async_trait]
impl StartQueue for LocalStartQueue {
    async fn send_start(&self, message: &StartMessage) -> Result<(), DispatchError> {
        let fail = self
            .fail_sends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(DispatchError::queue(
                message.event_id.clone(),
                "scripted send failure",
            ));
        }

        let mut messages = self.messages.lock();
        if messages.iter().any(|sent| sent.event_id == message.event_id) {
            tracing::debug!(event_id = %message.event_id, "duplicate start send ignored");
            return Ok(());
        }
        messages.push(message.clone());
        Ok(())
    }

    async fn runs_for_event(&self, event_id: &str) -> Result<Vec<RunId>, DispatchError> {
        Ok(self
            .started
            .get(event_id)
            .map(|runs| runs.value().clone())
            .unwrap_or_default())
    }

    fn can_verify_delivery(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn start(run: &str) -> StartMessage {
        StartMessage::new(
            CreatorId::new("c1"),
            "alice",
            RunId::new(run),
            RunTrigger::Onboarding,
        )
    }

    #[test]
    fn test_event_id_is_deterministic_per_pair() {
        let again = derive_event_id(&CreatorId::new("c1"), &RunId::new("r1"));
        let id = derive_event_id(&CreatorId::new("c1"), &RunId::new("r1"));
        assert_eq!(id, again);
        assert!(id.starts_with("evt:"));
        assert_eq!(id.len(), "evt:".len() + 32);

        assert_ne!(id, derive_event_id(&CreatorId::new("c1"), &RunId::new("r2")));
        assert_ne!(id, derive_event_id(&CreatorId::new("c2"), &RunId::new("r1")));
    }

    #[test]
    fn test_wire_shape() {
        let message = start("r1").with_replay_of(RunId::new("r0"));
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["creatorId"], "c1");
        assert_eq!(json["handle"], "alice");
        assert_eq!(json["runId"], "r1");
        assert_eq!(json["trigger"], "onboarding");
        assert_eq!(json["replayOfRunId"], "r0");
        assert_eq!(json["eventId"], message.event_id.as_str());

        // A non-replay message omits the replay field entirely.
        let json = serde_json::to_value(start("r1")).unwrap();
        assert!(!json.as_object().unwrap().contains_key("replayOfRunId"));

        let parsed: StartMessage = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, start("r1"));
    }

    #[test]
    fn test_descriptor_carries_launch_facts() {
        let message = start("r1").with_replay_of(RunId::new("r0"));
        let descriptor = message.to_descriptor();
        assert_eq!(descriptor.run_id, RunId::new("r1"));
        assert_eq!(descriptor.creator_id, CreatorId::new("c1"));
        assert_eq!(descriptor.trigger, RunTrigger::Onboarding);
        assert_eq!(descriptor.event_id.as_deref(), Some(message.event_id.as_str()));
        assert_eq!(descriptor.replay_of, Some(RunId::new("r0")));
    }

    #[tokio::test]
    async fn test_local_queue_dedups_by_event_id() {
        let queue = LocalStartQueue::new();
        queue.send_start(&start("r1")).await.unwrap();
        queue.send_start(&start("r1")).await.unwrap();
        queue.send_start(&start("r2")).await.unwrap();

        let sent = queue.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].run_id, RunId::new("r1"));
        assert_eq!(sent[1].run_id, RunId::new("r2"));
    }

    #[tokio::test]
    async fn test_scripted_failures_then_recovery() {
        let queue = LocalStartQueue::new();
        queue.fail_next_sends(2);
        assert!(queue.send_start(&start("r1")).await.is_err());
        assert!(queue.send_start(&start("r1")).await.is_err());

        queue.send_start(&start("r1")).await.unwrap();
        assert_eq!(queue.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_started_runs_are_queryable() {
        let queue = LocalStartQueue::new();
        let message = start("r1");
        queue.send_start(&message).await.unwrap();

        assert!(queue.can_verify_delivery());
        assert!(queue.runs_for_event(&message.event_id).await.unwrap().is_empty());

        queue.mark_run_started(message.event_id.clone(), RunId::new("r1"));
        assert_eq!(
            queue.runs_for_event(&message.event_id).await.unwrap(),
            vec![RunId::new("r1")]
        );
    }
}
