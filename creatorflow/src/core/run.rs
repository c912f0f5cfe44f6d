//! Pipeline run records and their lifecycle metadata.

use crate::core::identity::{CreatorId, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle status of a run record.
///
/// A run leaves [`RunStatus::Running`] exactly once; terminal statuses are
/// never overwritten by a later finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The run is currently executing (or believed to be).
    Running,
    /// The run finished its stage sequence.
    Completed,
    /// The run stopped with an error.
    Failed,
    /// A newer run took the ownership pointer while this run was live.
    Superseded,
}

impl Default for RunStatus {
    fn default() -> Self {
        Self::Running
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Superseded => write!(f, "superseded"),
        }
    }
}

impl RunStatus {
    /// Returns true if the status represents a finished run.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// What caused a run to be launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    /// First ingestion after a creator connects their account.
    Onboarding,
    /// An operator or the creator asked for a re-run.
    ManualRetry,
    /// The dispatch watchdog took over a run that never started.
    AutoRecovery,
    /// A dead-lettered start message was replayed.
    DlqReplay,
    /// Trigger was not recorded.
    Unknown,
}

impl Default for RunTrigger {
    fn default() -> Self {
        Self::Unknown
    }
}

impl fmt::Display for RunTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Onboarding => write!(f, "onboarding"),
            Self::ManualRetry => write!(f, "manual_retry"),
            Self::AutoRecovery => write!(f, "auto_recovery"),
            Self::DlqReplay => write!(f, "dlq_replay"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Progress counters and labels attached to a run.
///
/// Keys are merged overwrite-by-key on heartbeat, so partial updates from
/// different stages accumulate instead of clobbering each other.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunMetrics(BTreeMap<String, serde_json::Value>);

impl RunMetrics {
    /// Creates an empty metrics map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a metric, replacing any previous value under the key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Adds to a numeric metric, treating a missing or non-numeric value as zero.
    pub fn increment(&mut self, key: impl Into<String>, by: i64) {
        let key = key.into();
        let current = self.0.get(&key).and_then(serde_json::Value::as_i64).unwrap_or(0);
        self.0.insert(key, serde_json::Value::from(current + by));
    }

    /// Returns the value under a key, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Merges another metrics map into this one, overwriting by key.
    pub fn merge(&mut self, other: &Self) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Returns true if no metric has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over recorded metrics in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }
}

/// Immutable facts about a run, fixed at launch time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunDescriptor {
    /// Unique id of this run attempt.
    pub run_id: RunId,
    /// Creator the run ingests content for.
    pub creator_id: CreatorId,
    /// What caused the launch.
    pub trigger: RunTrigger,
    /// Deterministic dispatch event id, when the run went through dispatch.
    pub event_id: Option<String>,
    /// Original run this one replays, for watchdog takeovers and DLQ replays.
    pub replay_of: Option<RunId>,
}

impl RunDescriptor {
    /// Creates a descriptor with an unknown trigger and no dispatch metadata.
    pub fn new(run_id: RunId, creator_id: CreatorId) -> Self {
        Self {
            run_id,
            creator_id,
            trigger: RunTrigger::Unknown,
            event_id: None,
            replay_of: None,
        }
    }

    /// Sets the launch trigger.
    #[must_use]
    pub fn with_trigger(mut self, trigger: RunTrigger) -> Self {
        self.trigger = trigger;
        self
    }

    /// Attaches the dispatch event id.
    #[must_use]
    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    /// Marks this run as a replay of an earlier one.
    #[must_use]
    pub fn with_replay_of(mut self, run_id: RunId) -> Self {
        self.replay_of = Some(run_id);
        self
    }
}

/// A persisted run record: one row per launch attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Unique id of this run attempt.
    pub run_id: RunId,
    /// Creator the run ingests content for.
    pub creator_id: CreatorId,
    /// What caused the launch.
    pub trigger: RunTrigger,
    /// Deterministic dispatch event id, when the run went through dispatch.
    pub event_id: Option<String>,
    /// Original run this one replays, for watchdog takeovers and DLQ replays.
    pub replay_of: Option<RunId>,
    /// Current lifecycle status.
    pub status: RunStatus,
    /// When the record was created.
    pub started_at: DateTime<Utc>,
    /// When the run reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
    /// Last liveness signal from the executing runner.
    pub heartbeat_at: Option<DateTime<Utc>>,
    /// Accumulated progress counters and labels.
    pub metrics: RunMetrics,
    /// Failure message, set when the run ends in [`RunStatus::Failed`].
    pub failure_reason: Option<String>,
    /// Run that took the pointer, set when the run ends superseded.
    pub superseded_by: Option<RunId>,
}

impl PipelineRun {
    /// Creates a running record from a descriptor, stamped with the current time.
    #[must_use]
    pub fn started(descriptor: RunDescriptor) -> Self {
        Self {
            run_id: descriptor.run_id,
            creator_id: descriptor.creator_id,
            trigger: descriptor.trigger,
            event_id: descriptor.event_id,
            replay_of: descriptor.replay_of,
            status: RunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            heartbeat_at: None,
            metrics: RunMetrics::new(),
            failure_reason: None,
            superseded_by: None,
        }
    }

    /// Returns true if the run has not reached a terminal status.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == RunStatus::Running
    }
}
