//! Alert sink trait and implementations.

use crate::core::{CreatorId, RunId};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

/// Severity of an operational alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    /// Degraded but self-healing, e.g. a fallback path engaged.
    Warn,
    /// Needs operator attention.
    Error,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// An operational alert raised by the dispatch or execution layers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    /// Stable dotted code, e.g. `pipeline.fallback.engaged`.
    pub code: String,
    /// Severity.
    pub level: AlertLevel,
    /// Creator involved, when known.
    pub creator_id: Option<CreatorId>,
    /// Run involved, when known.
    pub run_id: Option<RunId>,
    /// Human-readable description.
    pub message: String,
    /// Structured extra context.
    pub context: Option<serde_json::Value>,
}

impl Alert {
    /// The dispatch watchdog took over a run that never started.
    pub const FALLBACK_ENGAGED: &'static str = "pipeline.fallback.engaged";
    /// The watchdog's own execution failed; the creator is stuck.
    pub const FALLBACK_FAILED: &'static str = "pipeline.fallback.failed";
    /// A run ended in the error status.
    pub const RUN_FAILED: &'static str = "pipeline.run.failed";
    /// The queue transport failed and delivery fell back to HTTP ingress.
    pub const DISPATCH_DEGRADED: &'static str = "pipeline.dispatch.degraded";

    /// Creates a warn-level alert.
    #[must_use]
    pub fn warn(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            level: AlertLevel::Warn,
            creator_id: None,
            run_id: None,
            message: message.into(),
            context: None,
        }
    }

    /// Creates an error-level alert.
    #[must_use]
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            level: AlertLevel::Error,
            creator_id: None,
            run_id: None,
            message: message.into(),
            context: None,
        }
    }

    /// Attaches the creator involved.
    #[must_use]
    pub fn with_creator(mut self, creator_id: CreatorId) -> Self {
        self.creator_id = Some(creator_id);
        self
    }

    /// Attaches the run involved.
    #[must_use]
    pub fn with_run(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Attaches structured context.
    #[must_use]
    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }
}

/// Trait for sinks that receive operational alerts.
///
/// Raising an alert must never fail the operation that raised it; sink
/// implementations swallow their own errors.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Raises an alert asynchronously.
    async fn raise(&self, alert: Alert);

    /// Raises an alert without blocking.
    fn try_raise(&self, alert: Alert);
}

/// A sink that discards all alerts.
///
/// Used as the default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpAlertSink;

#[async_trait]
impl AlertSink for NoOpAlertSink {
    async fn raise(&self, _alert: Alert) {
        // Intentionally empty - discards all alerts
    }

    fn try_raise(&self, _alert: Alert) {
        // Intentionally empty - discards all alerts
    }
}

/// A sink that forwards alerts to the tracing framework.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlertSink;

impl TracingAlertSink {
    /// Creates a new tracing sink.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn log_alert(alert: &Alert) {
        match alert.level {
            AlertLevel::Warn => {
                tracing::warn!(
                    code = %alert.code,
                    creator_id = ?alert.creator_id,
                    run_id = ?alert.run_id,
                    context = ?alert.context,
                    "{}", alert.message
                );
            }
            AlertLevel::Error => {
                tracing::error!(
                    code = %alert.code,
                    creator_id = ?alert.creator_id,
                    run_id = ?alert.run_id,
                    context = ?alert.context,
                    "{}", alert.message
                );
            }
        }
    }
}

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn raise(&self, alert: Alert) {
        Self::log_alert(&alert);
    }

    fn try_raise(&self, alert: Alert) {
        Self::log_alert(&alert);
    }
}

/// A collecting sink for testing purposes.
#[derive(Debug, Default)]
pub struct CollectingAlertSink {
    alerts: parking_lot::RwLock<Vec<Alert>>,
}

impl CollectingAlertSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected alerts.
    #[must_use]
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.read().clone()
    }

    /// Returns the number of collected alerts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.alerts.read().len()
    }

    /// Returns true if no alert has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alerts.read().is_empty()
    }

    /// Clears all collected alerts.
    pub fn clear(&self) {
        self.alerts.write().clear();
    }

    /// Returns alerts carrying the given code.
    #[must_use]
    pub fn alerts_with_code(&self, code: &str) -> Vec<Alert> {
        self.alerts
            .read()
            .iter()
            .filter(|alert| alert.code == code)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AlertSink for CollectingAlertSink {
    async fn raise(&self, alert: Alert) {
        self.alerts.write().push(alert);
    }

    fn try_raise(&self, alert: Alert) {
        self.alerts.write().push(alert);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_builders() {
        let alert = Alert::warn(Alert::FALLBACK_ENGAGED, "queue start missing")
            .with_creator(CreatorId::new("c1"))
            .with_run(RunId::new("r1"))
            .with_context(serde_json::json!({"grace_ms": 100}));

        assert_eq!(alert.level, AlertLevel::Warn);
        assert_eq!(alert.code, "pipeline.fallback.engaged");
        assert_eq!(alert.run_id, Some(RunId::new("r1")));
    }

    #[tokio::test]
    async fn test_noop_sink() {
        let sink = NoOpAlertSink;
        sink.raise(Alert::warn("test.code", "message")).await;
        sink.try_raise(Alert::error("test.code", "message"));
        // Should not panic
    }

    #[tokio::test]
    async fn test_collecting_sink() {
        let sink = CollectingAlertSink::new();
        assert!(sink.is_empty());

        sink.raise(Alert::warn(Alert::FALLBACK_ENGAGED, "a")).await;
        sink.try_raise(Alert::error(Alert::RUN_FAILED, "b"));

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.alerts_with_code(Alert::RUN_FAILED).len(), 1);

        sink.clear();
        assert!(sink.is_empty());
    }
}
