//! Operational alerting for dispatch and run failures.
//!
//! Alerts are the pipeline's way of paging a human: fallback engagement,
//! fallback failure, and terminal run errors all flow through the sink
//! configured here.

mod sink;

pub use sink::{Alert, AlertLevel, AlertSink, CollectingAlertSink, NoOpAlertSink, TracingAlertSink};

use parking_lot::RwLock;
use std::sync::Arc;

static GLOBAL_ALERT_SINK: RwLock<Option<Arc<dyn AlertSink>>> = RwLock::new(None);

/// Sets the process-wide alert sink.
pub fn set_alert_sink(sink: Arc<dyn AlertSink>) {
    *GLOBAL_ALERT_SINK.write() = Some(sink);
}

/// Clears the process-wide alert sink.
pub fn clear_alert_sink() {
    *GLOBAL_ALERT_SINK.write() = None;
}

/// Gets the process-wide alert sink.
///
/// Returns a `NoOpAlertSink` if no sink is set.
pub fn get_alert_sink() -> Arc<dyn AlertSink> {
    GLOBAL_ALERT_SINK
        .read()
        .clone()
        .unwrap_or_else(|| Arc::new(NoOpAlertSink))
}
