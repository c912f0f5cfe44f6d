//! Queue-first start delivery with ingress fallback and verification.

use super::ingress::HttpIngress;
use super::queue::{StartMessage, StartQueue};
use crate::config::DispatchConfig;
use crate::core::{CreatorId, RunId, RunTrigger};
use crate::errors::DispatchError;
use crate::events::{get_alert_sink, Alert};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Which transport accepted a start message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchTransport {
    /// The primary queue accepted the send.
    Queue,
    /// A fallback ingress endpoint accepted the send.
    Ingress {
        /// The endpoint that accepted it.
        endpoint: String,
    },
}

impl fmt::Display for DispatchTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queue => write!(f, "queue"),
            Self::Ingress { endpoint } => write!(f, "ingress({endpoint})"),
        }
    }
}

/// Whether a consumer visibly picked a start up within the verification
/// window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryVerification {
    /// The queue reported a started run for the event.
    Verified,
    /// Polling finished without seeing a started run. A signal, not a
    /// failure: the watchdog covers this case.
    NotVerified,
    /// The transport cannot report started runs, or polling is disabled.
    Unknown,
}

/// What a dispatch produced: the identifiers and how delivery went.
#[derive(Debug, Clone)]
pub struct DispatchReceipt {
    /// Run the message asks to execute.
    pub run_id: RunId,
    /// Deterministic id of this logical start.
    pub event_id: String,
    /// Transport that accepted the message.
    pub transport: DispatchTransport,
    /// Whether a consumer visibly started within the verification window.
    pub verification: DeliveryVerification,
}

/// Queue-first start delivery with HTTP fallback.
///
/// The queue is the primary transport. When it rejects a send, the
/// dispatcher degrades to posting the same message at the fallback ingress
/// endpoints and raises an alert so the degradation is visible. Only when
/// every transport fails does dispatch error.
pub struct RunDispatcher {
    queue: Arc<dyn StartQueue>,
    ingress: HttpIngress,
    config: DispatchConfig,
}

impl RunDispatcher {
    /// Creates a dispatcher over a queue and the configured ingress
    /// endpoints.
    #[must_use]
    pub fn new(queue: Arc<dyn StartQueue>, config: DispatchConfig) -> Self {
        let ingress = HttpIngress::new(config.clone());
        Self {
            queue,
            ingress,
            config,
        }
    }

    /// Builds and delivers a start message, generating a run id when the
    /// caller does not pick one. The receipt carries the effective run id.
    pub async fn dispatch_start(
        &self,
        creator_id: CreatorId,
        handle: impl Into<String> + Send,
        trigger: RunTrigger,
        run_id: Option<RunId>,
    ) -> Result<DispatchReceipt, DispatchError> {
        let run_id = run_id.unwrap_or_else(RunId::generate);
        let message = StartMessage::new(creator_id, handle, run_id, trigger);
        self.send(&message).await
    }

    /// Delivers a prepared start message: queue first, ingress on queue
    /// failure, then best-effort delivery verification.
    pub async fn send(&self, message: &StartMessage) -> Result<DispatchReceipt, DispatchError> {
        let transport = match self.queue.send_start(message).await {
            Ok(()) => DispatchTransport::Queue,
            Err(queue_error) => {
                tracing::warn!(
                    event_id = %message.event_id,
                    creator_id = %message.creator_id,
                    error = %queue_error,
                    "queue send failed, degrading to ingress"
                );
                get_alert_sink()
                    .raise(
                        Alert::warn(
                            Alert::DISPATCH_DEGRADED,
                            "queue send failed, trying ingress endpoints",
                        )
                        .with_creator(message.creator_id.clone())
                        .with_run(message.run_id.clone())
                        .with_context(serde_json::json!({
                            "event_id": message.event_id,
                            "queue_error": queue_error.to_string(),
                        })),
                    )
                    .await;

                match self.ingress.deliver(message).await {
                    Ok(endpoint) => DispatchTransport::Ingress { endpoint },
                    Err(ingress_error) => {
                        return Err(DispatchError::AllTransportsFailed {
                            event_id: message.event_id.clone(),
                            queue: queue_error.to_string(),
                            ingress: ingress_error.to_string(),
                        });
                    }
                }
            }
        };

        let verification = self.verify(&message.event_id).await;
        tracing::info!(
            event_id = %message.event_id,
            run_id = %message.run_id,
            transport = %transport,
            verification = ?verification,
            "start dispatched"
        );
        Ok(DispatchReceipt {
            run_id: message.run_id.clone(),
            event_id: message.event_id.clone(),
            transport,
            verification,
        })
    }

    /// Polls the queue's started-run records. Verification informs the
    /// caller; it never turns a delivered send into a failure.
    async fn verify(&self, event_id: &str) -> DeliveryVerification {
        if !self.queue.can_verify_delivery() || self.config.verify_attempts == 0 {
            return DeliveryVerification::Unknown;
        }
        for attempt in 0..self.config.verify_attempts {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.verify_interval_ms)).await;
            }
            match self.queue.runs_for_event(event_id).await {
                Ok(runs) if !runs.is_empty() => return DeliveryVerification::Verified,
                Ok(_) => {}
                Err(error) => {
                    tracing::debug!(event_id, %error, "verification poll failed");
                }
            }
        }
        DeliveryVerification::NotVerified
    }
}

impl fmt::Debug for RunDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunDispatcher")
            .field("ingress_endpoints", &self.config.ingress_endpoints.len())
            .finish_non_exhaustive()
    }
}
