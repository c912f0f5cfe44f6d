//! HTTP fallback delivery for start messages.
//!
//! When the queue rejects a send, the dispatcher posts the same message to
//! each configured ingress endpoint in order and stops at the first 2xx.
//! Endpoints sit in front of the same consumer fleet as the queue, so an
//! accepted post is as good as an accepted queue send.

use super::queue::StartMessage;
use crate::config::DispatchConfig;
use crate::errors::DispatchError;
use crate::pipeline::{with_retry, RetryConfig};
use std::time::Duration;

/// Posts start messages to the ordered fallback endpoints.
#[derive(Debug)]
pub struct HttpIngress {
    client: reqwest::Client,
    config: DispatchConfig,
}

impl HttpIngress {
    /// Creates an ingress sender over the configured endpoints.
    #[must_use]
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Endpoints tried, in order.
    #[must_use]
    pub fn endpoints(&self) -> &[String] {
        &self.config.ingress_endpoints
    }

    /// Delivers one message, trying each endpoint in order with bounded
    /// linear-backoff retries. Returns the endpoint that accepted it.
    pub async fn deliver(&self, message: &StartMessage) -> Result<String, DispatchError> {
        if self.config.ingress_endpoints.is_empty() {
            return Err(DispatchError::ingress(
                message.event_id.clone(),
                0,
                "no ingress endpoints configured",
            ));
        }

        let retry = RetryConfig::new()
            .with_max_attempts(self.config.attempts_per_endpoint)
            .with_base_delay_ms(self.config.retry_base_delay_ms);
        let mut last_error = String::new();

        for endpoint in &self.config.ingress_endpoints {
            match with_retry(&retry, "ingress_post", || self.post(endpoint, message)).await {
                Ok(()) => {
                    tracing::info!(
                        event_id = %message.event_id,
                        endpoint = endpoint.as_str(),
                        "ingress delivery accepted"
                    );
                    return Ok(endpoint.clone());
                }
                Err(error) => {
                    tracing::warn!(
                        event_id = %message.event_id,
                        endpoint = endpoint.as_str(),
                        error = error.as_str(),
                        "ingress endpoint exhausted"
                    );
                    last_error = error;
                }
            }
        }

        Err(DispatchError::ingress(
            message.event_id.clone(),
            self.config.ingress_endpoints.len(),
            last_error,
        ))
    }

    async fn post(&self, endpoint: &str, message: &StartMessage) -> Result<(), String> {
        let send = self.client.post(endpoint).json(message).send();
        let response = tokio::time::timeout(
            Duration::from_millis(self.config.request_timeout_ms),
            send,
        )
        .await
        .map_err(|_| format!("request timed out after {}ms", self.config.request_timeout_ms))?
        .map_err(|error| error.to_string())?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(format!("endpoint returned {status}"))
        }
    }
}
