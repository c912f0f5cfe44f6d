//! Ready notification hook.

use crate::core::{CreatorId, RunId};
use async_trait::async_trait;

/// Hook fired after a creator's pipeline reaches ready.
///
/// Notification is best-effort: the ready status is already committed when
/// this fires, so implementations swallow their own delivery failures.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReadyNotifier: Send + Sync {
    /// Called once per run that reaches ready.
    async fn creator_ready(&self, creator_id: &CreatorId, run_id: &RunId);
}

/// Notifier for hosts that poll creator state instead of listening.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpNotifier;

#[async_trait]
impl ReadyNotifier for NoOpNotifier {
    async fn creator_ready(&self, _creator_id: &CreatorId, _run_id: &RunId) {
        // Intentionally empty - hosts poll state
    }
}

/// Notifier that logs through tracing.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl ReadyNotifier for LoggingNotifier {
    async fn creator_ready(&self, creator_id: &CreatorId, run_id: &RunId) {
        tracing::info!(creator_id = %creator_id, run_id = %run_id, "creator pipeline ready");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_notifier_expectations() {
        let mut notifier = MockReadyNotifier::new();
        notifier
            .expect_creator_ready()
            .withf(|creator_id, run_id| {
                creator_id == &CreatorId::new("c1") && run_id == &RunId::new("r1")
            })
            .times(1)
            .returning(|_, _| ());

        notifier
            .creator_ready(&CreatorId::new("c1"), &RunId::new("r1"))
            .await;
    }
}
