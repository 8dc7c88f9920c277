use std::sync::Arc;

use async_trait::async_trait;
use yeelo_outbox::{OutboxError, OutboxMessage, OutboxPublisher};
use yeelo_telemetry::metrics::Metrics;

/// MeteredPublisher は発行結果をトピック単位のカウンタに記録する。
pub struct MeteredPublisher {
    inner: Arc<dyn OutboxPublisher>,
    metrics: Arc<Metrics>,
}

impl MeteredPublisher {
    pub fn new(inner: Arc<dyn OutboxPublisher>, metrics: Arc<Metrics>) -> Self {
        Self { inner, metrics }
    }
}

#[async_trait]
impl OutboxPublisher for MeteredPublisher {
    async fn publish(&self, message: &OutboxMessage) -> Result<(), OutboxError> {
        let result = self.inner.publish(message).await;
        match result {
            Ok(()) => self.metrics.record_outbox_published(&message.topic),
            Err(_) => self.metrics.record_outbox_failed(&message.topic),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingPublisher;

    #[async_trait]
    impl OutboxPublisher for FailingPublisher {
        async fn publish(&self, _message: &OutboxMessage) -> Result<(), OutboxError> {
            Err(OutboxError::PublishError("broker unavailable".to_string()))
        }
    }

    fn message() -> OutboxMessage {
        OutboxMessage::new("yeelo.finance", "journal.posted", "je-1", serde_json::json!({}))
    }

    #[tokio::test]
    async fn test_records_published() {
        let metrics = Arc::new(Metrics::new("yeelo-erp-test").unwrap());
        let publisher = MeteredPublisher::new(
            Arc::new(super::super::LoggingOutboxPublisher),
            metrics.clone(),
        );
        publisher.publish(&message()).await.unwrap();
        let text = metrics.gather_metrics();
        assert!(text.contains("outbox_messages_published_total"));
        assert!(text.contains("yeelo.finance"));
    }

    #[tokio::test]
    async fn test_records_failed_and_propagates_error() {
        let metrics = Arc::new(Metrics::new("yeelo-erp-test").unwrap());
        let publisher = MeteredPublisher::new(Arc::new(FailingPublisher), metrics.clone());
        assert!(publisher.publish(&message()).await.is_err());
        assert!(metrics
            .gather_metrics()
            .contains("outbox_messages_failed_total"));
    }
}
