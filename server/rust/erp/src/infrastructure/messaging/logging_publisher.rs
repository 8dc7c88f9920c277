use async_trait::async_trait;
use yeelo_outbox::{OutboxError, OutboxMessage, OutboxPublisher};

/// Kafka 未設定時にアウトボックスを消化するパブリッシャー。イベントはログに出力するだけ。
#[derive(Debug, Default)]
pub struct LoggingOutboxPublisher;

#[async_trait]
impl OutboxPublisher for LoggingOutboxPublisher {
    async fn publish(&self, message: &OutboxMessage) -> Result<(), OutboxError> {
        tracing::info!(
            message_id = %message.id,
            topic = %message.topic,
            event_type = %message.event_type,
            partition_key = %message.partition_key,
            payload = %message.payload,
            "outbox event (kafka disabled)"
        );
        Ok(())
    }
}
