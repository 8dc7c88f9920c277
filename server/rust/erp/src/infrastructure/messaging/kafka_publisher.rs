use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use yeelo_outbox::{OutboxError, OutboxMessage, OutboxPublisher};

use super::KafkaConfig;

/// KafkaOutboxPublisher は rdkafka FutureProducer でアウトボックスメッセージを発行する。
pub struct KafkaOutboxPublisher {
    producer: FutureProducer,
    timeout: Duration,
}

impl KafkaOutboxPublisher {
    pub fn new(config: &KafkaConfig) -> anyhow::Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", config.brokers.join(","))
            .set("security.protocol", &config.security_protocol)
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .set("message.timeout.ms", config.message_timeout_ms.to_string())
            .create()?;

        Ok(Self {
            producer,
            timeout: Duration::from_millis(config.message_timeout_ms),
        })
    }
}

#[async_trait]
impl OutboxPublisher for KafkaOutboxPublisher {
    async fn publish(&self, message: &OutboxMessage) -> Result<(), OutboxError> {
        let payload = serde_json::to_vec(&message.payload)?;
        let event_id = message.id.to_string();
        let headers = OwnedHeaders::new()
            .insert(Header {
                key: "event_type",
                value: Some(message.event_type.as_str()),
            })
            .insert(Header {
                key: "event_id",
                value: Some(event_id.as_str()),
            });

        let record = FutureRecord::to(&message.topic)
            .key(&message.partition_key)
            .payload(&payload)
            .headers(headers);

        self.producer
            .send(record, self.timeout)
            .await
            .map_err(|(err, _)| {
                OutboxError::PublishError(format!(
                    "failed to publish to topic {}: {err}",
                    message.topic
                ))
            })?;

        tracing::debug!(
            message_id = %message.id,
            topic = %message.topic,
            event_type = %message.event_type,
            "outbox message published"
        );
        Ok(())
    }
}
