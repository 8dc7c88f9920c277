pub mod kafka_publisher;
pub mod logging_publisher;
pub mod metered_publisher;

pub use kafka_publisher::KafkaOutboxPublisher;
pub use logging_publisher::LoggingOutboxPublisher;
pub use metered_publisher::MeteredPublisher;

use serde::Deserialize;

use crate::usecase::event::DEFAULT_TOPIC_PREFIX;

/// KafkaConfig は Kafka 接続の設定を表す。
#[derive(Debug, Clone, Deserialize)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    #[serde(default = "default_security_protocol")]
    pub security_protocol: String,
    /// トピック名は `{topic_prefix}{stream}`
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u64,
}

fn default_security_protocol() -> String {
    "PLAINTEXT".to_string()
}

fn default_topic_prefix() -> String {
    DEFAULT_TOPIC_PREFIX.to_string()
}

fn default_message_timeout_ms() -> u64 {
    5000
}
