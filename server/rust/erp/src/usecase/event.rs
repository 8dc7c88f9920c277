//! 業務イベントの生成。
//!
//! イベントはアウトボックスに業務データと同一トランザクションで保存され、
//! リレーが `{prefix}{stream}` トピックへ配信する。

use chrono::Utc;
use serde_json::{json, Value};
use yeelo_outbox::OutboxMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStream {
    Sales,
    Inventory,
    Purchases,
    Finance,
}

impl EventStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStream::Sales => "sales",
            EventStream::Inventory => "inventory",
            EventStream::Purchases => "purchases",
            EventStream::Finance => "finance",
        }
    }
}

pub mod event_type {
    pub const INVOICE_CREATED: &str = "invoice.created";
    pub const INVOICE_CANCELLED: &str = "invoice.cancelled";
    pub const INVENTORY_ADJUSTED: &str = "inventory.adjusted";
    pub const INVENTORY_LOW_STOCK: &str = "inventory.low_stock";
    pub const GRN_APPROVED: &str = "grn.approved";
    pub const JOURNAL_POSTED: &str = "journal.posted";
}

pub const DEFAULT_TOPIC_PREFIX: &str = "yeelo.";

/// EventFactory はアウトボックスメッセージを組み立てる。
#[derive(Debug, Clone)]
pub struct EventFactory {
    topic_prefix: String,
}

impl EventFactory {
    pub fn new(topic_prefix: impl Into<String>) -> Self {
        Self {
            topic_prefix: topic_prefix.into(),
        }
    }

    pub fn topic(&self, stream: EventStream) -> String {
        format!("{}{}", self.topic_prefix, stream.as_str())
    }

    /// ペイロードは `{event_id, event_type, occurred_at, data}` の封筒形式。
    pub fn build(
        &self,
        stream: EventStream,
        event_type: &str,
        partition_key: impl Into<String>,
        data: Value,
    ) -> OutboxMessage {
        let mut message =
            OutboxMessage::new(self.topic(stream), event_type, partition_key, Value::Null);
        message.payload = json!({
            "event_id": message.id,
            "event_type": event_type,
            "occurred_at": Utc::now().to_rfc3339(),
            "data": data,
        });
        message
    }
}

impl Default for EventFactory {
    fn default() -> Self {
        Self::new(DEFAULT_TOPIC_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_wraps_payload_in_envelope() {
        let factory = EventFactory::new("erp.");
        let message = factory.build(
            EventStream::Sales,
            event_type::INVOICE_CREATED,
            "inv-1",
            json!({"invoice_number": "INV-20240101-ABCDEF12"}),
        );

        assert_eq!(message.topic, "erp.sales");
        assert_eq!(message.event_type, "invoice.created");
        assert_eq!(message.partition_key, "inv-1");
        assert_eq!(message.payload["event_id"], json!(message.id));
        assert_eq!(message.payload["event_type"], "invoice.created");
        assert_eq!(
            message.payload["data"]["invoice_number"],
            "INV-20240101-ABCDEF12"
        );
        assert!(message.payload["occurred_at"].is_string());
    }

    #[test]
    fn test_default_prefix() {
        assert_eq!(EventFactory::default().topic(EventStream::Finance), "yeelo.finance");
    }
}
