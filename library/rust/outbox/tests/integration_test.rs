use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use yeelo_outbox::{
    OutboxError, OutboxMessage, OutboxProcessor, OutboxPublisher, OutboxStatus, OutboxStore,
};

/// テスト用インメモリ OutboxStore 実装。
#[derive(Default)]
struct MemoryStore {
    messages: Mutex<Vec<OutboxMessage>>,
}

#[async_trait]
impl OutboxStore for MemoryStore {
    async fn save(&self, message: &OutboxMessage) -> Result<(), OutboxError> {
        self.messages.lock().await.push(message.clone());
        Ok(())
    }

    async fn claim_pending(
        &self,
        limit: u32,
        lease: Duration,
    ) -> Result<Vec<OutboxMessage>, OutboxError> {
        let now = Utc::now();
        let lease = chrono::Duration::from_std(lease)?;
        let mut guard = self.messages.lock().await;
        let mut claimed = Vec::new();
        for m in guard.iter_mut().filter(|m| m.is_processable_at(now)) {
            if claimed.len() >= limit as usize {
                break;
            }
            m.mark_processing(lease);
            claimed.push(m.clone());
        }
        Ok(claimed)
    }

    async fn update(&self, message: &OutboxMessage) -> Result<(), OutboxError> {
        let mut guard = self.messages.lock().await;
        if let Some(m) = guard.iter_mut().find(|m| m.id == message.id) {
            *m = message.clone();
        }
        Ok(())
    }

    async fn delete_delivered(&self, _older_than_days: u32) -> Result<u64, OutboxError> {
        let mut guard = self.messages.lock().await;
        let before = guard.len();
        guard.retain(|m| m.status != OutboxStatus::Delivered);
        Ok((before - guard.len()) as u64)
    }
}

#[derive(Default)]
struct RecordingPublisher {
    published: Mutex<Vec<String>>,
}

#[async_trait]
impl OutboxPublisher for RecordingPublisher {
    async fn publish(&self, message: &OutboxMessage) -> Result<(), OutboxError> {
        self.published.lock().await.push(message.event_type.clone());
        Ok(())
    }
}

fn sales_event(event_type: &str) -> OutboxMessage {
    OutboxMessage::new(
        "yeelo.sales",
        event_type,
        "inv-001",
        serde_json::json!({"invoice_id": "inv-001"}),
    )
}

#[tokio::test]
async fn test_claimed_messages_are_not_claimed_twice() {
    let store = MemoryStore::default();
    store.save(&sales_event("invoice.created")).await.unwrap();

    let first = store.claim_pending(10, Duration::from_secs(60)).await.unwrap();
    let second = store.claim_pending(10, Duration::from_secs(60)).await.unwrap();

    assert_eq!(first.len(), 1);
    assert!(second.is_empty());
}

#[tokio::test]
async fn test_processor_delivers_in_order_and_purges() {
    let store = Arc::new(MemoryStore::default());
    store.save(&sales_event("invoice.created")).await.unwrap();
    store.save(&sales_event("invoice.cancelled")).await.unwrap();

    let publisher = Arc::new(RecordingPublisher::default());
    let processor = OutboxProcessor::new(store.clone(), publisher.clone(), 10);

    assert_eq!(processor.process_batch().await.unwrap(), 2);
    assert_eq!(
        *publisher.published.lock().await,
        vec!["invoice.created".to_string(), "invoice.cancelled".to_string()]
    );
    assert_eq!(processor.purge_delivered().await.unwrap(), 2);
}

#[tokio::test]
async fn test_run_stops_on_cancellation() {
    let store = Arc::new(MemoryStore::default());
    store.save(&sales_event("invoice.created")).await.unwrap();
    let publisher = Arc::new(RecordingPublisher::default());
    let processor = Arc::new(OutboxProcessor::new(store.clone(), publisher.clone(), 10));

    let token = CancellationToken::new();
    let handle = {
        let processor = processor.clone();
        let token = token.clone();
        tokio::spawn(async move { processor.run(Duration::from_millis(10), token).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    token.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(publisher.published.lock().await.len(), 1);
}
