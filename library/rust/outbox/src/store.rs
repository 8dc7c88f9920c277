use std::time::Duration;

use async_trait::async_trait;

use crate::error::OutboxError;
use crate::message::OutboxMessage;

/// OutboxStore はアウトボックスメッセージの永続化インターフェース。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// メッセージをアウトボックステーブルに保存する。
    async fn save(&self, message: &OutboxMessage) -> Result<(), OutboxError>;

    /// 処理可能なメッセージを最大 limit 件取得し、lease の間 PROCESSING として確保する。
    /// 他のリレーが確保中の行は返さない。リース期限切れの行は再取得する。
    async fn claim_pending(
        &self,
        limit: u32,
        lease: Duration,
    ) -> Result<Vec<OutboxMessage>, OutboxError>;

    /// メッセージのステータスを更新する。
    async fn update(&self, message: &OutboxMessage) -> Result<(), OutboxError>;

    /// 保持期間を超えた配信完了メッセージを削除する。
    async fn delete_delivered(&self, older_than_days: u32) -> Result<u64, OutboxError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::OutboxStatus;

    #[tokio::test]
    async fn test_mock_claim_pending() {
        let mut mock = MockOutboxStore::new();
        let mut msg = OutboxMessage::new("yeelo.sales", "invoice.created", "k", serde_json::json!({}));
        msg.mark_processing(chrono::Duration::seconds(30));
        let expected = vec![msg];

        mock.expect_claim_pending()
            .withf(|&limit, lease| limit == 10 && lease.as_secs() == 30)
            .returning(move |_, _| Ok(expected.clone()));

        let messages = mock.claim_pending(10, Duration::from_secs(30)).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].status, OutboxStatus::Processing);
    }

    #[tokio::test]
    async fn test_mock_delete_delivered() {
        let mut mock = MockOutboxStore::new();
        mock.expect_delete_delivered()
            .withf(|&days| days == 7)
            .returning(|_| Ok(5));

        assert_eq!(mock.delete_delivered(7).await.unwrap(), 5);
    }
}
