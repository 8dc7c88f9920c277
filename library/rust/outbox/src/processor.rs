use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::OutboxError;
use crate::message::OutboxMessage;
use crate::store::OutboxStore;

/// OutboxPublisher はアウトボックスメッセージの発行インターフェース。
#[async_trait::async_trait]
pub trait OutboxPublisher: Send + Sync {
    async fn publish(&self, message: &OutboxMessage) -> Result<(), OutboxError>;
}

/// 配信済みメッセージの掃除間隔。
const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

/// OutboxProcessor はアウトボックスメッセージの定期配信を担う。
/// claim_pending → publish → update のサイクルを実行する。
pub struct OutboxProcessor {
    store: Arc<dyn OutboxStore>,
    publisher: Arc<dyn OutboxPublisher>,
    /// 1回のポーリングで処理するメッセージ数
    batch_size: u32,
    /// 配信中メッセージのリース期間
    lease: Duration,
    /// 配信済みメッセージの保持日数
    retention_days: u32,
}

impl OutboxProcessor {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        publisher: Arc<dyn OutboxPublisher>,
        batch_size: u32,
    ) -> Self {
        Self {
            store,
            publisher,
            batch_size,
            lease: Duration::from_secs(60),
            retention_days: 7,
        }
    }

    #[must_use]
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    #[must_use]
    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    /// 1回分のアウトボックス処理を実行する。配信に成功したメッセージ数を返す。
    pub async fn process_batch(&self) -> Result<u32, OutboxError> {
        let messages = self.store.claim_pending(self.batch_size, self.lease).await?;
        let mut delivered = 0u32;

        for mut message in messages {
            match self.publisher.publish(&message).await {
                Ok(()) => {
                    message.mark_delivered();
                    self.store.update(&message).await?;
                    delivered += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        message_id = %message.id,
                        topic = %message.topic,
                        retry_count = message.retry_count,
                        error = %e,
                        "outbox publish failed"
                    );
                    message.mark_failed(e.to_string());
                    self.store.update(&message).await?;
                }
            }
        }

        Ok(delivered)
    }

    /// 保持期間を超えた配信済みメッセージを削除する。
    pub async fn purge_delivered(&self) -> Result<u64, OutboxError> {
        self.store.delete_delivered(self.retention_days).await
    }

    /// run は shutdown がキャンセルされるまで interval ごとに process_batch を実行する。
    pub async fn run(&self, interval: Duration, shutdown: CancellationToken) {
        let mut poll = tokio::time::interval(interval);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut purge = tokio::time::interval(PURGE_INTERVAL);
        purge.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(
            interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            batch_size = self.batch_size,
            "outbox relay started"
        );

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = poll.tick() => {
                    match self.process_batch().await {
                        Ok(0) => {}
                        Ok(n) => tracing::debug!(delivered = n, "outbox batch delivered"),
                        Err(e) => tracing::error!(error = %e, "outbox batch failed"),
                    }
                }
                _ = purge.tick() => {
                    match self.purge_delivered().await {
                        Ok(0) => {}
                        Ok(n) => tracing::info!(purged = n, "purged delivered outbox messages"),
                        Err(e) => tracing::error!(error = %e, "outbox purge failed"),
                    }
                }
            }
        }

        tracing::info!("outbox relay stopped");
    }
}
