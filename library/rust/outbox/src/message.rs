use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::OutboxError;

/// リトライ間隔の上限（秒）。
pub const MAX_BACKOFF_SECS: i64 = 300;

/// デフォルトの最大リトライ回数。
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// OutboxStatus はアウトボックスメッセージの処理ステータスを表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    /// 未処理（初期状態）
    Pending,
    /// 配信中（リース取得済み）
    Processing,
    Delivered,
    /// 発行失敗（リトライ対象）
    Failed,
    /// 最大リトライ回数超過
    DeadLetter,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "PENDING",
            OutboxStatus::Processing => "PROCESSING",
            OutboxStatus::Delivered => "DELIVERED",
            OutboxStatus::Failed => "FAILED",
            OutboxStatus::DeadLetter => "DEAD_LETTER",
        }
    }
}

impl FromStr for OutboxStatus {
    type Err = OutboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OutboxStatus::Pending),
            "PROCESSING" => Ok(OutboxStatus::Processing),
            "DELIVERED" => Ok(OutboxStatus::Delivered),
            "FAILED" => Ok(OutboxStatus::Failed),
            "DEAD_LETTER" => Ok(OutboxStatus::DeadLetter),
            other => Err(OutboxError::InvalidStatus(other.to_string())),
        }
    }
}

/// OutboxMessage はアウトボックステーブルに格納するメッセージを表す。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub id: Uuid,
    /// 発行先トピック
    pub topic: String,
    /// イベント種別（invoice.created など）
    pub event_type: String,
    pub partition_key: String,
    /// メッセージペイロード（JSON）
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    /// 次回処理可能日時。PROCESSING 中はリースの期限を表す。
    pub process_after: DateTime<Utc>,
}

impl OutboxMessage {
    pub fn new(
        topic: impl Into<String>,
        event_type: impl Into<String>,
        partition_key: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            event_type: event_type.into(),
            partition_key: partition_key.into(),
            payload,
            status: OutboxStatus::Pending,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            last_error: None,
            created_at: now,
            process_after: now,
        }
    }

    /// mark_processing はメッセージを配信中に遷移し、リース期限を設定する。
    pub fn mark_processing(&mut self, lease: chrono::Duration) {
        self.status = OutboxStatus::Processing;
        self.process_after = Utc::now() + lease;
    }

    pub fn mark_delivered(&mut self) {
        self.status = OutboxStatus::Delivered;
        self.last_error = None;
    }

    /// mark_failed は失敗状態に遷移し、リトライ回数をインクリメントする。
    /// 再処理は 2^retry_count 秒後（上限 MAX_BACKOFF_SECS）。
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.retry_count += 1;
        self.last_error = Some(error.into());
        if self.retry_count >= self.max_retries {
            self.status = OutboxStatus::DeadLetter;
        } else {
            self.status = OutboxStatus::Failed;
            self.process_after = Utc::now() + chrono::Duration::seconds(backoff_secs(self.retry_count));
        }
    }

    /// is_processable はメッセージが取得対象かどうかを判定する。
    /// リース期限切れの PROCESSING も再取得の対象になる。
    pub fn is_processable(&self) -> bool {
        self.is_processable_at(Utc::now())
    }

    pub fn is_processable_at(&self, now: DateTime<Utc>) -> bool {
        matches!(
            self.status,
            OutboxStatus::Pending | OutboxStatus::Failed | OutboxStatus::Processing
        ) && self.process_after <= now
    }
}

fn backoff_secs(retry_count: u32) -> i64 {
    2_i64
        .checked_pow(retry_count)
        .map_or(MAX_BACKOFF_SECS, |d| d.min(MAX_BACKOFF_SECS))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> OutboxMessage {
        OutboxMessage::new(
            "yeelo.sales",
            "invoice.created",
            "inv-001",
            serde_json::json!({"invoice_id": "inv-001"}),
        )
    }

    #[test]
    fn test_new_message() {
        let msg = message();
        assert_eq!(msg.topic, "yeelo.sales");
        assert_eq!(msg.event_type, "invoice.created");
        assert_eq!(msg.status, OutboxStatus::Pending);
        assert_eq!(msg.max_retries, DEFAULT_MAX_RETRIES);
        assert!(msg.is_processable());
    }

    #[test]
    fn test_processing_lease_blocks_until_expiry() {
        let mut msg = message();
        msg.mark_processing(chrono::Duration::seconds(30));
        assert_eq!(msg.status, OutboxStatus::Processing);
        assert!(!msg.is_processable());
        assert!(msg.is_processable_at(Utc::now() + chrono::Duration::seconds(31)));
    }

    #[test]
    fn test_mark_delivered() {
        let mut msg = message();
        msg.mark_delivered();
        assert_eq!(msg.status, OutboxStatus::Delivered);
        assert!(!msg.is_processable());
    }

    #[test]
    fn test_mark_failed_backs_off() {
        let mut msg = message();
        msg.mark_failed("broker down");
        assert_eq!(msg.retry_count, 1);
        assert_eq!(msg.status, OutboxStatus::Failed);
        assert_eq!(msg.last_error.as_deref(), Some("broker down"));
        assert!(msg.process_after > Utc::now());
    }

    #[test]
    fn test_backoff_is_capped() {
        assert_eq!(backoff_secs(1), 2);
        assert_eq!(backoff_secs(8), 256);
        assert_eq!(backoff_secs(9), MAX_BACKOFF_SECS);
        assert_eq!(backoff_secs(200), MAX_BACKOFF_SECS);
    }

    #[test]
    fn test_dead_letter_on_max_retries() {
        let mut msg = message();
        msg.max_retries = 2;
        msg.mark_failed("e1");
        msg.mark_failed("e2");
        assert_eq!(msg.status, OutboxStatus::DeadLetter);
        assert!(!msg.is_processable_at(Utc::now() + chrono::Duration::days(1)));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("DEAD_LETTER".parse::<OutboxStatus>().unwrap(), OutboxStatus::DeadLetter);
        assert!("UNKNOWN".parse::<OutboxStatus>().is_err());
    }
}
