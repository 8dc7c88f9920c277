//! PostgresOutboxStore: sqlx を使用した OutboxStore 実装。
//! feature = "postgres" で有効化される。

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};

use crate::error::OutboxError;
use crate::message::OutboxMessage;
use crate::store::OutboxStore;

const COLUMNS: &str = "id, topic, event_type, partition_key, payload, status, retry_count, \
                       max_retries, last_error, created_at, process_after";

/// PostgresOutboxStore は PostgreSQL を使ったアウトボックスストア実装。
pub struct PostgresOutboxStore {
    pool: PgPool,
}

impl PostgresOutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// insert_in_tx は呼び出し側のトランザクション上でメッセージを保存する。
    /// 業務データの更新と同一トランザクションでコミットするために使う。
    pub async fn insert_in_tx(
        conn: &mut PgConnection,
        message: &OutboxMessage,
    ) -> Result<(), OutboxError> {
        insert(conn, message).await
    }
}

async fn insert<'e, E>(executor: E, message: &OutboxMessage) -> Result<(), OutboxError>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r"INSERT INTO outbox.outbox_messages
           (id, topic, event_type, partition_key, payload, status, retry_count, max_retries,
            last_error, created_at, process_after)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(message.id)
    .bind(&message.topic)
    .bind(&message.event_type)
    .bind(&message.partition_key)
    .bind(&message.payload)
    .bind(message.status.as_str())
    .bind(i32::try_from(message.retry_count).unwrap_or(i32::MAX))
    .bind(i32::try_from(message.max_retries).unwrap_or(i32::MAX))
    .bind(&message.last_error)
    .bind(message.created_at)
    .bind(message.process_after)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl OutboxStore for PostgresOutboxStore {
    async fn save(&self, message: &OutboxMessage) -> Result<(), OutboxError> {
        insert(&self.pool, message).await
    }

    async fn claim_pending(
        &self,
        limit: u32,
        lease: Duration,
    ) -> Result<Vec<OutboxMessage>, OutboxError> {
        let sql = format!(
            r"UPDATE outbox.outbox_messages
               SET status = 'PROCESSING',
                   process_after = NOW() + make_interval(secs => $2)
               WHERE id IN (
                   SELECT id FROM outbox.outbox_messages
                   WHERE status IN ('PENDING', 'FAILED', 'PROCESSING')
                   AND process_after <= NOW()
                   ORDER BY created_at ASC
                   LIMIT $1
                   FOR UPDATE SKIP LOCKED
               )
               RETURNING {COLUMNS}"
        );
        let mut rows = sqlx::query_as::<_, OutboxRow>(&sql)
            .bind(i64::from(limit))
            .bind(lease.as_secs_f64())
            .fetch_all(&self.pool)
            .await?;

        rows.sort_by_key(|r| r.created_at);
        rows.into_iter().map(OutboxMessage::try_from).collect()
    }

    async fn update(&self, message: &OutboxMessage) -> Result<(), OutboxError> {
        sqlx::query(
            r"UPDATE outbox.outbox_messages
               SET status = $1, retry_count = $2, last_error = $3, process_after = $4
               WHERE id = $5",
        )
        .bind(message.status.as_str())
        .bind(i32::try_from(message.retry_count).unwrap_or(i32::MAX))
        .bind(&message.last_error)
        .bind(message.process_after)
        .bind(message.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_delivered(&self, older_than_days: u32) -> Result<u64, OutboxError> {
        let result = sqlx::query(
            r"DELETE FROM outbox.outbox_messages
               WHERE status = 'DELIVERED'
               AND created_at < NOW() - make_interval(days => $1)",
        )
        .bind(i32::try_from(older_than_days).unwrap_or(i32::MAX))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

/// DB行と OutboxMessage の変換用中間構造体。
#[derive(sqlx::FromRow)]
struct OutboxRow {
    id: uuid::Uuid,
    topic: String,
    event_type: String,
    partition_key: String,
    payload: serde_json::Value,
    status: String,
    retry_count: i32,
    max_retries: i32,
    last_error: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    process_after: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<OutboxRow> for OutboxMessage {
    type Error = OutboxError;

    fn try_from(row: OutboxRow) -> Result<Self, Self::Error> {
        Ok(OutboxMessage {
            id: row.id,
            topic: row.topic,
            event_type: row.event_type,
            partition_key: row.partition_key,
            payload: row.payload,
            status: row.status.parse()?,
            retry_count: u32::try_from(row.retry_count).unwrap_or(0),
            max_retries: u32::try_from(row.max_retries).unwrap_or(0),
            last_error: row.last_error,
            created_at: row.created_at,
            process_after: row.process_after,
        })
    }
}
