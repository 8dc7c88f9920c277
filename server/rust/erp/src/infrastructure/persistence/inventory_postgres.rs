use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use yeelo_telemetry::metrics::Metrics;

use super::ledger_postgres::insert_entry_and_event;
use super::{contains_pattern, observe_query};
use crate::domain::entity::inventory_batch::InventoryBatch;
use crate::domain::entity::party::ProductSnapshot;
use crate::domain::entity::stock_movement::StockMovement;
use crate::domain::repository::inventory_repository::{
    AdjustmentOutcome, InventoryRepository, MovementFilter, StockAdjustment,
};

const PRODUCT_COLUMNS: &str = "id, sku, name, hsn_code, gst_rate, selling_price, mrp, \
     COALESCE(min_stock_level, 0) AS min_stock_level, \
     COALESCE(reorder_level, 0) AS reorder_level, is_active";

pub(crate) const BATCH_COLUMNS: &str = "id, product_id, batch_no, expiry_date, mfg_date, \
     available_quantity, unit_cost, mrp, selling_price, location, grn_id, created_at, updated_at";

const MOVEMENT_COLUMNS: &str = "id, batch_id, product_id, movement_type, quantity, reference_type, \
     reference_id, reason, created_by, created_at";

/// InventoryPostgresRepository はロット在庫と在庫移動の PostgreSQL 実装。
pub struct InventoryPostgresRepository {
    pool: PgPool,
    metrics: Option<Arc<Metrics>>,
}

impl InventoryPostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            metrics: None,
        }
    }

    pub fn with_metrics(pool: PgPool, metrics: Arc<Metrics>) -> Self {
        Self {
            pool,
            metrics: Some(metrics),
        }
    }
}

/// 在庫移動を 1 件書き込む。
pub(crate) async fn insert_movement(
    conn: &mut PgConnection,
    movement: &StockMovement,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO inventory.movements
            (id, batch_id, product_id, movement_type, quantity, reference_type,
             reference_id, reason, created_by, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(movement.id)
    .bind(movement.batch_id)
    .bind(movement.product_id)
    .bind(movement.movement_type.as_str())
    .bind(movement.quantity)
    .bind(&movement.reference_type)
    .bind(movement.reference_id)
    .bind(&movement.reason)
    .bind(&movement.created_by)
    .bind(movement.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// 在庫数量を `delta` だけ増減する。結果が負になる場合は更新せず false を返す。
pub(crate) async fn shift_quantity(
    conn: &mut PgConnection,
    batch_id: Uuid,
    delta: i32,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE inventory.batches
        SET available_quantity = available_quantity + $2, updated_at = NOW()
        WHERE id = $1 AND available_quantity + $2 >= 0
        "#,
    )
    .bind(batch_id)
    .bind(delta)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

#[async_trait]
impl InventoryRepository for InventoryPostgresRepository {
    async fn find_product(&self, id: Uuid) -> anyhow::Result<Option<ProductSnapshot>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM masters.products WHERE id = $1");
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn find_products(&self, ids: Vec<Uuid>) -> anyhow::Result<Vec<ProductSnapshot>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM masters.products WHERE id = ANY($1)");
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_products(&self, search: Option<String>) -> anyhow::Result<Vec<ProductSnapshot>> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM masters.products \
             WHERE is_active AND ($1::text IS NULL OR name ILIKE $1 ESCAPE '\\' OR sku ILIKE $1 ESCAPE '\\') \
             ORDER BY name, id"
        );
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(search.as_deref().map(contains_pattern))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_batch(&self, id: Uuid) -> anyhow::Result<Option<InventoryBatch>> {
        let sql = format!("SELECT {BATCH_COLUMNS} FROM inventory.batches WHERE id = $1");
        let row = sqlx::query_as::<_, BatchRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn list_batches(&self, product_id: Option<Uuid>) -> anyhow::Result<Vec<InventoryBatch>> {
        let start = Instant::now();
        let sql = format!(
            "SELECT {BATCH_COLUMNS} FROM inventory.batches \
             WHERE ($1::uuid IS NULL OR product_id = $1) \
             ORDER BY product_id, expiry_date NULLS LAST, created_at"
        );
        let rows = sqlx::query_as::<_, BatchRow>(&sql)
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?;
        observe_query(self.metrics.as_ref(), "list_batches", "inventory.batches", start);
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn apply_adjustment(
        &self,
        adjustment: &StockAdjustment,
    ) -> anyhow::Result<AdjustmentOutcome> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await?;

        // 読み取り時点の在庫数と一致する場合のみ更新する
        let sql = format!(
            "UPDATE inventory.batches \
             SET available_quantity = available_quantity + $3, updated_at = NOW() \
             WHERE id = $1 AND available_quantity = $2 \
             RETURNING {BATCH_COLUMNS}"
        );
        let Some(row) = sqlx::query_as::<_, BatchRow>(&sql)
            .bind(adjustment.batch_id)
            .bind(adjustment.expected_quantity)
            .bind(adjustment.quantity_delta)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(AdjustmentOutcome::StockChanged);
        };

        insert_movement(&mut tx, &adjustment.movement).await?;
        insert_entry_and_event(&mut tx, adjustment.journal.as_ref(), &adjustment.event).await?;
        tx.commit().await?;

        observe_query(self.metrics.as_ref(), "apply_adjustment", "inventory.batches", start);
        Ok(AdjustmentOutcome::Applied(row.into()))
    }

    async fn list_movements(&self, filter: &MovementFilter) -> anyhow::Result<Vec<StockMovement>> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM inventory.movements \
             WHERE ($1::uuid IS NULL OR batch_id = $1) \
               AND ($2::uuid IS NULL OR product_id = $2) \
             ORDER BY created_at DESC, id \
             LIMIT $3"
        );
        let rows = sqlx::query_as::<_, MovementRow>(&sql)
            .bind(filter.batch_id)
            .bind(filter.product_id)
            .bind(i64::from(filter.limit))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    sku: String,
    name: String,
    hsn_code: Option<String>,
    gst_rate: Decimal,
    selling_price: Decimal,
    mrp: Option<Decimal>,
    min_stock_level: i32,
    reorder_level: i32,
    is_active: bool,
}

impl From<ProductRow> for ProductSnapshot {
    fn from(row: ProductRow) -> Self {
        ProductSnapshot {
            id: row.id,
            sku: row.sku,
            name: row.name,
            hsn_code: row.hsn_code,
            gst_rate: row.gst_rate,
            selling_price: row.selling_price,
            mrp: row.mrp,
            min_stock_level: row.min_stock_level,
            reorder_level: row.reorder_level,
            is_active: row.is_active,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct BatchRow {
    id: Uuid,
    product_id: Uuid,
    batch_no: String,
    expiry_date: Option<NaiveDate>,
    mfg_date: Option<NaiveDate>,
    available_quantity: i32,
    unit_cost: Decimal,
    mrp: Option<Decimal>,
    selling_price: Option<Decimal>,
    location: Option<String>,
    grn_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<BatchRow> for InventoryBatch {
    fn from(row: BatchRow) -> Self {
        InventoryBatch {
            id: row.id,
            product_id: row.product_id,
            batch_no: row.batch_no,
            expiry_date: row.expiry_date,
            mfg_date: row.mfg_date,
            available_quantity: row.available_quantity,
            unit_cost: row.unit_cost,
            mrp: row.mrp,
            selling_price: row.selling_price,
            location: row.location,
            grn_id: row.grn_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MovementRow {
    id: Uuid,
    batch_id: Uuid,
    product_id: Uuid,
    movement_type: String,
    quantity: i32,
    reference_type: String,
    reference_id: Option<Uuid>,
    reason: Option<String>,
    created_by: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MovementRow> for StockMovement {
    type Error = anyhow::Error;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        Ok(StockMovement {
            id: row.id,
            batch_id: row.batch_id,
            product_id: row.product_id,
            movement_type: row.movement_type.parse().map_err(anyhow::Error::msg)?,
            quantity: row.quantity,
            reference_type: row.reference_type,
            reference_id: row.reference_id,
            reason: row.reason,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}
