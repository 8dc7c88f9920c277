use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use yeelo_telemetry::metrics::Metrics;

use super::inventory_postgres::{insert_movement, BatchRow, BATCH_COLUMNS};
use super::ledger_postgres::insert_entry_and_event;
use super::{observe_query, GRN_REFERENCE};
use crate::domain::entity::goods_receipt::{GoodsReceipt, GrnItem, GrnStatus};
use crate::domain::entity::inventory_batch::{weighted_average_cost, InventoryBatch};
use crate::domain::entity::party::SupplierSnapshot;
use crate::domain::entity::stock_movement::{MovementType, StockMovement};
use crate::domain::repository::offset;
use crate::domain::repository::purchase_repository::{GrnApproval, GrnFilter, PurchaseRepository};

const GRN_COLUMNS: &str = "id, grn_number, supplier_id, supplier_name, supplier_gstin, \
     supplier_invoice_no, supplier_invoice_date, received_date, supply_type, status, qc_status, \
     taxable_amount, cgst_amount, sgst_amount, igst_amount, total_amount, notes, rejection_reason, \
     created_by, approved_by, approved_at, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, grn_id, product_id, product_name, batch_no, expiry_date, mfg_date, \
     ordered_quantity, received_quantity, damaged_quantity, accepted_quantity, unit_cost, mrp, \
     selling_price, gst_rate, taxable_amount, cgst_amount, sgst_amount, igst_amount, total_amount";

/// PurchasePostgresRepository は入荷伝票（GRN）の PostgreSQL 実装。
pub struct PurchasePostgresRepository {
    pool: PgPool,
    metrics: Option<Arc<Metrics>>,
}

impl PurchasePostgresRepository {
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

    async fn load_items(&self, grn_ids: &[Uuid]) -> anyhow::Result<HashMap<Uuid, Vec<GrnItem>>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM purchases.grn_items \
             WHERE grn_id = ANY($1) ORDER BY grn_id, line_no"
        );
        let rows = sqlx::query_as::<_, GrnItemRow>(&sql)
            .bind(grn_ids)
            .fetch_all(&self.pool)
            .await?;
        let mut items: HashMap<Uuid, Vec<GrnItem>> = HashMap::new();
        for row in rows {
            items.entry(row.grn_id).or_default().push(row.into());
        }
        Ok(items)
    }

    async fn with_items(&self, rows: Vec<GrnRow>) -> anyhow::Result<Vec<GoodsReceipt>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut items = self.load_items(&ids).await?;
        rows.into_iter()
            .map(|row| {
                let grn_items = items.remove(&row.id).unwrap_or_default();
                row.into_grn(grn_items)
            })
            .collect()
    }
}

/// 明細 1 行分を (製品, ロット番号) のロットに入庫する。既存ロットは加重平均で単価を更新する。
async fn receive_into_batch(
    conn: &mut PgConnection,
    grn_id: Uuid,
    item: &GrnItem,
) -> anyhow::Result<InventoryBatch> {
    let sql = format!(
        "SELECT {BATCH_COLUMNS} FROM inventory.batches \
         WHERE product_id = $1 AND batch_no = $2 FOR UPDATE"
    );
    let existing = sqlx::query_as::<_, BatchRow>(&sql)
        .bind(item.product_id)
        .bind(&item.batch_no)
        .fetch_optional(&mut *conn)
        .await?
        .map(InventoryBatch::from);

    let row = match existing {
        Some(batch) => {
            let unit_cost = weighted_average_cost(
                batch.available_quantity,
                batch.unit_cost,
                item.accepted_quantity,
                item.unit_cost,
            )
            .ok_or_else(|| anyhow::anyhow!("batch {} cost is out of range", batch.batch_no))?;
            let sql = format!(
                "UPDATE inventory.batches \
                 SET available_quantity = available_quantity + $2, unit_cost = $3, \
                     mrp = COALESCE($4, mrp), selling_price = COALESCE($5, selling_price), \
                     expiry_date = COALESCE(expiry_date, $6), mfg_date = COALESCE(mfg_date, $7), \
                     updated_at = NOW() \
                 WHERE id = $1 RETURNING {BATCH_COLUMNS}"
            );
            sqlx::query_as::<_, BatchRow>(&sql)
                .bind(batch.id)
                .bind(item.accepted_quantity)
                .bind(unit_cost)
                .bind(item.mrp)
                .bind(item.selling_price)
                .bind(item.expiry_date)
                .bind(item.mfg_date)
                .fetch_one(&mut *conn)
                .await?
        }
        None => {
            let sql = format!(
                "INSERT INTO inventory.batches \
                    (id, product_id, batch_no, expiry_date, mfg_date, available_quantity, \
                     unit_cost, mrp, selling_price, grn_id) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
                 RETURNING {BATCH_COLUMNS}"
            );
            sqlx::query_as::<_, BatchRow>(&sql)
                .bind(Uuid::new_v4())
                .bind(item.product_id)
                .bind(&item.batch_no)
                .bind(item.expiry_date)
                .bind(item.mfg_date)
                .bind(item.accepted_quantity)
                .bind(item.unit_cost)
                .bind(item.mrp)
                .bind(item.selling_price)
                .bind(grn_id)
                .fetch_one(&mut *conn)
                .await?
        }
    };
    Ok(row.into())
}

#[async_trait]
impl PurchaseRepository for PurchasePostgresRepository {
    async fn find_supplier(&self, id: Uuid) -> anyhow::Result<Option<SupplierSnapshot>> {
        let row = sqlx::query_as::<_, (Uuid, String, Option<String>, Option<String>, bool)>(
            "SELECT id, name, gstin, state_code, is_active FROM masters.suppliers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id, name, gstin, state_code, is_active)| SupplierSnapshot {
            id,
            name,
            gstin,
            state_code,
            is_active,
        }))
    }

    async fn create_grn(&self, grn: &GoodsReceipt) -> anyhow::Result<()> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!(
            "INSERT INTO purchases.grns ({GRN_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, \
              $19, $20, $21, $22, $23)"
        ))
        .bind(grn.id)
        .bind(&grn.grn_number)
        .bind(grn.supplier_id)
        .bind(&grn.supplier_name)
        .bind(&grn.supplier_gstin)
        .bind(&grn.supplier_invoice_no)
        .bind(grn.supplier_invoice_date)
        .bind(grn.received_date)
        .bind(grn.supply_type.as_str())
        .bind(grn.status.as_str())
        .bind(grn.qc_status.as_str())
        .bind(grn.taxable_amount)
        .bind(grn.cgst_amount)
        .bind(grn.sgst_amount)
        .bind(grn.igst_amount)
        .bind(grn.total_amount)
        .bind(&grn.notes)
        .bind(&grn.rejection_reason)
        .bind(&grn.created_by)
        .bind(&grn.approved_by)
        .bind(grn.approved_at)
        .bind(grn.created_at)
        .bind(grn.updated_at)
        .execute(&mut *tx)
        .await?;

        for (line_no, item) in grn.items.iter().enumerate() {
            sqlx::query(&format!(
                "INSERT INTO purchases.grn_items ({ITEM_COLUMNS}, line_no) VALUES \
                 ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, \
                  $19, $20, $21)"
            ))
            .bind(item.id)
            .bind(grn.id)
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(&item.batch_no)
            .bind(item.expiry_date)
            .bind(item.mfg_date)
            .bind(item.ordered_quantity)
            .bind(item.received_quantity)
            .bind(item.damaged_quantity)
            .bind(item.accepted_quantity)
            .bind(item.unit_cost)
            .bind(item.mrp)
            .bind(item.selling_price)
            .bind(item.gst_rate)
            .bind(item.taxable_amount)
            .bind(item.cgst_amount)
            .bind(item.sgst_amount)
            .bind(item.igst_amount)
            .bind(item.total_amount)
            .bind(i32::try_from(line_no)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        observe_query(self.metrics.as_ref(), "create_grn", "purchases.grns", start);
        Ok(())
    }

    async fn find_grn(&self, id: Uuid) -> anyhow::Result<Option<GoodsReceipt>> {
        let sql = format!("SELECT {GRN_COLUMNS} FROM purchases.grns WHERE id = $1");
        let Some(row) = sqlx::query_as::<_, GrnRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };
        Ok(self.with_items(vec![row]).await?.pop())
    }

    async fn list_grns(&self, filter: &GrnFilter) -> anyhow::Result<(Vec<GoodsReceipt>, i64)> {
        const WHERE: &str = "WHERE ($1::text IS NULL OR status = $1) \
                             AND ($2::uuid IS NULL OR supplier_id = $2)";
        let start = Instant::now();
        let status = filter.status.map(|s| s.as_str());

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM purchases.grns {WHERE}"))
            .bind(status)
            .bind(filter.supplier_id)
            .fetch_one(&self.pool)
            .await?;

        let sql = format!(
            "SELECT {GRN_COLUMNS} FROM purchases.grns {WHERE} \
             ORDER BY received_date DESC, created_at DESC LIMIT $3 OFFSET $4"
        );
        let rows = sqlx::query_as::<_, GrnRow>(&sql)
            .bind(status)
            .bind(filter.supplier_id)
            .bind(i64::from(filter.page_size))
            .bind(offset(filter.page, filter.page_size))
            .fetch_all(&self.pool)
            .await?;

        let grns = self.with_items(rows).await?;
        observe_query(self.metrics.as_ref(), "list_grns", "purchases.grns", start);
        Ok((grns, total))
    }

    async fn approve_grn(&self, approval: &GrnApproval) -> anyhow::Result<bool> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE purchases.grns
            SET status = 'APPROVED', qc_status = $2, approved_by = $3, approved_at = $4,
                updated_at = $4
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(approval.grn_id)
        .bind(approval.qc_status.as_str())
        .bind(&approval.approved_by)
        .bind(approval.approved_at)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Ok(false);
        }

        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM purchases.grn_items WHERE grn_id = $1 ORDER BY line_no"
        );
        let items: Vec<GrnItem> = sqlx::query_as::<_, GrnItemRow>(&sql)
            .bind(approval.grn_id)
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .map(Into::into)
            .collect();

        for item in items.iter().filter(|i| i.accepted_quantity > 0) {
            let batch = receive_into_batch(&mut tx, approval.grn_id, item).await?;
            let movement = StockMovement::new(
                batch.id,
                item.product_id,
                MovementType::PurchaseIn,
                item.accepted_quantity,
                GRN_REFERENCE,
                Some(approval.grn_id),
                None,
                &approval.approved_by,
            );
            insert_movement(&mut tx, &movement).await?;
        }

        insert_entry_and_event(&mut tx, approval.journal.as_ref(), &approval.event).await?;
        tx.commit().await?;
        observe_query(self.metrics.as_ref(), "approve_grn", "purchases.grns", start);
        Ok(true)
    }

    async fn reject_grn(&self, id: Uuid, reason: &str, actor: &str) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE purchases.grns
            SET status = 'REJECTED', rejection_reason = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(id)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        tracing::debug!(grn_id = %id, actor = %actor, rows = result.rows_affected(), "grn rejection applied");
        Ok(result.rows_affected() == 1)
    }

    async fn approved_grns_for_period(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> anyhow::Result<Vec<GoodsReceipt>> {
        let sql = format!(
            "SELECT {GRN_COLUMNS} FROM purchases.grns \
             WHERE status = 'APPROVED' AND received_date BETWEEN $1 AND $2 \
             ORDER BY received_date, created_at"
        );
        let rows = sqlx::query_as::<_, GrnRow>(&sql)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;
        self.with_items(rows).await
    }
}

#[derive(sqlx::FromRow)]
struct GrnRow {
    id: Uuid,
    grn_number: String,
    supplier_id: Uuid,
    supplier_name: String,
    supplier_gstin: Option<String>,
    supplier_invoice_no: Option<String>,
    supplier_invoice_date: Option<NaiveDate>,
    received_date: NaiveDate,
    supply_type: String,
    status: String,
    qc_status: String,
    taxable_amount: Decimal,
    cgst_amount: Decimal,
    sgst_amount: Decimal,
    igst_amount: Decimal,
    total_amount: Decimal,
    notes: Option<String>,
    rejection_reason: Option<String>,
    created_by: String,
    approved_by: Option<String>,
    approved_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl GrnRow {
    fn into_grn(self, items: Vec<GrnItem>) -> anyhow::Result<GoodsReceipt> {
        Ok(GoodsReceipt {
            id: self.id,
            grn_number: self.grn_number,
            supplier_id: self.supplier_id,
            supplier_name: self.supplier_name,
            supplier_gstin: self.supplier_gstin,
            supplier_invoice_no: self.supplier_invoice_no,
            supplier_invoice_date: self.supplier_invoice_date,
            received_date: self.received_date,
            supply_type: self.supply_type.parse().map_err(anyhow::Error::msg)?,
            status: self.status.parse::<GrnStatus>().map_err(anyhow::Error::msg)?,
            qc_status: self.qc_status.parse().map_err(anyhow::Error::msg)?,
            items,
            taxable_amount: self.taxable_amount,
            cgst_amount: self.cgst_amount,
            sgst_amount: self.sgst_amount,
            igst_amount: self.igst_amount,
            total_amount: self.total_amount,
            notes: self.notes,
            rejection_reason: self.rejection_reason,
            created_by: self.created_by,
            approved_by: self.approved_by,
            approved_at: self.approved_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct GrnItemRow {
    id: Uuid,
    grn_id: Uuid,
    product_id: Uuid,
    product_name: String,
    batch_no: String,
    expiry_date: Option<NaiveDate>,
    mfg_date: Option<NaiveDate>,
    ordered_quantity: Option<i32>,
    received_quantity: i32,
    damaged_quantity: i32,
    accepted_quantity: i32,
    unit_cost: Decimal,
    mrp: Option<Decimal>,
    selling_price: Option<Decimal>,
    gst_rate: Decimal,
    taxable_amount: Decimal,
    cgst_amount: Decimal,
    sgst_amount: Decimal,
    igst_amount: Decimal,
    total_amount: Decimal,
}

impl From<GrnItemRow> for GrnItem {
    fn from(row: GrnItemRow) -> Self {
        GrnItem {
            id: row.id,
            product_id: row.product_id,
            product_name: row.product_name,
            batch_no: row.batch_no,
            expiry_date: row.expiry_date,
            mfg_date: row.mfg_date,
            ordered_quantity: row.ordered_quantity,
            received_quantity: row.received_quantity,
            damaged_quantity: row.damaged_quantity,
            accepted_quantity: row.accepted_quantity,
            unit_cost: row.unit_cost,
            mrp: row.mrp,
            selling_price: row.selling_price,
            gst_rate: row.gst_rate,
            taxable_amount: row.taxable_amount,
            cgst_amount: row.cgst_amount,
            sgst_amount: row.sgst_amount,
            igst_amount: row.igst_amount,
            total_amount: row.total_amount,
        }
    }
}
