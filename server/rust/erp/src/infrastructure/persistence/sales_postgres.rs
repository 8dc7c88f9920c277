use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use yeelo_outbox::PostgresOutboxStore;
use yeelo_telemetry::metrics::Metrics;

use super::inventory_postgres::{insert_movement, shift_quantity};
use super::ledger_postgres::{insert_entry, insert_entry_and_event};
use super::{contains_pattern, observe_query};
use crate::domain::entity::party::CustomerSnapshot;
use crate::domain::entity::sales_invoice::{InvoiceItem, SalesInvoice};
use crate::domain::repository::offset;
use crate::domain::repository::sales_repository::{
    InvoiceCancellation, InvoiceFilter, InvoicePosting, PostingOutcome, SalesRepository,
};

const INVOICE_COLUMNS: &str = "id, invoice_number, invoice_date, customer_id, customer_name, \
     customer_gstin, place_of_supply, supply_type, subtotal, discount_amount, taxable_amount, \
     cgst_amount, sgst_amount, igst_amount, total_tax, grand_total, amount_paid, balance_due, \
     change_due, payment_method, payment_status, status, cancellation_reason, notes, created_by, \
     created_at, updated_at";

const ITEM_COLUMNS: &str = "id, invoice_id, product_id, product_name, sku, hsn_code, batch_id, \
     batch_no, expiry_date, quantity, unit_price, unit_cost, discount_percent, discount_amount, \
     taxable_amount, gst_rate, cgst_amount, sgst_amount, igst_amount, line_total";

/// SalesPostgresRepository は販売伝票の PostgreSQL 実装。
pub struct SalesPostgresRepository {
    pool: PgPool,
    metrics: Option<Arc<Metrics>>,
}

impl SalesPostgresRepository {
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

    async fn with_items(&self, rows: Vec<InvoiceRow>) -> anyhow::Result<Vec<SalesInvoice>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM sales.invoice_items \
             WHERE invoice_id = ANY($1) ORDER BY invoice_id, line_no"
        );
        let item_rows = sqlx::query_as::<_, InvoiceItemRow>(&sql)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;
        let mut items: HashMap<Uuid, Vec<InvoiceItem>> = HashMap::new();
        for row in item_rows {
            items.entry(row.invoice_id).or_default().push(row.into());
        }

        rows.into_iter()
            .map(|row| {
                let invoice_items = items.remove(&row.id).unwrap_or_default();
                row.into_invoice(invoice_items)
            })
            .collect()
    }
}

async fn insert_invoice(conn: &mut PgConnection, invoice: &SalesInvoice) -> anyhow::Result<()> {
    sqlx::query(&format!(
        "INSERT INTO sales.invoices ({INVOICE_COLUMNS}) VALUES \
         ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, \
          $20, $21, $22, $23, $24, $25, $26, $27)"
    ))
    .bind(invoice.id)
    .bind(&invoice.invoice_number)
    .bind(invoice.invoice_date)
    .bind(invoice.customer_id)
    .bind(&invoice.customer_name)
    .bind(&invoice.customer_gstin)
    .bind(&invoice.place_of_supply)
    .bind(invoice.supply_type.as_str())
    .bind(invoice.subtotal)
    .bind(invoice.discount_amount)
    .bind(invoice.taxable_amount)
    .bind(invoice.cgst_amount)
    .bind(invoice.sgst_amount)
    .bind(invoice.igst_amount)
    .bind(invoice.total_tax)
    .bind(invoice.grand_total)
    .bind(invoice.amount_paid)
    .bind(invoice.balance_due)
    .bind(invoice.change_due)
    .bind(invoice.payment_method.as_str())
    .bind(invoice.payment_status.as_str())
    .bind(invoice.status.as_str())
    .bind(&invoice.cancellation_reason)
    .bind(&invoice.notes)
    .bind(&invoice.created_by)
    .bind(invoice.created_at)
    .bind(invoice.updated_at)
    .execute(&mut *conn)
    .await?;

    for (line_no, item) in invoice.items.iter().enumerate() {
        sqlx::query(&format!(
            "INSERT INTO sales.invoice_items ({ITEM_COLUMNS}, line_no) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, \
              $19, $20, $21)"
        ))
        .bind(item.id)
        .bind(invoice.id)
        .bind(item.product_id)
        .bind(&item.product_name)
        .bind(&item.sku)
        .bind(&item.hsn_code)
        .bind(item.batch_id)
        .bind(&item.batch_no)
        .bind(item.expiry_date)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.unit_cost)
        .bind(item.discount_percent)
        .bind(item.discount_amount)
        .bind(item.taxable_amount)
        .bind(item.gst_rate)
        .bind(item.cgst_amount)
        .bind(item.sgst_amount)
        .bind(item.igst_amount)
        .bind(item.line_total)
        .bind(i32::try_from(line_no)?)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl SalesRepository for SalesPostgresRepository {
    async fn find_customer(&self, id: Uuid) -> anyhow::Result<Option<CustomerSnapshot>> {
        let row = sqlx::query_as::<_, (Uuid, String, Option<String>, Option<String>, bool)>(
            "SELECT id, name, gstin, state_code, is_active FROM masters.customers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id, name, gstin, state_code, is_active)| CustomerSnapshot {
            id,
            name,
            gstin,
            state_code,
            is_active,
        }))
    }

    async fn create_invoice(&self, posting: &InvoicePosting) -> anyhow::Result<PostingOutcome> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await?;

        // 在庫を先に確保し、不足があれば伝票を書かずにロールバックする
        for movement in &posting.movements {
            if !shift_quantity(&mut tx, movement.batch_id, movement.quantity).await? {
                tx.rollback().await?;
                observe_query(self.metrics.as_ref(), "create_invoice", "sales.invoices", start);
                return Ok(PostingOutcome::StockChanged);
            }
        }

        insert_invoice(&mut tx, &posting.invoice).await?;
        for movement in &posting.movements {
            insert_movement(&mut tx, movement).await?;
        }
        if let Some(journal) = &posting.journal {
            insert_entry(&mut tx, journal).await?;
        }
        for event in &posting.events {
            PostgresOutboxStore::insert_in_tx(&mut tx, event).await?;
        }
        tx.commit().await?;

        observe_query(self.metrics.as_ref(), "create_invoice", "sales.invoices", start);
        Ok(PostingOutcome::Posted)
    }

    async fn find_invoice(&self, id: Uuid) -> anyhow::Result<Option<SalesInvoice>> {
        let sql = format!("SELECT {INVOICE_COLUMNS} FROM sales.invoices WHERE id = $1");
        let Some(row) = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };
        Ok(self.with_items(vec![row]).await?.pop())
    }

    async fn list_invoices(
        &self,
        filter: &InvoiceFilter,
    ) -> anyhow::Result<(Vec<SalesInvoice>, i64)> {
        const WHERE: &str = "WHERE ($1::date IS NULL OR invoice_date >= $1) \
                             AND ($2::date IS NULL OR invoice_date <= $2) \
                             AND ($3::text IS NULL OR status = $3) \
                             AND ($4::uuid IS NULL OR customer_id = $4) \
                             AND ($5::text IS NULL OR invoice_number ILIKE $5 ESCAPE '\\' OR customer_name ILIKE $5 ESCAPE '\\')";
        let start = Instant::now();
        let status = filter.status.map(|s| s.as_str());
        let search = filter.search.as_deref().map(contains_pattern);

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM sales.invoices {WHERE}"))
            .bind(filter.from)
            .bind(filter.to)
            .bind(status)
            .bind(filter.customer_id)
            .bind(&search)
            .fetch_one(&self.pool)
            .await?;

        let sql = format!(
            "SELECT {INVOICE_COLUMNS} FROM sales.invoices {WHERE} \
             ORDER BY invoice_date DESC, created_at DESC LIMIT $6 OFFSET $7"
        );
        let rows = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(filter.from)
            .bind(filter.to)
            .bind(status)
            .bind(filter.customer_id)
            .bind(&search)
            .bind(i64::from(filter.page_size))
            .bind(offset(filter.page, filter.page_size))
            .fetch_all(&self.pool)
            .await?;

        let invoices = self.with_items(rows).await?;
        observe_query(self.metrics.as_ref(), "list_invoices", "sales.invoices", start);
        Ok((invoices, total))
    }

    async fn cancel_invoice(&self, cancellation: &InvoiceCancellation) -> anyhow::Result<bool> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE sales.invoices
            SET status = 'CANCELLED', cancellation_reason = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'COMPLETED'
            "#,
        )
        .bind(cancellation.invoice_id)
        .bind(&cancellation.reason)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Ok(false);
        }

        for movement in &cancellation.movements {
            if !shift_quantity(&mut tx, movement.batch_id, movement.quantity).await? {
                anyhow::bail!("batch {} could not be restocked", movement.batch_id);
            }
            insert_movement(&mut tx, movement).await?;
        }
        insert_entry_and_event(&mut tx, cancellation.journal.as_ref(), &cancellation.event).await?;
        tx.commit().await?;

        observe_query(self.metrics.as_ref(), "cancel_invoice", "sales.invoices", start);
        tracing::debug!(
            invoice_id = %cancellation.invoice_id,
            cancelled_by = %cancellation.cancelled_by,
            "invoice cancellation persisted"
        );
        Ok(true)
    }

    async fn invoices_for_period(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> anyhow::Result<Vec<SalesInvoice>> {
        let sql = format!(
            "SELECT {INVOICE_COLUMNS} FROM sales.invoices \
             WHERE invoice_date BETWEEN $1 AND $2 \
             ORDER BY invoice_date, created_at"
        );
        let rows = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;
        self.with_items(rows).await
    }
}

#[derive(sqlx::FromRow)]
struct InvoiceRow {
    id: Uuid,
    invoice_number: String,
    invoice_date: NaiveDate,
    customer_id: Option<Uuid>,
    customer_name: String,
    customer_gstin: Option<String>,
    place_of_supply: Option<String>,
    supply_type: String,
    subtotal: Decimal,
    discount_amount: Decimal,
    taxable_amount: Decimal,
    cgst_amount: Decimal,
    sgst_amount: Decimal,
    igst_amount: Decimal,
    total_tax: Decimal,
    grand_total: Decimal,
    amount_paid: Decimal,
    balance_due: Decimal,
    change_due: Decimal,
    payment_method: String,
    payment_status: String,
    status: String,
    cancellation_reason: Option<String>,
    notes: Option<String>,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl InvoiceRow {
    fn into_invoice(self, items: Vec<InvoiceItem>) -> anyhow::Result<SalesInvoice> {
        Ok(SalesInvoice {
            id: self.id,
            invoice_number: self.invoice_number,
            invoice_date: self.invoice_date,
            customer_id: self.customer_id,
            customer_name: self.customer_name,
            customer_gstin: self.customer_gstin,
            place_of_supply: self.place_of_supply,
            supply_type: self.supply_type.parse().map_err(anyhow::Error::msg)?,
            items,
            subtotal: self.subtotal,
            discount_amount: self.discount_amount,
            taxable_amount: self.taxable_amount,
            cgst_amount: self.cgst_amount,
            sgst_amount: self.sgst_amount,
            igst_amount: self.igst_amount,
            total_tax: self.total_tax,
            grand_total: self.grand_total,
            amount_paid: self.amount_paid,
            balance_due: self.balance_due,
            change_due: self.change_due,
            payment_method: self.payment_method.parse().map_err(anyhow::Error::msg)?,
            payment_status: self.payment_status.parse().map_err(anyhow::Error::msg)?,
            status: self.status.parse().map_err(anyhow::Error::msg)?,
            cancellation_reason: self.cancellation_reason,
            notes: self.notes,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct InvoiceItemRow {
    id: Uuid,
    invoice_id: Uuid,
    product_id: Uuid,
    product_name: String,
    sku: String,
    hsn_code: Option<String>,
    batch_id: Uuid,
    batch_no: String,
    expiry_date: Option<NaiveDate>,
    quantity: i32,
    unit_price: Decimal,
    unit_cost: Decimal,
    discount_percent: Decimal,
    discount_amount: Decimal,
    taxable_amount: Decimal,
    gst_rate: Decimal,
    cgst_amount: Decimal,
    sgst_amount: Decimal,
    igst_amount: Decimal,
    line_total: Decimal,
}

impl From<InvoiceItemRow> for InvoiceItem {
    fn from(row: InvoiceItemRow) -> Self {
        InvoiceItem {
            id: row.id,
            product_id: row.product_id,
            product_name: row.product_name,
            sku: row.sku,
            hsn_code: row.hsn_code,
            batch_id: row.batch_id,
            batch_no: row.batch_no,
            expiry_date: row.expiry_date,
            quantity: row.quantity,
            unit_price: row.unit_price,
            unit_cost: row.unit_cost,
            discount_percent: row.discount_percent,
            discount_amount: row.discount_amount,
            taxable_amount: row.taxable_amount,
            gst_rate: row.gst_rate,
            cgst_amount: row.cgst_amount,
            sgst_amount: row.sgst_amount,
            igst_amount: row.igst_amount,
            line_total: row.line_total,
        }
    }
}
