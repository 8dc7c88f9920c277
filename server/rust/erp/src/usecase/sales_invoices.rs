//! POS 販売の登録・取消・照会。
//!
//! 販売は FEFO でロットを引き当て、在庫減算・売上仕訳・イベントを 1 トランザクションで書き込む。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::domain::entity::inventory_batch::InventoryBatch;
use crate::domain::entity::party::{Company, CustomerSnapshot, ProductSnapshot};
use crate::domain::entity::sales_invoice::{
    InvoiceStatus, PaymentMethod, SalesInvoice, WALK_IN_CUSTOMER,
};
use crate::domain::entity::stock_movement::{MovementType, StockMovement};
use crate::domain::repository::sales_repository::{
    InvoiceCancellation, InvoiceFilter, InvoicePosting, PostingOutcome,
};
use crate::domain::repository::{InventoryRepository, SalesRepository};
use crate::domain::service::fefo_allocator;
use crate::domain::service::invoice_calculator;
use crate::domain::service::posting_rules;
use crate::domain::service::record_validator::{reason, FieldViolation};
use crate::domain::value_object::document_number::{self, INVOICE_PREFIX};
use crate::domain::value_object::gst::{self, SupplyType};
use crate::usecase::event::{event_type, EventFactory, EventStream};

const SALE_REFERENCE: &str = "SALES_INVOICE";
const CANCELLATION_REFERENCE: &str = "INVOICE_CANCELLATION";

/// 在庫不足の製品 1 件。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct StockShortfall {
    pub product_id: Uuid,
    pub product_name: String,
    pub requested: i32,
    pub available: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum SalesError {
    #[error("invoice not found: {0}")]
    InvoiceNotFound(Uuid),
    #[error("validation failed")]
    Validation(Vec<FieldViolation>),
    #[error("insufficient stock for {} product(s)", .0.len())]
    InsufficientStock(Vec<StockShortfall>),
    #[error("stock changed while the invoice was being posted")]
    StockChanged,
    #[error("invoice is {0}, expected COMPLETED")]
    InvalidStatus(InvoiceStatus),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct InvoiceLineInput {
    pub product_id: Uuid,
    pub quantity: i32,
    /// 省略時は製品の販売価格
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub discount_percent: Decimal,
    /// 指定時はこのロットからのみ引き当てる
    pub batch_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct CreateInvoiceInput {
    pub customer_id: Option<Uuid>,
    /// 顧客未登録時の表示名
    pub customer_name: Option<String>,
    pub payment_method: PaymentMethod,
    /// 受取金額。省略時は請求総額
    pub amount_paid: Option<Decimal>,
    pub notes: Option<String>,
    pub items: Vec<InvoiceLineInput>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvoiceListParams {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub status: Option<InvoiceStatus>,
    pub customer_id: Option<Uuid>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

/// 同一製品の明細をまとめた販売行。
#[derive(Debug, Clone, PartialEq)]
struct SaleLine {
    product_id: Uuid,
    quantity: i32,
    unit_price: Option<Decimal>,
    discount_percent: Decimal,
    batch_id: Option<Uuid>,
}

/// 同一製品の明細をまとめる。価格・値引・ロット指定が食い違う場合は違反とする。
fn merge_lines(items: &[InvoiceLineInput], violations: &mut Vec<FieldViolation>) -> Vec<SaleLine> {
    let mut merged: Vec<SaleLine> = Vec::new();
    for (i, item) in items.iter().enumerate() {
        match merged.iter_mut().find(|l| l.product_id == item.product_id) {
            Some(line) => {
                if line.unit_price != item.unit_price
                    || line.discount_percent != item.discount_percent
                    || line.batch_id != item.batch_id
                {
                    violations.push(FieldViolation::new(
                        &format!("items[{i}].product_id"),
                        reason::CONFLICTING_LINES,
                        "lines for the same product must share price, discount and batch",
                    ));
                }
                line.quantity = line.quantity.saturating_add(item.quantity);
            }
            None => merged.push(SaleLine {
                product_id: item.product_id,
                quantity: item.quantity,
                unit_price: item.unit_price,
                discount_percent: item.discount_percent,
                batch_id: item.batch_id,
            }),
        }
    }
    merged
}

fn validate_lines(items: &[InvoiceLineInput], violations: &mut Vec<FieldViolation>) {
    if items.is_empty() {
        violations.push(FieldViolation::new(
            "items",
            reason::REQUIRED,
            "at least one item is required",
        ));
    }
    for (i, item) in items.iter().enumerate() {
        if item.quantity <= 0 {
            violations.push(FieldViolation::new(
                &format!("items[{i}].quantity"),
                reason::OUT_OF_RANGE,
                "quantity must be greater than zero",
            ));
        }
        if item.discount_percent < Decimal::ZERO || item.discount_percent > Decimal::ONE_HUNDRED {
            violations.push(FieldViolation::new(
                &format!("items[{i}].discount_percent"),
                reason::OUT_OF_RANGE,
                "discount_percent must be between 0 and 100",
            ));
        }
        if item.unit_price.is_some_and(|p| p < Decimal::ZERO) {
            violations.push(FieldViolation::new(
                &format!("items[{i}].unit_price"),
                reason::OUT_OF_RANGE,
                "unit_price must not be negative",
            ));
        } else if item.unit_price.is_some_and(gst::exceeds_max_amount) {
            violations.push(FieldViolation::new(
                &format!("items[{i}].unit_price"),
                reason::OUT_OF_RANGE,
                format!("unit_price must not exceed {}", gst::max_amount()),
            ));
        }
    }
}

fn on_hand(batches: &[InventoryBatch]) -> i64 {
    batches
        .iter()
        .filter(|b| b.available_quantity > 0)
        .map(|b| i64::from(b.available_quantity))
        .sum()
}

pub struct SalesInvoicesUseCase {
    sales: Arc<dyn SalesRepository>,
    inventory: Arc<dyn InventoryRepository>,
    events: EventFactory,
    company: Company,
}

impl SalesInvoicesUseCase {
    pub fn new(
        sales: Arc<dyn SalesRepository>,
        inventory: Arc<dyn InventoryRepository>,
        events: EventFactory,
        company: Company,
    ) -> Self {
        Self {
            sales,
            inventory,
            events,
            company,
        }
    }

    async fn resolve_customer(
        &self,
        input: &CreateInvoiceInput,
        violations: &mut Vec<FieldViolation>,
    ) -> Result<Option<CustomerSnapshot>, SalesError> {
        let Some(customer_id) = input.customer_id else {
            return Ok(None);
        };
        let customer = self
            .sales
            .find_customer(customer_id)
            .await
            .map_err(|e| SalesError::Internal(e.to_string()))?
            .filter(|c| c.is_active);
        if customer.is_none() {
            violations.push(FieldViolation::new(
                "customer_id",
                reason::INVALID_REFERENCE,
                format!("customer {customer_id} does not exist or is inactive"),
            ));
        }
        Ok(customer)
    }

    async fn resolve_products(
        &self,
        lines: &[SaleLine],
        violations: &mut Vec<FieldViolation>,
    ) -> Result<HashMap<Uuid, ProductSnapshot>, SalesError> {
        if lines.is_empty() {
            return Ok(HashMap::new());
        }
        let products: HashMap<Uuid, ProductSnapshot> = self
            .inventory
            .find_products(lines.iter().map(|l| l.product_id).collect())
            .await
            .map_err(|e| SalesError::Internal(e.to_string()))?
            .into_iter()
            .filter(|p| p.is_active)
            .map(|p| (p.id, p))
            .collect();
        for line in lines {
            if !products.contains_key(&line.product_id) {
                violations.push(FieldViolation::new(
                    "items",
                    reason::INVALID_REFERENCE,
                    format!("product {} does not exist or is inactive", line.product_id),
                ));
            }
        }
        Ok(products)
    }

    /// 販売を登録する。在庫競合時は `StockChanged` を返す。
    #[tracing::instrument(skip(self, input), fields(lines = input.items.len(), payment_method = input.payment_method.as_str()))]
    pub async fn create_invoice(
        &self,
        input: &CreateInvoiceInput,
        actor: &str,
    ) -> Result<SalesInvoice, SalesError> {
        let mut violations = Vec::new();
        validate_lines(&input.items, &mut violations);
        if input
            .amount_paid
            .is_some_and(|a| a < Decimal::ZERO || gst::exceeds_max_amount(a))
        {
            violations.push(FieldViolation::new(
                "amount_paid",
                reason::OUT_OF_RANGE,
                format!("amount_paid must be between 0 and {}", gst::max_amount()),
            ));
        }
        let lines = merge_lines(&input.items, &mut violations);
        let customer = self.resolve_customer(input, &mut violations).await?;
        let products = self.resolve_products(&lines, &mut violations).await?;
        if !violations.is_empty() {
            return Err(SalesError::Validation(violations));
        }

        let today = super::today();
        let supply_type = SupplyType::determine(
            &self.company.state_code,
            customer.as_ref().and_then(CustomerSnapshot::state),
        );

        let mut items = Vec::new();
        let mut shortfalls = Vec::new();
        let mut low_stock = Vec::new();
        for line in &lines {
            let Some(product) = products.get(&line.product_id) else {
                continue;
            };
            let batches = self
                .inventory
                .list_batches(Some(product.id))
                .await
                .map_err(|e| SalesError::Internal(e.to_string()))?;
            match fefo_allocator::allocate(&batches, line.quantity, today, line.batch_id) {
                Ok(allocations) => {
                    let built = invoice_calculator::build_items(
                        product,
                        &allocations,
                        line.unit_price.unwrap_or(product.selling_price),
                        line.discount_percent,
                        supply_type,
                    )
                    .ok_or_else(|| {
                        SalesError::Validation(vec![FieldViolation::new(
                            "items",
                            reason::OUT_OF_RANGE,
                            format!("line amount for product {} is too large", product.id),
                        )])
                    })?;
                    items.extend(built);
                    let before = on_hand(&batches);
                    let after = before - i64::from(line.quantity);
                    let min = i64::from(product.min_stock_level);
                    if min > 0 && before >= min && after < min {
                        low_stock.push((product, after));
                    }
                }
                Err(shortage) => shortfalls.push(StockShortfall {
                    product_id: product.id,
                    product_name: product.name.clone(),
                    requested: shortage.requested,
                    available: shortage.available,
                }),
            }
        }
        if !shortfalls.is_empty() {
            return Err(SalesError::InsufficientStock(shortfalls));
        }

        let totals = invoice_calculator::totals(&items);
        let payment =
            invoice_calculator::settle_payment(input.payment_method, input.amount_paid, totals.grand_total);
        let now = Utc::now();
        let invoice = SalesInvoice {
            id: Uuid::new_v4(),
            invoice_number: document_number::generate(INVOICE_PREFIX, today),
            invoice_date: today,
            customer_id: customer.as_ref().map(|c| c.id),
            customer_name: customer
                .as_ref()
                .map(|c| c.name.clone())
                .or_else(|| {
                    input
                        .customer_name
                        .as_deref()
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                })
                .unwrap_or_else(|| WALK_IN_CUSTOMER.to_string()),
            customer_gstin: customer.as_ref().and_then(|c| c.gstin.clone()),
            place_of_supply: Some(
                customer
                    .as_ref()
                    .and_then(CustomerSnapshot::state)
                    .unwrap_or(self.company.state_code.as_str())
                    .to_string(),
            ),
            supply_type,
            items,
            subtotal: totals.subtotal,
            discount_amount: totals.discount_amount,
            taxable_amount: totals.taxable_amount,
            cgst_amount: totals.tax.cgst,
            sgst_amount: totals.tax.sgst,
            igst_amount: totals.tax.igst,
            total_tax: totals.total_tax,
            grand_total: totals.grand_total,
            amount_paid: payment.amount_paid,
            balance_due: payment.balance_due,
            change_due: payment.change_due,
            payment_method: input.payment_method,
            payment_status: payment.status,
            status: InvoiceStatus::Completed,
            cancellation_reason: None,
            notes: input.notes.clone(),
            created_by: actor.to_string(),
            created_at: now,
            updated_at: now,
        };

        let movements = invoice
            .items
            .iter()
            .map(|item| {
                StockMovement::new(
                    item.batch_id,
                    item.product_id,
                    MovementType::SaleOut,
                    -item.quantity,
                    SALE_REFERENCE,
                    Some(invoice.id),
                    None,
                    actor,
                )
            })
            .collect();
        let journal = posting_rules::sales_invoice_entry(&invoice, actor)
            .map_err(|e| SalesError::Internal(e.to_string()))?;

        let mut events = vec![self.events.build(
            EventStream::Sales,
            event_type::INVOICE_CREATED,
            invoice.id.to_string(),
            json!({
                "invoice_id": invoice.id,
                "invoice_number": invoice.invoice_number,
                "invoice_date": invoice.invoice_date,
                "customer_id": invoice.customer_id,
                "grand_total": invoice.grand_total,
                "payment_method": invoice.payment_method,
                "payment_status": invoice.payment_status,
                "items": invoice.items.iter().map(|i| json!({
                    "product_id": i.product_id,
                    "batch_id": i.batch_id,
                    "quantity": i.quantity,
                })).collect::<Vec<_>>(),
            }),
        )];
        events.extend(low_stock.into_iter().map(|(product, current_stock)| {
            self.events.build(
                EventStream::Inventory,
                event_type::INVENTORY_LOW_STOCK,
                product.id.to_string(),
                json!({
                    "product_id": product.id,
                    "sku": product.sku,
                    "product_name": product.name,
                    "current_stock": current_stock,
                    "min_stock_level": product.min_stock_level,
                    "reorder_level": product.reorder_level,
                }),
            )
        }));

        let posting = InvoicePosting {
            invoice,
            movements,
            journal,
            events,
        };
        match self
            .sales
            .create_invoice(&posting)
            .await
            .map_err(|e| SalesError::Internal(e.to_string()))?
        {
            PostingOutcome::Posted => {
                let invoice = posting.invoice;
                tracing::info!(
                    invoice_number = %invoice.invoice_number,
                    grand_total = %invoice.grand_total,
                    "invoice created"
                );
                Ok(invoice)
            }
            PostingOutcome::StockChanged => {
                tracing::warn!("batch stock changed during invoice posting");
                Err(SalesError::StockChanged)
            }
        }
    }

    pub async fn get_invoice(&self, id: Uuid) -> Result<SalesInvoice, SalesError> {
        self.sales
            .find_invoice(id)
            .await
            .map_err(|e| SalesError::Internal(e.to_string()))?
            .ok_or(SalesError::InvoiceNotFound(id))
    }

    pub async fn list_invoices(
        &self,
        params: &InvoiceListParams,
    ) -> Result<(Vec<SalesInvoice>, i64, u32, u32), SalesError> {
        let (page, page_size) = super::page_window(params.page, params.page_size).map_err(|m| {
            SalesError::Validation(vec![FieldViolation::new("page", reason::OUT_OF_RANGE, m)])
        })?;
        if let (Some(from), Some(to)) = (params.from, params.to) {
            if from > to {
                return Err(SalesError::Validation(vec![FieldViolation::new(
                    "from",
                    reason::INVALID_DATE,
                    "from must not be after to",
                )]));
            }
        }
        let (invoices, total) = self
            .sales
            .list_invoices(&InvoiceFilter {
                from: params.from,
                to: params.to,
                status: params.status,
                customer_id: params.customer_id,
                search: params
                    .search
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
                page,
                page_size,
            })
            .await
            .map_err(|e| SalesError::Internal(e.to_string()))?;
        Ok((invoices, total, page, page_size))
    }

    /// 取消: ロット在庫を戻し、販売仕訳の逆仕訳を計上する。
    #[tracing::instrument(skip(self), fields(invoice_id = %id))]
    pub async fn cancel_invoice(
        &self,
        id: Uuid,
        cancellation_reason: &str,
        actor: &str,
    ) -> Result<SalesInvoice, SalesError> {
        let cancellation_reason = cancellation_reason.trim();
        if cancellation_reason.is_empty() {
            return Err(SalesError::Validation(vec![FieldViolation::new(
                "reason",
                reason::REQUIRED,
                "a cancellation reason is required",
            )]));
        }
        let mut invoice = self.get_invoice(id).await?;
        if invoice.status != InvoiceStatus::Completed {
            return Err(SalesError::InvalidStatus(invoice.status));
        }

        let movements = invoice
            .items
            .iter()
            .map(|item| {
                StockMovement::new(
                    item.batch_id,
                    item.product_id,
                    MovementType::SaleCancelIn,
                    item.quantity,
                    CANCELLATION_REFERENCE,
                    Some(invoice.id),
                    Some(cancellation_reason.to_string()),
                    actor,
                )
            })
            .collect();
        let journal = posting_rules::invoice_cancellation_entry(&invoice, super::today(), actor)
            .map_err(|e| SalesError::Internal(e.to_string()))?;
        let event = self.events.build(
            EventStream::Sales,
            event_type::INVOICE_CANCELLED,
            invoice.id.to_string(),
            json!({
                "invoice_id": invoice.id,
                "invoice_number": invoice.invoice_number,
                "grand_total": invoice.grand_total,
                "reason": cancellation_reason,
                "cancelled_by": actor,
            }),
        );

        let cancelled = self
            .sales
            .cancel_invoice(&InvoiceCancellation {
                invoice_id: invoice.id,
                reason: cancellation_reason.to_string(),
                cancelled_by: actor.to_string(),
                movements,
                journal,
                event,
            })
            .await
            .map_err(|e| SalesError::Internal(e.to_string()))?;
        if !cancelled {
            let current = self.get_invoice(id).await?;
            return Err(SalesError::InvalidStatus(current.status));
        }

        invoice.status = InvoiceStatus::Cancelled;
        invoice.cancellation_reason = Some(cancellation_reason.to_string());
        invoice.updated_at = Utc::now();
        tracing::info!(invoice_number = %invoice.invoice_number, "invoice cancelled");
        Ok(invoice)
    }

    /// 期間内の伝票（GST 集計用）。
    pub async fn invoices_for_period(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<SalesInvoice>, SalesError> {
        self.sales
            .invoices_for_period(from, to)
            .await
            .map_err(|e| SalesError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::sales_invoice::PaymentStatus;
    use crate::domain::repository::inventory_repository::MockInventoryRepository;
    use crate::domain::repository::sales_repository::MockSalesRepository;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn company() -> Company {
        Company {
            name: "Yeelo Homeopathy".to_string(),
            gstin: None,
            state_code: "27".to_string(),
        }
    }

    fn product(min_stock_level: i32) -> ProductSnapshot {
        ProductSnapshot {
            id: Uuid::new_v4(),
            sku: "ARN30".to_string(),
            name: "Arnica Montana 30C".to_string(),
            hsn_code: Some("3004".to_string()),
            gst_rate: dec!(12),
            selling_price: dec!(100),
            mrp: Some(dec!(110)),
            min_stock_level,
            reorder_level: min_stock_level * 2,
            is_active: true,
        }
    }

    fn batch(product_id: Uuid, batch_no: &str, qty: i32, expires_in: i64) -> InventoryBatch {
        let now = Utc::now();
        InventoryBatch {
            id: Uuid::new_v4(),
            product_id,
            batch_no: batch_no.to_string(),
            expiry_date: Some(now.date_naive() + Duration::days(expires_in)),
            mfg_date: None,
            available_quantity: qty,
            unit_cost: dec!(40),
            mrp: None,
            selling_price: None,
            location: None,
            grn_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn line(product_id: Uuid, quantity: i32) -> InvoiceLineInput {
        InvoiceLineInput {
            product_id,
            quantity,
            unit_price: None,
            discount_percent: Decimal::ZERO,
            batch_id: None,
        }
    }

    fn input(payment_method: PaymentMethod, amount_paid: Option<Decimal>, items: Vec<InvoiceLineInput>) -> CreateInvoiceInput {
        CreateInvoiceInput {
            customer_id: None,
            customer_name: None,
            payment_method,
            amount_paid,
            notes: None,
            items,
        }
    }

    fn inventory_with(product: ProductSnapshot, batches: Vec<InventoryBatch>) -> MockInventoryRepository {
        let mut inventory = MockInventoryRepository::new();
        inventory
            .expect_find_products()
            .returning(move |_| Ok(vec![product.clone()]));
        inventory
            .expect_list_batches()
            .returning(move |_| Ok(batches.clone()));
        inventory
    }

    fn usecase(sales: MockSalesRepository, inventory: MockInventoryRepository) -> SalesInvoicesUseCase {
        SalesInvoicesUseCase::new(
            Arc::new(sales),
            Arc::new(inventory),
            EventFactory::default(),
            company(),
        )
    }

    #[tokio::test]
    async fn test_create_invoice_allocates_fefo_and_gives_change() {
        let p = product(0);
        let early = batch(p.id, "EARLY", 2, 30);
        let late = batch(p.id, "LATE", 5, 300);
        let early_id = early.id;
        let inventory = inventory_with(p.clone(), vec![late, early]);

        let mut sales = MockSalesRepository::new();
        sales
            .expect_create_invoice()
            .withf(|posting| {
                posting.movements.len() == 2
                    && posting.movements.iter().all(|m| m.movement_type == MovementType::SaleOut)
                    && posting.journal.as_ref().is_some_and(|j| j.total_debit == dec!(456))
                    && posting.events.len() == 1
            })
            .returning(|_| Ok(PostingOutcome::Posted));

        let uc = usecase(sales, inventory);
        // 2 明細は同一製品として 1 行に統合される
        let invoice = uc
            .create_invoice(
                &input(PaymentMethod::Cash, Some(dec!(400)), vec![line(p.id, 2), line(p.id, 1)]),
                "cashier@yeelo.in",
            )
            .await
            .unwrap();

        assert_eq!(invoice.items.len(), 2);
        assert_eq!(invoice.items[0].batch_id, early_id);
        assert_eq!(invoice.items[0].quantity, 2);
        assert_eq!(invoice.items[1].quantity, 1);
        assert_eq!(invoice.customer_name, WALK_IN_CUSTOMER);
        assert_eq!(invoice.supply_type, SupplyType::IntraState);
        assert_eq!(invoice.taxable_amount, dec!(300));
        assert_eq!(invoice.cgst_amount, dec!(18));
        assert_eq!(invoice.sgst_amount, dec!(18));
        assert_eq!(invoice.grand_total, dec!(336));
        assert_eq!(invoice.amount_paid, dec!(400));
        assert_eq!(invoice.change_due, dec!(64));
        assert_eq!(invoice.payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_create_invoice_on_credit() {
        let p = product(0);
        let inventory = inventory_with(p.clone(), vec![batch(p.id, "B1", 10, 100)]);
        let customer = CustomerSnapshot {
            id: Uuid::new_v4(),
            name: "Dr. Mehta Clinic".to_string(),
            gstin: Some("29AAACM1234F1Z5".to_string()),
            state_code: None,
            is_active: true,
        };
        let customer_id = customer.id;

        let mut sales = MockSalesRepository::new();
        sales
            .expect_find_customer()
            .returning(move |_| Ok(Some(customer.clone())));
        sales
            .expect_create_invoice()
            .returning(|_| Ok(PostingOutcome::Posted));

        let uc = usecase(sales, inventory);
        let mut req = input(PaymentMethod::Credit, Some(dec!(50)), vec![line(p.id, 1)]);
        req.customer_id = Some(customer_id);
        let invoice = uc.create_invoice(&req, "cashier").await.unwrap();

        assert_eq!(invoice.supply_type, SupplyType::InterState);
        assert_eq!(invoice.place_of_supply.as_deref(), Some("29"));
        assert_eq!(invoice.igst_amount, dec!(12));
        assert_eq!(invoice.amount_paid, Decimal::ZERO);
        assert_eq!(invoice.balance_due, dec!(112));
        assert_eq!(invoice.payment_status, PaymentStatus::Unpaid);
    }

    #[tokio::test]
    async fn test_create_invoice_insufficient_stock() {
        let p = product(0);
        let inventory = inventory_with(
            p.clone(),
            vec![batch(p.id, "OK", 3, 10), batch(p.id, "EXPIRED", 50, -1)],
        );
        let mut sales = MockSalesRepository::new();
        sales.expect_create_invoice().never();

        let uc = usecase(sales, inventory);
        match uc
            .create_invoice(&input(PaymentMethod::Cash, None, vec![line(p.id, 5)]), "cashier")
            .await
        {
            Err(SalesError::InsufficientStock(s)) => {
                assert_eq!(s.len(), 1);
                assert_eq!(s[0].requested, 5);
                assert_eq!(s[0].available, 3);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_invoice_rejects_conflicting_lines() {
        let p = product(0);
        let inventory = inventory_with(p.clone(), vec![]);
        let uc = usecase(MockSalesRepository::new(), inventory);

        let mut second = line(p.id, 1);
        second.discount_percent = dec!(10);
        let mut bad = line(p.id, 0);
        bad.discount_percent = dec!(10);
        match uc
            .create_invoice(
                &input(PaymentMethod::Cash, None, vec![line(p.id, 1), second, bad]),
                "cashier",
            )
            .await
        {
            Err(SalesError::Validation(v)) => {
                assert!(v.iter().any(|x| x.field == "items[2].quantity"));
                assert!(v
                    .iter()
                    .any(|x| x.field == "items[1].product_id" && x.reason == reason::CONFLICTING_LINES));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_invoice_rejects_price_above_ceiling() {
        let p = product(0);
        let inventory = inventory_with(p.clone(), vec![batch(p.id, "B1", 10, 100)]);
        let mut sales = MockSalesRepository::new();
        sales.expect_create_invoice().never();

        let uc = usecase(sales, inventory);
        let mut huge = line(p.id, 10);
        huge.unit_price = Some(Decimal::from_i128_with_scale(10_i128.pow(28), 0));
        match uc
            .create_invoice(&input(PaymentMethod::Cash, Some(Decimal::MAX), vec![huge]), "cashier")
            .await
        {
            Err(SalesError::Validation(v)) => {
                assert!(v
                    .iter()
                    .any(|x| x.field == "items[0].unit_price" && x.reason == reason::OUT_OF_RANGE));
                assert!(v.iter().any(|x| x.field == "amount_paid"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_invoice_overflowing_list_price_is_rejected() {
        let mut p = product(0);
        p.selling_price = Decimal::MAX;
        let inventory = inventory_with(p.clone(), vec![batch(p.id, "B1", 10, 100)]);
        let mut sales = MockSalesRepository::new();
        sales.expect_create_invoice().never();

        let uc = usecase(sales, inventory);
        match uc
            .create_invoice(&input(PaymentMethod::Cash, None, vec![line(p.id, 10)]), "cashier")
            .await
        {
            Err(SalesError::Validation(v)) => {
                assert_eq!(v[0].field, "items");
                assert_eq!(v[0].reason, reason::OUT_OF_RANGE);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_invoice_emits_low_stock_on_crossing() {
        let p = product(10);
        let inventory = inventory_with(p.clone(), vec![batch(p.id, "B1", 12, 100)]);
        let mut sales = MockSalesRepository::new();
        sales
            .expect_create_invoice()
            .withf(|posting| {
                posting.events.len() == 2
                    && posting.events[1].event_type == "inventory.low_stock"
                    && posting.events[1].topic == "yeelo.inventory"
                    && posting.events[1].payload["data"]["current_stock"] == 7
            })
            .returning(|_| Ok(PostingOutcome::Posted));

        let uc = usecase(sales, inventory);
        uc.create_invoice(&input(PaymentMethod::Upi, None, vec![line(p.id, 5)]), "cashier")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_invoice_stock_changed() {
        let p = product(0);
        let inventory = inventory_with(p.clone(), vec![batch(p.id, "B1", 10, 100)]);
        let mut sales = MockSalesRepository::new();
        sales
            .expect_create_invoice()
            .returning(|_| Ok(PostingOutcome::StockChanged));

        let uc = usecase(sales, inventory);
        assert!(matches!(
            uc.create_invoice(&input(PaymentMethod::Cash, None, vec![line(p.id, 1)]), "cashier")
                .await,
            Err(SalesError::StockChanged)
        ));
    }

    #[tokio::test]
    async fn test_cancel_invoice_restocks_and_reverses() {
        let p = product(0);
        let inventory = inventory_with(p.clone(), vec![batch(p.id, "B1", 10, 100)]);
        let mut sales = MockSalesRepository::new();
        sales
            .expect_create_invoice()
            .returning(|_| Ok(PostingOutcome::Posted));
        let uc = usecase(sales, inventory);
        let invoice = uc
            .create_invoice(&input(PaymentMethod::Cash, None, vec![line(p.id, 3)]), "cashier")
            .await
            .unwrap();

        let found = invoice.clone();
        let mut sales = MockSalesRepository::new();
        sales
            .expect_find_invoice()
            .returning(move |_| Ok(Some(found.clone())));
        sales
            .expect_cancel_invoice()
            .withf(|c| {
                c.movements.len() == 1
                    && c.movements[0].movement_type == MovementType::SaleCancelIn
                    && c.movements[0].quantity == 3
                    && c.journal.as_ref().is_some_and(|j| j.total_credit == dec!(456))
                    && c.event.event_type == "invoice.cancelled"
            })
            .returning(|_| Ok(true));

        let uc = usecase(sales, MockInventoryRepository::new());
        let cancelled = uc
            .cancel_invoice(invoice.id, "customer changed mind", "manager")
            .await
            .unwrap();
        assert_eq!(cancelled.status, InvoiceStatus::Cancelled);
        assert_eq!(
            cancelled.cancellation_reason.as_deref(),
            Some("customer changed mind")
        );
    }

    #[tokio::test]
    async fn test_cancel_invoice_requires_completed() {
        let p = product(0);
        let inventory = inventory_with(p.clone(), vec![batch(p.id, "B1", 10, 100)]);
        let mut sales = MockSalesRepository::new();
        sales
            .expect_create_invoice()
            .returning(|_| Ok(PostingOutcome::Posted));
        let mut invoice = usecase(sales, inventory)
            .create_invoice(&input(PaymentMethod::Cash, None, vec![line(p.id, 1)]), "cashier")
            .await
            .unwrap();
        invoice.status = InvoiceStatus::Cancelled;

        let mut sales = MockSalesRepository::new();
        sales
            .expect_find_invoice()
            .returning(move |_| Ok(Some(invoice.clone())));
        sales.expect_cancel_invoice().never();

        let uc = usecase(sales, MockInventoryRepository::new());
        assert!(matches!(
            uc.cancel_invoice(Uuid::new_v4(), "dup", "manager").await,
            Err(SalesError::InvalidStatus(InvoiceStatus::Cancelled))
        ));
    }

    #[tokio::test]
    async fn test_list_invoices_rejects_inverted_range() {
        let uc = usecase(MockSalesRepository::new(), MockInventoryRepository::new());
        let params = InvoiceListParams {
            from: NaiveDate::from_ymd_opt(2024, 5, 1),
            to: NaiveDate::from_ymd_opt(2024, 4, 1),
            ..Default::default()
        };
        assert!(matches!(
            uc.list_invoices(&params).await,
            Err(SalesError::Validation(_))
        ));
    }
}
