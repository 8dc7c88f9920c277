//! 入荷（GRN）の登録・承認・却下。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::domain::entity::goods_receipt::{GoodsReceipt, GrnStatus, QcStatus};
use crate::domain::entity::party::Company;
use crate::domain::repository::purchase_repository::{GrnApproval, GrnFilter};
use crate::domain::repository::{InventoryRepository, PurchaseRepository};
use crate::domain::service::grn_calculator::{self, ReceiptLine};
use crate::domain::service::posting_rules;
use crate::domain::service::record_validator::{reason, FieldViolation};
use crate::domain::value_object::document_number::{self, GRN_PREFIX};
use crate::domain::value_object::gst::{self, SupplyType};
use crate::usecase::event::{event_type, EventFactory, EventStream};

#[derive(Debug, thiserror::Error)]
pub enum PurchaseError {
    #[error("goods receipt not found: {0}")]
    GrnNotFound(Uuid),
    #[error("validation failed")]
    Validation(Vec<FieldViolation>),
    #[error("goods receipt is {0}, expected PENDING")]
    InvalidStatus(GrnStatus),
    #[error("no line of the goods receipt has an accepted quantity")]
    NothingAccepted,
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct GrnLineInput {
    pub product_id: Uuid,
    pub batch_no: String,
    pub expiry_date: Option<NaiveDate>,
    pub mfg_date: Option<NaiveDate>,
    pub ordered_quantity: Option<i32>,
    pub received_quantity: i32,
    #[serde(default)]
    pub damaged_quantity: i32,
    pub unit_cost: Decimal,
    pub mrp: Option<Decimal>,
    pub selling_price: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct CreateGrnInput {
    pub supplier_id: Uuid,
    pub supplier_invoice_no: Option<String>,
    pub supplier_invoice_date: Option<NaiveDate>,
    /// 省略時は当日
    pub received_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub items: Vec<GrnLineInput>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrnListParams {
    pub status: Option<GrnStatus>,
    pub supplier_id: Option<Uuid>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

pub struct ReceiveGoodsUseCase {
    purchases: Arc<dyn PurchaseRepository>,
    inventory: Arc<dyn InventoryRepository>,
    events: EventFactory,
    company: Company,
}

impl ReceiveGoodsUseCase {
    pub fn new(
        purchases: Arc<dyn PurchaseRepository>,
        inventory: Arc<dyn InventoryRepository>,
        events: EventFactory,
        company: Company,
    ) -> Self {
        Self {
            purchases,
            inventory,
            events,
            company,
        }
    }

    /// 入荷を PENDING で登録する。在庫・仕訳は承認時に計上する。
    #[tracing::instrument(skip(self, input), fields(supplier_id = %input.supplier_id, lines = input.items.len()))]
    pub async fn create_grn(
        &self,
        input: &CreateGrnInput,
        actor: &str,
    ) -> Result<GoodsReceipt, PurchaseError> {
        let received_date = input.received_date.unwrap_or_else(super::today);
        let mut violations = Vec::new();

        let supplier = self
            .purchases
            .find_supplier(input.supplier_id)
            .await
            .map_err(|e| PurchaseError::Internal(e.to_string()))?
            .filter(|s| s.is_active);
        if supplier.is_none() {
            violations.push(FieldViolation::new(
                "supplier_id",
                reason::INVALID_REFERENCE,
                format!("supplier {} does not exist or is inactive", input.supplier_id),
            ));
        }
        if input.items.is_empty() {
            violations.push(FieldViolation::new(
                "items",
                reason::REQUIRED,
                "at least one item is required",
            ));
        }

        let product_ids: Vec<Uuid> = input
            .items
            .iter()
            .map(|i| i.product_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let products: HashMap<Uuid, _> = if product_ids.is_empty() {
            HashMap::new()
        } else {
            self.inventory
                .find_products(product_ids)
                .await
                .map_err(|e| PurchaseError::Internal(e.to_string()))?
                .into_iter()
                .filter(|p| p.is_active)
                .map(|p| (p.id, p))
                .collect()
        };

        let mut seen = HashSet::new();
        for (i, line) in input.items.iter().enumerate() {
            let field = |name: &str| format!("items[{i}].{name}");
            if !products.contains_key(&line.product_id) {
                violations.push(FieldViolation::new(
                    &field("product_id"),
                    reason::INVALID_REFERENCE,
                    format!("product {} does not exist or is inactive", line.product_id),
                ));
            }
            if line.received_quantity <= 0 {
                violations.push(FieldViolation::new(
                    &field("received_quantity"),
                    reason::OUT_OF_RANGE,
                    "received_quantity must be greater than zero",
                ));
            }
            if line.damaged_quantity < 0 || line.damaged_quantity > line.received_quantity {
                violations.push(FieldViolation::new(
                    &field("damaged_quantity"),
                    reason::OUT_OF_RANGE,
                    "damaged_quantity must be between 0 and received_quantity",
                ));
            }
            if line.unit_cost < Decimal::ZERO {
                violations.push(FieldViolation::new(
                    &field("unit_cost"),
                    reason::OUT_OF_RANGE,
                    "unit_cost must not be negative",
                ));
            } else if gst::exceeds_max_amount(line.unit_cost) {
                violations.push(FieldViolation::new(
                    &field("unit_cost"),
                    reason::OUT_OF_RANGE,
                    format!("unit_cost must not exceed {}", gst::max_amount()),
                ));
            }
            for (name, price) in [("mrp", line.mrp), ("selling_price", line.selling_price)] {
                if price.is_some_and(|p| p < Decimal::ZERO || gst::exceeds_max_amount(p)) {
                    violations.push(FieldViolation::new(
                        &field(name),
                        reason::OUT_OF_RANGE,
                        format!("{name} must be between 0 and {}", gst::max_amount()),
                    ));
                }
            }
            let batch_no = line.batch_no.trim();
            if batch_no.is_empty() {
                violations.push(FieldViolation::new(
                    &field("batch_no"),
                    reason::REQUIRED,
                    "batch_no is required",
                ));
            }
            if line.expiry_date.is_some_and(|d| d <= received_date) {
                violations.push(FieldViolation::new(
                    &field("expiry_date"),
                    reason::INVALID_DATE,
                    "expiry_date must be after the received date",
                ));
            }
            if !seen.insert((line.product_id, batch_no.to_string())) {
                violations.push(FieldViolation::new(
                    &field("batch_no"),
                    reason::DUPLICATE_VALUE,
                    format!("batch {batch_no} appears more than once for the same product"),
                ));
            }
        }

        let Some(supplier) = supplier.filter(|_| violations.is_empty()) else {
            return Err(PurchaseError::Validation(violations));
        };

        let supply_type = SupplyType::determine(&self.company.state_code, supplier.state());
        let mut items = Vec::with_capacity(input.items.len());
        for (i, line) in input.items.iter().enumerate() {
            let Some(product) = products.get(&line.product_id) else {
                continue;
            };
            let item = grn_calculator::build_item(
                ReceiptLine {
                    product,
                    batch_no: line.batch_no.trim().to_string(),
                    expiry_date: line.expiry_date,
                    mfg_date: line.mfg_date,
                    ordered_quantity: line.ordered_quantity,
                    received_quantity: line.received_quantity,
                    damaged_quantity: line.damaged_quantity,
                    unit_cost: line.unit_cost,
                    mrp: line.mrp,
                    selling_price: line.selling_price,
                },
                supply_type,
            )
            .ok_or_else(|| {
                PurchaseError::Validation(vec![FieldViolation::new(
                    &format!("items[{i}].unit_cost"),
                    reason::OUT_OF_RANGE,
                    "line amount is too large",
                )])
            })?;
            items.push(item);
        }
        let (taxable, tax, total) = grn_calculator::totals(&items);

        let now = Utc::now();
        let grn = GoodsReceipt {
            id: Uuid::new_v4(),
            grn_number: document_number::generate(GRN_PREFIX, received_date),
            supplier_id: supplier.id,
            supplier_name: supplier.name.clone(),
            supplier_gstin: supplier.gstin.clone(),
            supplier_invoice_no: input
                .supplier_invoice_no
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            supplier_invoice_date: input.supplier_invoice_date,
            received_date,
            supply_type,
            status: GrnStatus::Pending,
            qc_status: QcStatus::Pending,
            items,
            taxable_amount: taxable,
            cgst_amount: tax.cgst,
            sgst_amount: tax.sgst,
            igst_amount: tax.igst,
            total_amount: total,
            notes: input.notes.clone(),
            rejection_reason: None,
            created_by: actor.to_string(),
            approved_by: None,
            approved_at: None,
            created_at: now,
            updated_at: now,
        };

        self.purchases
            .create_grn(&grn)
            .await
            .map_err(|e| PurchaseError::Internal(e.to_string()))?;
        tracing::info!(grn_number = %grn.grn_number, total = %grn.total_amount, "goods receipt created");
        Ok(grn)
    }

    pub async fn get_grn(&self, id: Uuid) -> Result<GoodsReceipt, PurchaseError> {
        self.purchases
            .find_grn(id)
            .await
            .map_err(|e| PurchaseError::Internal(e.to_string()))?
            .ok_or(PurchaseError::GrnNotFound(id))
    }

    pub async fn list_grns(
        &self,
        params: &GrnListParams,
    ) -> Result<(Vec<GoodsReceipt>, i64, u32, u32), PurchaseError> {
        let (page, page_size) = super::page_window(params.page, params.page_size).map_err(|m| {
            PurchaseError::Validation(vec![FieldViolation::new("page", reason::OUT_OF_RANGE, m)])
        })?;
        let (grns, total) = self
            .purchases
            .list_grns(&GrnFilter {
                status: params.status,
                supplier_id: params.supplier_id,
                page,
                page_size,
            })
            .await
            .map_err(|e| PurchaseError::Internal(e.to_string()))?;
        Ok((grns, total, page, page_size))
    }

    /// 承認: ロット入庫・仕入仕訳・`grn.approved` を 1 トランザクションで計上する。
    #[tracing::instrument(skip(self), fields(grn_id = %id))]
    pub async fn approve_grn(&self, id: Uuid, actor: &str) -> Result<GoodsReceipt, PurchaseError> {
        let mut grn = self.get_grn(id).await?;
        if grn.status != GrnStatus::Pending {
            return Err(PurchaseError::InvalidStatus(grn.status));
        }
        if grn.items.iter().all(|i| i.accepted_quantity <= 0) {
            return Err(PurchaseError::NothingAccepted);
        }

        let qc_status = grn.assess_quality();
        let approved_at = Utc::now();
        let journal = posting_rules::goods_receipt_entry(&grn, super::today(), actor)
            .map_err(|e| PurchaseError::Internal(e.to_string()))?;
        let event = self.events.build(
            EventStream::Purchases,
            event_type::GRN_APPROVED,
            grn.supplier_id.to_string(),
            json!({
                "grn_id": grn.id,
                "grn_number": grn.grn_number,
                "supplier_id": grn.supplier_id,
                "qc_status": qc_status.as_str(),
                "total_amount": grn.total_amount,
                "items": grn.items.iter().map(|i| json!({
                    "product_id": i.product_id,
                    "batch_no": i.batch_no,
                    "accepted_quantity": i.accepted_quantity,
                })).collect::<Vec<_>>(),
                "approved_by": actor,
            }),
        );

        let approved = self
            .purchases
            .approve_grn(&GrnApproval {
                grn_id: grn.id,
                qc_status,
                approved_by: actor.to_string(),
                approved_at,
                journal,
                event,
            })
            .await
            .map_err(|e| PurchaseError::Internal(e.to_string()))?;
        if !approved {
            let current = self.get_grn(id).await?;
            return Err(PurchaseError::InvalidStatus(current.status));
        }

        grn.status = GrnStatus::Approved;
        grn.qc_status = qc_status;
        grn.approved_by = Some(actor.to_string());
        grn.approved_at = Some(approved_at);
        grn.updated_at = approved_at;
        tracing::info!(grn_number = %grn.grn_number, qc_status = %qc_status.as_str(), "goods receipt approved");
        Ok(grn)
    }

    #[tracing::instrument(skip(self), fields(grn_id = %id))]
    pub async fn reject_grn(
        &self,
        id: Uuid,
        rejection_reason: &str,
        actor: &str,
    ) -> Result<GoodsReceipt, PurchaseError> {
        let rejection_reason = rejection_reason.trim();
        if rejection_reason.is_empty() {
            return Err(PurchaseError::Validation(vec![FieldViolation::new(
                "reason",
                reason::REQUIRED,
                "a rejection reason is required",
            )]));
        }
        let mut grn = self.get_grn(id).await?;
        if grn.status != GrnStatus::Pending {
            return Err(PurchaseError::InvalidStatus(grn.status));
        }

        let rejected = self
            .purchases
            .reject_grn(id, rejection_reason, actor)
            .await
            .map_err(|e| PurchaseError::Internal(e.to_string()))?;
        if !rejected {
            let current = self.get_grn(id).await?;
            return Err(PurchaseError::InvalidStatus(current.status));
        }

        grn.status = GrnStatus::Rejected;
        grn.rejection_reason = Some(rejection_reason.to_string());
        grn.updated_at = Utc::now();
        tracing::info!(grn_number = %grn.grn_number, "goods receipt rejected");
        Ok(grn)
    }

    /// 期間内に承認された入荷（GST 集計用）。
    pub async fn approved_for_period(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<GoodsReceipt>, PurchaseError> {
        self.purchases
            .approved_grns_for_period(from, to)
            .await
            .map_err(|e| PurchaseError::Internal(e.to_string()))
    }
}
