use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::entity::goods_receipt::GrnItem;
use crate::domain::entity::party::ProductSnapshot;
use crate::domain::value_object::gst::{line_amount, GstBreakdown, SupplyType};

/// ReceiptLine は検証済みの入荷明細入力。
#[derive(Debug, Clone)]
pub struct ReceiptLine<'a> {
    pub product: &'a ProductSnapshot,
    pub batch_no: String,
    pub expiry_date: Option<NaiveDate>,
    pub mfg_date: Option<NaiveDate>,
    pub ordered_quantity: Option<i32>,
    pub received_quantity: i32,
    pub damaged_quantity: i32,
    pub unit_cost: Decimal,
    pub mrp: Option<Decimal>,
    pub selling_price: Option<Decimal>,
}

/// 受入数量 × 仕入単価に製品税率で仕入税額（ITC）を計算する。
/// 金額が Decimal の範囲を超える場合は None。
pub fn build_item(line: ReceiptLine<'_>, supply_type: SupplyType) -> Option<GrnItem> {
    let accepted = line.received_quantity - line.damaged_quantity;
    let taxable = line_amount(accepted, line.unit_cost)?;
    let tax = GstBreakdown::try_compute(taxable, line.product.gst_rate, supply_type)?;
    Some(GrnItem {
        id: Uuid::new_v4(),
        product_id: line.product.id,
        product_name: line.product.name.clone(),
        batch_no: line.batch_no,
        expiry_date: line.expiry_date,
        mfg_date: line.mfg_date,
        ordered_quantity: line.ordered_quantity,
        received_quantity: line.received_quantity,
        damaged_quantity: line.damaged_quantity,
        accepted_quantity: accepted,
        unit_cost: line.unit_cost,
        mrp: line.mrp.or(line.product.mrp),
        selling_price: line.selling_price.or(Some(line.product.selling_price)),
        gst_rate: line.product.gst_rate,
        taxable_amount: taxable,
        cgst_amount: tax.cgst,
        sgst_amount: tax.sgst,
        igst_amount: tax.igst,
        total_amount: taxable + tax.total(),
    })
}

pub fn totals(items: &[GrnItem]) -> (Decimal, GstBreakdown, Decimal) {
    let taxable: Decimal = items.iter().map(|i| i.taxable_amount).sum();
    let tax = items
        .iter()
        .fold(GstBreakdown::default(), |acc, i| acc.add(i.tax()));
    (taxable, tax, taxable + tax.total())
}
