//! 販売明細の金額計算と支払の精算。

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::entity::party::ProductSnapshot;
use crate::domain::entity::sales_invoice::{InvoiceItem, PaymentMethod, PaymentStatus};
use crate::domain::service::fefo_allocator::BatchAllocation;
use crate::domain::value_object::gst::{line_amount, round_money, GstBreakdown, SupplyType};

/// 1 製品分の引当結果から、ロットごとの請求明細を作る。
/// 金額が Decimal の範囲を超える場合は None。
pub fn build_items(
    product: &ProductSnapshot,
    allocations: &[BatchAllocation],
    unit_price: Decimal,
    discount_percent: Decimal,
    supply_type: SupplyType,
) -> Option<Vec<InvoiceItem>> {
    allocations
        .iter()
        .map(|allocation| {
            let gross = line_amount(allocation.quantity, unit_price)?;
            let discount = round_money(gross.checked_mul(discount_percent)? / Decimal::ONE_HUNDRED);
            let taxable = gross - discount;
            let tax = GstBreakdown::try_compute(taxable, product.gst_rate, supply_type)?;
            Some(InvoiceItem {
                id: Uuid::new_v4(),
                product_id: product.id,
                product_name: product.name.clone(),
                sku: product.sku.clone(),
                hsn_code: product.hsn_code.clone(),
                batch_id: allocation.batch.id,
                batch_no: allocation.batch.batch_no.clone(),
                expiry_date: allocation.batch.expiry_date,
                quantity: allocation.quantity,
                unit_price,
                unit_cost: allocation.batch.unit_cost,
                discount_percent,
                discount_amount: discount,
                taxable_amount: taxable,
                gst_rate: product.gst_rate,
                cgst_amount: tax.cgst,
                sgst_amount: tax.sgst,
                igst_amount: tax.igst,
                line_total: taxable + tax.total(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvoiceTotals {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub taxable_amount: Decimal,
    pub tax: GstBreakdown,
    pub total_tax: Decimal,
    pub grand_total: Decimal,
}

pub fn totals(items: &[InvoiceItem]) -> InvoiceTotals {
    let mut t = InvoiceTotals::default();
    for item in items {
        t.subtotal += item.taxable_amount + item.discount_amount;
        t.discount_amount += item.discount_amount;
        t.taxable_amount += item.taxable_amount;
        t.tax = t.tax.add(item.tax());
    }
    t.total_tax = t.tax.total();
    t.grand_total = t.taxable_amount + t.total_tax;
    t
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentOutcome {
    /// 受け取った金額（釣銭を含む）
    pub amount_paid: Decimal,
    pub balance_due: Decimal,
    pub change_due: Decimal,
    pub status: PaymentStatus,
}

impl PaymentOutcome {
    /// 売上に充当された入金額。
    pub fn settled(&self) -> Decimal {
        self.amount_paid - self.change_due
    }
}

/// 支払を精算する。CREDIT は入金 0、それ以外で金額未指定なら全額入金とみなす。
pub fn settle_payment(
    method: PaymentMethod,
    tendered: Option<Decimal>,
    grand_total: Decimal,
) -> PaymentOutcome {
    let amount_paid = match method {
        PaymentMethod::Credit => Decimal::ZERO,
        _ => tendered.unwrap_or(grand_total),
    };
    PaymentOutcome {
        amount_paid,
        balance_due: (grand_total - amount_paid).max(Decimal::ZERO),
        change_due: (amount_paid - grand_total).max(Decimal::ZERO),
        status: PaymentStatus::from_amounts(amount_paid, grand_total),
    }
}
