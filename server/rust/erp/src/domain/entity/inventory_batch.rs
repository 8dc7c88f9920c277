use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// InventoryBatch は製品ロット単位の在庫。
#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct InventoryBatch {
    pub id: Uuid,
    pub product_id: Uuid,
    pub batch_no: String,
    pub expiry_date: Option<NaiveDate>,
    pub mfg_date: Option<NaiveDate>,
    pub available_quantity: i32,
    /// 加重平均の仕入単価
    pub unit_cost: Decimal,
    pub mrp: Option<Decimal>,
    pub selling_price: Option<Decimal>,
    pub location: Option<String>,
    pub grn_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryBatch {
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date.is_some_and(|d| d < today)
    }

    pub fn stock_value(&self) -> Decimal {
        Decimal::from(self.available_quantity) * self.unit_cost
    }
}

/// 入庫数量で加重平均単価を再計算する。数量・金額が範囲を超える場合は None。
pub fn weighted_average_cost(
    existing_qty: i32,
    existing_cost: Decimal,
    incoming_qty: i32,
    incoming_cost: Decimal,
) -> Option<Decimal> {
    let existing_qty = existing_qty.max(0);
    let total_qty = existing_qty.checked_add(incoming_qty)?;
    if total_qty <= 0 {
        return Some(incoming_cost);
    }
    let total_value = Decimal::from(existing_qty)
        .checked_mul(existing_cost)?
        .checked_add(Decimal::from(incoming_qty).checked_mul(incoming_cost)?)?;
    Some((total_value / Decimal::from(total_qty)).round_dp(4))
}
