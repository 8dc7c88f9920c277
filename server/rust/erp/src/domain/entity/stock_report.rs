//! 在庫の読み取りモデル（在庫一覧・アラート・サマリ）。

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct StockLevel {
    pub product_id: Uuid,
    pub sku: String,
    pub product_name: String,
    pub total_available: i64,
    pub batch_count: usize,
    pub stock_value: Decimal,
    pub nearest_expiry: Option<NaiveDate>,
    pub min_stock_level: i32,
    pub reorder_level: i32,
    pub is_low_stock: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Critical,
    High,
    Medium,
}

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct LowStockAlert {
    pub product_id: Uuid,
    pub sku: String,
    pub product_name: String,
    pub current_stock: i64,
    pub min_stock_level: i32,
    pub reorder_level: i32,
    pub reorder_quantity: i64,
    pub severity: AlertSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExpirySeverity {
    Expired,
    Critical,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct ExpiryAlert {
    pub batch_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub batch_no: String,
    pub expiry_date: NaiveDate,
    pub days_to_expiry: i64,
    pub available_quantity: i32,
    pub value_at_risk: Decimal,
    pub severity: ExpirySeverity,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, utoipa::ToSchema)]
pub struct StockSummary {
    pub product_count: usize,
    pub batch_count: usize,
    pub total_units: i64,
    pub stock_value: Decimal,
    pub low_stock_count: usize,
    pub near_expiry_count: usize,
    pub expired_batch_count: usize,
}
