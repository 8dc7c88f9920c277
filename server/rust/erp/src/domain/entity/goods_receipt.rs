use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::value_object::gst::{GstBreakdown, SupplyType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum GrnStatus {
    Pending,
    Approved,
    Rejected,
}

impl GrnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrnStatus::Pending => "PENDING",
            GrnStatus::Approved => "APPROVED",
            GrnStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for GrnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrnStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(GrnStatus::Pending),
            "APPROVED" => Ok(GrnStatus::Approved),
            "REJECTED" => Ok(GrnStatus::Rejected),
            other => Err(format!("invalid GRN status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum QcStatus {
    Pending,
    Passed,
    Partial,
    Failed,
}

impl QcStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QcStatus::Pending => "PENDING",
            QcStatus::Passed => "PASSED",
            QcStatus::Partial => "PARTIAL",
            QcStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for QcStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(QcStatus::Pending),
            "PASSED" => Ok(QcStatus::Passed),
            "PARTIAL" => Ok(QcStatus::Partial),
            "FAILED" => Ok(QcStatus::Failed),
            other => Err(format!("invalid QC status: {other}")),
        }
    }
}

/// GrnItem は入荷明細 1 行。受入数量 = 入荷数量 - 破損数量。
#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct GrnItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub batch_no: String,
    pub expiry_date: Option<NaiveDate>,
    pub mfg_date: Option<NaiveDate>,
    pub ordered_quantity: Option<i32>,
    pub received_quantity: i32,
    pub damaged_quantity: i32,
    pub accepted_quantity: i32,
    pub unit_cost: Decimal,
    pub mrp: Option<Decimal>,
    pub selling_price: Option<Decimal>,
    pub gst_rate: Decimal,
    pub taxable_amount: Decimal,
    pub cgst_amount: Decimal,
    pub sgst_amount: Decimal,
    pub igst_amount: Decimal,
    pub total_amount: Decimal,
}

impl GrnItem {
    pub fn tax(&self) -> GstBreakdown {
        GstBreakdown {
            cgst: self.cgst_amount,
            sgst: self.sgst_amount,
            igst: self.igst_amount,
        }
    }
}

/// GoodsReceipt は入荷伝票（GRN）。
#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct GoodsReceipt {
    pub id: Uuid,
    pub grn_number: String,
    pub supplier_id: Uuid,
    pub supplier_name: String,
    pub supplier_gstin: Option<String>,
    pub supplier_invoice_no: Option<String>,
    pub supplier_invoice_date: Option<NaiveDate>,
    pub received_date: NaiveDate,
    pub supply_type: SupplyType,
    pub status: GrnStatus,
    pub qc_status: QcStatus,
    pub items: Vec<GrnItem>,
    pub taxable_amount: Decimal,
    pub cgst_amount: Decimal,
    pub sgst_amount: Decimal,
    pub igst_amount: Decimal,
    pub total_amount: Decimal,
    pub notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_by: String,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GoodsReceipt {
    pub fn tax(&self) -> GstBreakdown {
        GstBreakdown {
            cgst: self.cgst_amount,
            sgst: self.sgst_amount,
            igst: self.igst_amount,
        }
    }

    /// 明細の破損状況から QC ステータスを判定する。
    pub fn assess_quality(&self) -> QcStatus {
        let received: i64 = self.items.iter().map(|i| i64::from(i.received_quantity)).sum();
        let damaged: i64 = self.items.iter().map(|i| i64::from(i.damaged_quantity)).sum();
        if damaged == 0 {
            QcStatus::Passed
        } else if damaged >= received {
            QcStatus::Failed
        } else {
            QcStatus::Partial
        }
    }
}
