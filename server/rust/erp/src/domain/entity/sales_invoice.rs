use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_object::gst::{GstBreakdown, SupplyType};

/// 顧客未指定の店頭販売で用いる表示名。
pub const WALK_IN_CUSTOMER: &str = "Walk-in Customer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum InvoiceStatus {
    Completed,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Completed => "COMPLETED",
            InvoiceStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "COMPLETED" => Ok(InvoiceStatus::Completed),
            "CANCELLED" => Ok(InvoiceStatus::Cancelled),
            other => Err(format!("invalid invoice status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Card,
    Upi,
    BankTransfer,
    Credit,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "CASH",
            PaymentMethod::Card => "CARD",
            PaymentMethod::Upi => "UPI",
            PaymentMethod::BankTransfer => "BANK_TRANSFER",
            PaymentMethod::Credit => "CREDIT",
        }
    }

    /// 現金勘定に入る支払方法か。それ以外（CREDIT を除く）は銀行勘定に入る。
    pub fn settles_in_cash(&self) -> bool {
        matches!(self, PaymentMethod::Cash)
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CASH" => Ok(PaymentMethod::Cash),
            "CARD" => Ok(PaymentMethod::Card),
            "UPI" => Ok(PaymentMethod::Upi),
            "BANK_TRANSFER" => Ok(PaymentMethod::BankTransfer),
            "CREDIT" => Ok(PaymentMethod::Credit),
            other => Err(format!("invalid payment method: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Paid,
    Partial,
    Unpaid,
}

impl PaymentStatus {
    pub fn from_amounts(amount_paid: Decimal, grand_total: Decimal) -> Self {
        if amount_paid >= grand_total {
            PaymentStatus::Paid
        } else if amount_paid > Decimal::ZERO {
            PaymentStatus::Partial
        } else {
            PaymentStatus::Unpaid
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Partial => "PARTIAL",
            PaymentStatus::Unpaid => "UNPAID",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PAID" => Ok(PaymentStatus::Paid),
            "PARTIAL" => Ok(PaymentStatus::Partial),
            "UNPAID" => Ok(PaymentStatus::Unpaid),
            other => Err(format!("invalid payment status: {other}")),
        }
    }
}

/// InvoiceItem は請求明細 1 行。引当ロットごとに 1 行となる。
#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct InvoiceItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub sku: String,
    pub hsn_code: Option<String>,
    pub batch_id: Uuid,
    pub batch_no: String,
    pub expiry_date: Option<NaiveDate>,
    pub quantity: i32,
    pub unit_price: Decimal,
    /// 引当時点のロット原価。売上原価の計上に使う。
    pub unit_cost: Decimal,
    pub discount_percent: Decimal,
    pub discount_amount: Decimal,
    pub taxable_amount: Decimal,
    pub gst_rate: Decimal,
    pub cgst_amount: Decimal,
    pub sgst_amount: Decimal,
    pub igst_amount: Decimal,
    pub line_total: Decimal,
}

impl InvoiceItem {
    pub fn tax(&self) -> GstBreakdown {
        GstBreakdown {
            cgst: self.cgst_amount,
            sgst: self.sgst_amount,
            igst: self.igst_amount,
        }
    }

    pub fn cost_of_goods(&self) -> Decimal {
        crate::domain::value_object::gst::round_money(Decimal::from(self.quantity) * self.unit_cost)
    }
}

/// SalesInvoice は POS 販売伝票。
#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct SalesInvoice {
    pub id: Uuid,
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    pub customer_id: Option<Uuid>,
    pub customer_name: String,
    pub customer_gstin: Option<String>,
    pub place_of_supply: Option<String>,
    pub supply_type: SupplyType,
    pub items: Vec<InvoiceItem>,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub taxable_amount: Decimal,
    pub cgst_amount: Decimal,
    pub sgst_amount: Decimal,
    pub igst_amount: Decimal,
    pub total_tax: Decimal,
    pub grand_total: Decimal,
    pub amount_paid: Decimal,
    pub balance_due: Decimal,
    pub change_due: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub status: InvoiceStatus,
    pub cancellation_reason: Option<String>,
    pub notes: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SalesInvoice {
    pub fn tax(&self) -> GstBreakdown {
        GstBreakdown {
            cgst: self.cgst_amount,
            sgst: self.sgst_amount,
            igst: self.igst_amount,
        }
    }

    pub fn cost_of_goods(&self) -> Decimal {
        self.items.iter().map(InvoiceItem::cost_of_goods).sum()
    }
}
