//! 会計帳票・GST 帳票の読み取りモデル。

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::entity::journal_entry::SourceType;
use crate::domain::entity::ledger_account::{AccountType, LedgerAccount};
use crate::domain::value_object::gst::{GstBreakdown, SupplyType};

/// AccountMovement は 1 勘定に対する仕訳明細 1 行（元帳の素材）。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountMovement {
    pub entry_id: Uuid,
    pub entry_number: String,
    pub entry_date: NaiveDate,
    pub narration: String,
    pub source_type: SourceType,
    pub debit: Decimal,
    pub credit: Decimal,
}

/// AccountTotals は期間内の勘定別借方・貸方合計。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountTotals {
    pub account_id: Uuid,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub debit: Decimal,
    pub credit: Decimal,
}

impl AccountTotals {
    pub fn balance(&self) -> Decimal {
        self.account_type.signed_balance(self.debit, self.credit)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct LedgerStatementLine {
    pub entry_id: Uuid,
    pub entry_number: String,
    pub entry_date: NaiveDate,
    pub narration: String,
    pub source_type: SourceType,
    pub debit: Decimal,
    pub credit: Decimal,
    pub balance: Decimal,
}

/// 勘定元帳。残高は勘定の通常残高側を正とする。
#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct LedgerStatement {
    pub account: LedgerAccount,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub opening_balance: Decimal,
    pub lines: Vec<LedgerStatementLine>,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
    pub closing_balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct TrialBalanceRow {
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub debit_balance: Decimal,
    pub credit_balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct TrialBalance {
    pub as_of: NaiveDate,
    pub rows: Vec<TrialBalanceRow>,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
    pub balanced: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct ReportLine {
    pub code: String,
    pub name: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct ProfitAndLoss {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub income: Vec<ReportLine>,
    pub expenses: Vec<ReportLine>,
    pub total_income: Decimal,
    pub total_expense: Decimal,
    pub net_profit: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct BalanceSheet {
    pub as_of: NaiveDate,
    pub assets: Vec<ReportLine>,
    pub liabilities: Vec<ReportLine>,
    /// 当期利益（収益 - 費用）を末尾に含む
    pub equity: Vec<ReportLine>,
    pub current_earnings: Decimal,
    pub total_assets: Decimal,
    pub total_liabilities: Decimal,
    pub total_equity: Decimal,
    pub balanced: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct GstSummary {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub output_tax: GstBreakdown,
    pub input_tax_credit: GstBreakdown,
    /// 税目ごとの出力税 - 仕入税額控除（負は控除超過）
    pub net: GstBreakdown,
    pub total_output: Decimal,
    pub total_input: Decimal,
    pub net_payable: Decimal,
    pub carry_forward_credit: Decimal,
    pub taxable_sales: Decimal,
    pub taxable_purchases: Decimal,
    pub invoice_count: usize,
    pub grn_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct Gstr1B2b {
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    pub customer_gstin: String,
    pub customer_name: String,
    pub place_of_supply: Option<String>,
    pub supply_type: SupplyType,
    pub invoice_value: Decimal,
    pub taxable_value: Decimal,
    pub cgst: Decimal,
    pub sgst: Decimal,
    pub igst: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct Gstr1B2cl {
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    pub place_of_supply: Option<String>,
    pub invoice_value: Decimal,
    pub taxable_value: Decimal,
    pub igst: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct Gstr1B2cs {
    pub place_of_supply: Option<String>,
    pub supply_type: SupplyType,
    pub gst_rate: Decimal,
    pub taxable_value: Decimal,
    pub cgst: Decimal,
    pub sgst: Decimal,
    pub igst: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct HsnSummaryRow {
    pub hsn_code: String,
    pub gst_rate: Decimal,
    pub quantity: i64,
    pub taxable_value: Decimal,
    pub cgst: Decimal,
    pub sgst: Decimal,
    pub igst: Decimal,
    pub total_value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct Gstr1Report {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub b2b: Vec<Gstr1B2b>,
    pub b2cl: Vec<Gstr1B2cl>,
    pub b2cs: Vec<Gstr1B2cs>,
    pub hsn_summary: Vec<HsnSummaryRow>,
    pub total_taxable_value: Decimal,
    pub total_tax: Decimal,
    pub invoice_count: usize,
}
