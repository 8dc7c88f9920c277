//! 複式仕訳。
//!
//! `JournalEntry::new` は貸借一致を検証した仕訳のみを生成する。
//! 業務処理が自動起票する仕訳も手動仕訳も同じ検証を通る。

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_object::document_number::{self, JOURNAL_PREFIX};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    Manual,
    SalesInvoice,
    InvoiceCancellation,
    GoodsReceipt,
    StockAdjustment,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Manual => "MANUAL",
            SourceType::SalesInvoice => "SALES_INVOICE",
            SourceType::InvoiceCancellation => "INVOICE_CANCELLATION",
            SourceType::GoodsReceipt => "GOODS_RECEIPT",
            SourceType::StockAdjustment => "STOCK_ADJUSTMENT",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MANUAL" => Ok(SourceType::Manual),
            "SALES_INVOICE" => Ok(SourceType::SalesInvoice),
            "INVOICE_CANCELLATION" => Ok(SourceType::InvoiceCancellation),
            "GOODS_RECEIPT" => Ok(SourceType::GoodsReceipt),
            "STOCK_ADJUSTMENT" => Ok(SourceType::StockAdjustment),
            other => Err(format!("invalid source type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JournalError {
    #[error("journal entry needs at least two lines")]
    TooFewLines,
    #[error("line {0} must have exactly one positive side")]
    InvalidLine(usize),
    #[error("journal entry is not balanced: debit {debit}, credit {credit}")]
    Unbalanced { debit: Decimal, credit: Decimal },
    #[error("journal entry total must be greater than zero")]
    ZeroTotal,
    #[error("journal entry total is out of range")]
    AmountOutOfRange,
}

/// JournalLine は仕訳明細 1 行。借方・貸方のどちらか一方のみ正の値を持つ。
#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct JournalLine {
    pub account_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
    pub debit: Decimal,
    pub credit: Decimal,
    pub description: Option<String>,
}

impl JournalLine {
    pub fn debit(account_code: &str, amount: Decimal) -> Self {
        Self {
            account_code: account_code.to_string(),
            account_name: None,
            debit: amount,
            credit: Decimal::ZERO,
            description: None,
        }
    }

    pub fn credit(account_code: &str, amount: Decimal) -> Self {
        Self {
            account_code: account_code.to_string(),
            account_name: None,
            debit: Decimal::ZERO,
            credit: amount,
            description: None,
        }
    }

    #[must_use]
    pub fn describe(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    fn is_valid(&self) -> bool {
        let debit_side = self.debit > Decimal::ZERO && self.credit == Decimal::ZERO;
        let credit_side = self.credit > Decimal::ZERO && self.debit == Decimal::ZERO;
        debit_side || credit_side
    }
}

fn checked_total(mut amounts: impl Iterator<Item = Decimal>) -> Result<Decimal, JournalError> {
    amounts
        .try_fold(Decimal::ZERO, Decimal::checked_add)
        .ok_or(JournalError::AmountOutOfRange)
}

/// JournalEntry は貸借一致が保証された仕訳。
#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct JournalEntry {
    pub id: Uuid,
    pub entry_number: String,
    pub entry_date: NaiveDate,
    pub narration: String,
    pub source_type: SourceType,
    pub source_id: Option<Uuid>,
    pub lines: Vec<JournalLine>,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl JournalEntry {
    pub fn new(
        entry_date: NaiveDate,
        narration: &str,
        source_type: SourceType,
        source_id: Option<Uuid>,
        lines: Vec<JournalLine>,
        created_by: &str,
    ) -> Result<Self, JournalError> {
        if lines.len() < 2 {
            return Err(JournalError::TooFewLines);
        }
        if let Some(index) = lines.iter().position(|l| !l.is_valid()) {
            return Err(JournalError::InvalidLine(index));
        }
        let debit = checked_total(lines.iter().map(|l| l.debit))?;
        let credit = checked_total(lines.iter().map(|l| l.credit))?;
        if debit != credit {
            return Err(JournalError::Unbalanced { debit, credit });
        }
        if debit <= Decimal::ZERO {
            return Err(JournalError::ZeroTotal);
        }

        Ok(Self {
            id: Uuid::new_v4(),
            entry_number: document_number::generate(JOURNAL_PREFIX, entry_date),
            entry_date,
            narration: narration.to_string(),
            source_type,
            source_id,
            lines,
            total_debit: debit,
            total_credit: credit,
            created_by: created_by.to_string(),
            created_at: Utc::now(),
        })
    }

    /// 借方・貸方を入れ替えた逆仕訳を生成する。
    pub fn reversal(
        &self,
        entry_date: NaiveDate,
        narration: &str,
        source_type: SourceType,
        created_by: &str,
    ) -> Self {
        let lines = self
            .lines
            .iter()
            .map(|l| JournalLine {
                account_code: l.account_code.clone(),
                account_name: l.account_name.clone(),
                debit: l.credit,
                credit: l.debit,
                description: l.description.clone(),
            })
            .collect();
        Self {
            id: Uuid::new_v4(),
            entry_number: document_number::generate(JOURNAL_PREFIX, entry_date),
            entry_date,
            narration: narration.to_string(),
            source_type,
            source_id: self.source_id,
            lines,
            total_debit: self.total_credit,
            total_credit: self.total_debit,
            created_by: created_by.to_string(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 1).unwrap()
    }

    #[test]
    fn test_balanced_entry() {
        let entry = JournalEntry::new(
            today(),
            "capital",
            SourceType::Manual,
            None,
            vec![
                JournalLine::debit("1000", dec!(500)),
                JournalLine::credit("3000", dec!(500)),
            ],
            "admin@example.com",
        )
        .unwrap();
        assert_eq!(entry.total_debit, dec!(500));
        assert!(entry.entry_number.starts_with("JE-20240401-"));
    }

    #[test]
    fn test_rejects_invalid_entries() {
        let single = vec![JournalLine::debit("1000", dec!(1))];
        assert_eq!(
            JournalEntry::new(today(), "x", SourceType::Manual, None, single, "a").unwrap_err(),
            JournalError::TooFewLines
        );

        let mut both_sides = JournalLine::debit("1000", dec!(10));
        both_sides.credit = dec!(10);
        let lines = vec![both_sides, JournalLine::credit("3000", dec!(10))];
        assert_eq!(
            JournalEntry::new(today(), "x", SourceType::Manual, None, lines, "a").unwrap_err(),
            JournalError::InvalidLine(0)
        );

        let lines = vec![
            JournalLine::debit("1000", dec!(10)),
            JournalLine::credit("3000", dec!(9)),
        ];
        assert!(matches!(
            JournalEntry::new(today(), "x", SourceType::Manual, None, lines, "a"),
            Err(JournalError::Unbalanced { .. })
        ));

        let lines = vec![
            JournalLine::debit("1000", dec!(0)),
            JournalLine::credit("3000", dec!(0)),
        ];
        assert_eq!(
            JournalEntry::new(today(), "x", SourceType::Manual, None, lines, "a").unwrap_err(),
            JournalError::InvalidLine(0)
        );

        let lines = vec![
            JournalLine::debit("1000", Decimal::MAX),
            JournalLine::debit("1010", Decimal::MAX),
            JournalLine::credit("3000", dec!(1)),
        ];
        assert_eq!(
            JournalEntry::new(today(), "x", SourceType::Manual, None, lines, "a").unwrap_err(),
            JournalError::AmountOutOfRange
        );
    }

    #[test]
    fn test_reversal_swaps_sides() {
        let entry = JournalEntry::new(
            today(),
            "sale",
            SourceType::SalesInvoice,
            Some(Uuid::new_v4()),
            vec![
                JournalLine::debit("1000", dec!(112)),
                JournalLine::credit("4000", dec!(100)),
                JournalLine::credit("2110", dec!(6)),
                JournalLine::credit("2120", dec!(6)),
            ],
            "cashier",
        )
        .unwrap();
        let reversal = entry.reversal(today(), "cancel", SourceType::InvoiceCancellation, "manager");
        assert_eq!(reversal.source_id, entry.source_id);
        assert_eq!(reversal.lines[0].credit, dec!(112));
        assert_eq!(reversal.lines[1].debit, dec!(100));
        assert_eq!(reversal.total_debit, reversal.total_credit);
        assert_ne!(reversal.entry_number, entry.entry_number);
    }
}
