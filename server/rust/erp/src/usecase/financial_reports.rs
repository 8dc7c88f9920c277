//! 会計帳票と GST 帳票。

use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::entity::financial_report::{
    BalanceSheet, GstSummary, Gstr1Report, LedgerStatement, ProfitAndLoss, TrialBalance,
};
use crate::domain::repository::{LedgerRepository, PurchaseRepository, SalesRepository};
use crate::domain::service::financial_reports;
use crate::domain::service::gst_reports;
use crate::domain::service::record_validator::{reason, FieldViolation};
use crate::usecase::manage_ledger::FinanceError;

fn invalid_range() -> FinanceError {
    FinanceError::Validation(vec![FieldViolation::new(
        "from",
        reason::INVALID_DATE,
        "from must not be after to",
    )])
}

/// 期間を確定する。to の既定は当日、from の既定は to の月初。
pub fn resolve_period(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<(NaiveDate, NaiveDate), FinanceError> {
    let to = to.unwrap_or_else(super::today);
    let from = from.unwrap_or_else(|| to.with_day(1).unwrap_or(to));
    if from > to {
        return Err(invalid_range());
    }
    Ok((from, to))
}

pub struct FinancialReportsUseCase {
    ledger: Arc<dyn LedgerRepository>,
    sales: Arc<dyn SalesRepository>,
    purchases: Arc<dyn PurchaseRepository>,
}

impl FinancialReportsUseCase {
    pub fn new(
        ledger: Arc<dyn LedgerRepository>,
        sales: Arc<dyn SalesRepository>,
        purchases: Arc<dyn PurchaseRepository>,
    ) -> Self {
        Self {
            ledger,
            sales,
            purchases,
        }
    }

    /// 勘定元帳。from 指定時は前日までの累計を期首残高とする。
    pub async fn account_ledger(
        &self,
        account_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<LedgerStatement, FinanceError> {
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(invalid_range());
            }
        }
        let account = self
            .ledger
            .find_account_by_id(account_id)
            .await
            .map_err(|e| FinanceError::Internal(e.to_string()))?
            .ok_or(FinanceError::AccountNotFound(account_id))?;
        let opening = match from {
            Some(from) => self
                .ledger
                .opening_totals(account_id, from)
                .await
                .map_err(|e| FinanceError::Internal(e.to_string()))?,
            None => (Decimal::ZERO, Decimal::ZERO),
        };
        let movements = self
            .ledger
            .account_movements(account_id, from, to)
            .await
            .map_err(|e| FinanceError::Internal(e.to_string()))?;
        Ok(financial_reports::ledger_statement(
            account, from, to, opening, movements,
        ))
    }

    pub async fn trial_balance(
        &self,
        as_of: Option<NaiveDate>,
    ) -> Result<TrialBalance, FinanceError> {
        let as_of = as_of.unwrap_or_else(super::today);
        let totals = self
            .ledger
            .account_totals(None, Some(as_of))
            .await
            .map_err(|e| FinanceError::Internal(e.to_string()))?;
        let report = financial_reports::trial_balance(as_of, &totals);
        if !report.balanced {
            tracing::error!(
                as_of = %as_of,
                debit = %report.total_debit,
                credit = %report.total_credit,
                "trial balance does not balance"
            );
        }
        Ok(report)
    }

    pub async fn profit_and_loss(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<ProfitAndLoss, FinanceError> {
        let (from, to) = resolve_period(from, to)?;
        let totals = self
            .ledger
            .account_totals(Some(from), Some(to))
            .await
            .map_err(|e| FinanceError::Internal(e.to_string()))?;
        Ok(financial_reports::profit_and_loss(from, to, &totals))
    }

    pub async fn balance_sheet(
        &self,
        as_of: Option<NaiveDate>,
    ) -> Result<BalanceSheet, FinanceError> {
        let as_of = as_of.unwrap_or_else(super::today);
        let totals = self
            .ledger
            .account_totals(None, Some(as_of))
            .await
            .map_err(|e| FinanceError::Internal(e.to_string()))?;
        Ok(financial_reports::balance_sheet(as_of, &totals))
    }

    pub async fn gst_summary(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<GstSummary, FinanceError> {
        let (from, to) = resolve_period(from, to)?;
        let invoices = self
            .sales
            .invoices_for_period(from, to)
            .await
            .map_err(|e| FinanceError::Internal(e.to_string()))?;
        let grns = self
            .purchases
            .approved_grns_for_period(from, to)
            .await
            .map_err(|e| FinanceError::Internal(e.to_string()))?;
        Ok(gst_reports::gst_summary(from, to, &invoices, &grns))
    }

    pub async fn gstr1(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Gstr1Report, FinanceError> {
        let (from, to) = resolve_period(from, to)?;
        let invoices = self
            .sales
            .invoices_for_period(from, to)
            .await
            .map_err(|e| FinanceError::Internal(e.to_string()))?;
        Ok(gst_reports::gstr1(from, to, &invoices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::financial_report::{AccountMovement, AccountTotals};
    use crate::domain::entity::journal_entry::SourceType;
    use crate::domain::entity::ledger_account::{AccountType, LedgerAccount};
    use crate::domain::repository::ledger_repository::MockLedgerRepository;
    use crate::domain::repository::purchase_repository::MockPurchaseRepository;
    use crate::domain::repository::sales_repository::MockSalesRepository;
    use rust_decimal_macros::dec;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn usecase(ledger: MockLedgerRepository) -> FinancialReportsUseCase {
        FinancialReportsUseCase::new(
            Arc::new(ledger),
            Arc::new(MockSalesRepository::new()),
            Arc::new(MockPurchaseRepository::new()),
        )
    }

    fn totals(code: &str, account_type: AccountType, debit: Decimal, credit: Decimal) -> AccountTotals {
        AccountTotals {
            account_id: Uuid::new_v4(),
            code: code.to_string(),
            name: code.to_string(),
            account_type,
            debit,
            credit,
        }
    }

    #[test]
    fn test_resolve_period_defaults_to_month_start() {
        assert_eq!(
            resolve_period(None, Some(date(4, 17))).unwrap(),
            (date(4, 1), date(4, 17))
        );
        assert!(resolve_period(Some(date(5, 1)), Some(date(4, 1))).is_err());
    }

    #[tokio::test]
    async fn test_account_ledger_uses_opening_totals() {
        let cash = LedgerAccount::new("1000", "Cash", AccountType::Asset, None);
        let id = cash.id;
        let mut ledger = MockLedgerRepository::new();
        ledger
            .expect_find_account_by_id()
            .returning(move |_| Ok(Some(cash.clone())));
        ledger
            .expect_opening_totals()
            .withf(move |account_id, before| *account_id == id && *before == date(4, 1))
            .returning(|_, _| Ok((dec!(500), dec!(200))));
        ledger.expect_account_movements().returning(|_, _, _| {
            Ok(vec![AccountMovement {
                entry_id: Uuid::new_v4(),
                entry_number: "JE-20240402-AAAAAAAA".to_string(),
                entry_date: date(4, 2),
                narration: "sale".to_string(),
                source_type: SourceType::SalesInvoice,
                debit: dec!(100),
                credit: Decimal::ZERO,
            }])
        });

        let statement = usecase(ledger)
            .account_ledger(id, Some(date(4, 1)), Some(date(4, 30)))
            .await
            .unwrap();
        assert_eq!(statement.opening_balance, dec!(300));
        assert_eq!(statement.closing_balance, dec!(400));
    }

    #[tokio::test]
    async fn test_account_ledger_not_found() {
        let mut ledger = MockLedgerRepository::new();
        ledger.expect_find_account_by_id().returning(|_| Ok(None));
        assert!(matches!(
            usecase(ledger).account_ledger(Uuid::new_v4(), None, None).await,
            Err(FinanceError::AccountNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_balance_sheet_reads_cumulative_totals() {
        let mut ledger = MockLedgerRepository::new();
        ledger
            .expect_account_totals()
            .withf(|from, to| from.is_none() && *to == Some(date(3, 31)))
            .returning(|_, _| {
                Ok(vec![
                    totals("1000", AccountType::Asset, dec!(1500), Decimal::ZERO),
                    totals("3000", AccountType::Equity, Decimal::ZERO, dec!(1000)),
                    totals("4000", AccountType::Income, Decimal::ZERO, dec!(500)),
                ])
            });

        let sheet = usecase(ledger).balance_sheet(Some(date(3, 31))).await.unwrap();
        assert_eq!(sheet.current_earnings, dec!(500));
        assert!(sheet.balanced);
    }

    #[tokio::test]
    async fn test_gst_summary_rejects_inverted_range() {
        let uc = usecase(MockLedgerRepository::new());
        assert!(matches!(
            uc.gst_summary(Some(date(5, 1)), Some(date(4, 1))).await,
            Err(FinanceError::Validation(_))
        ));
    }
}
