//! 元帳・試算表・損益計算書・貸借対照表の組み立て。

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::domain::entity::financial_report::{
    AccountMovement, AccountTotals, BalanceSheet, LedgerStatement, LedgerStatementLine,
    ProfitAndLoss, ReportLine, TrialBalance, TrialBalanceRow,
};
use crate::domain::entity::ledger_account::{AccountType, LedgerAccount};

/// 期首残高（期首前の借方・貸方合計）と期間内の明細から勘定元帳を作る。
pub fn ledger_statement(
    account: LedgerAccount,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    opening: (Decimal, Decimal),
    movements: Vec<AccountMovement>,
) -> LedgerStatement {
    let account_type = account.account_type;
    let opening_balance = account_type.signed_balance(opening.0, opening.1);

    let mut balance = opening_balance;
    let mut total_debit = Decimal::ZERO;
    let mut total_credit = Decimal::ZERO;
    let lines = movements
        .into_iter()
        .map(|m| {
            balance += account_type.signed_balance(m.debit, m.credit);
            total_debit += m.debit;
            total_credit += m.credit;
            LedgerStatementLine {
                entry_id: m.entry_id,
                entry_number: m.entry_number,
                entry_date: m.entry_date,
                narration: m.narration,
                source_type: m.source_type,
                debit: m.debit,
                credit: m.credit,
                balance,
            }
        })
        .collect();

    LedgerStatement {
        account,
        from,
        to,
        opening_balance,
        lines,
        total_debit,
        total_credit,
        closing_balance: balance,
    }
}

pub fn trial_balance(as_of: NaiveDate, totals: &[AccountTotals]) -> TrialBalance {
    let rows: Vec<TrialBalanceRow> = totals
        .iter()
        .filter_map(|t| {
            let net = t.debit - t.credit;
            if net == Decimal::ZERO {
                return None;
            }
            Some(TrialBalanceRow {
                code: t.code.clone(),
                name: t.name.clone(),
                account_type: t.account_type,
                debit_balance: net.max(Decimal::ZERO),
                credit_balance: (-net).max(Decimal::ZERO),
            })
        })
        .collect();
    let total_debit: Decimal = rows.iter().map(|r| r.debit_balance).sum();
    let total_credit: Decimal = rows.iter().map(|r| r.credit_balance).sum();
    TrialBalance {
        as_of,
        rows,
        total_debit,
        total_credit,
        balanced: total_debit == total_credit,
    }
}

fn report_lines(totals: &[AccountTotals], account_type: AccountType) -> Vec<ReportLine> {
    totals
        .iter()
        .filter(|t| t.account_type == account_type)
        .map(|t| ReportLine {
            code: t.code.clone(),
            name: t.name.clone(),
            amount: t.balance(),
        })
        .filter(|l| l.amount != Decimal::ZERO)
        .collect()
}

fn sum(lines: &[ReportLine]) -> Decimal {
    lines.iter().map(|l| l.amount).sum()
}

/// `totals` は期間内（from..=to）の仕訳合計であること。
pub fn profit_and_loss(from: NaiveDate, to: NaiveDate, totals: &[AccountTotals]) -> ProfitAndLoss {
    let income = report_lines(totals, AccountType::Income);
    let expenses = report_lines(totals, AccountType::Expense);
    let total_income = sum(&income);
    let total_expense = sum(&expenses);
    ProfitAndLoss {
        from,
        to,
        income,
        expenses,
        total_income,
        total_expense,
        net_profit: total_income - total_expense,
    }
}

/// `totals` は as_of までの累計仕訳合計であること。収益 - 費用を当期利益として純資産に加える。
pub fn balance_sheet(as_of: NaiveDate, totals: &[AccountTotals]) -> BalanceSheet {
    let assets = report_lines(totals, AccountType::Asset);
    let liabilities = report_lines(totals, AccountType::Liability);
    let mut equity = report_lines(totals, AccountType::Equity);

    let current_earnings = sum(&report_lines(totals, AccountType::Income))
        - sum(&report_lines(totals, AccountType::Expense));
    if current_earnings != Decimal::ZERO {
        equity.push(ReportLine {
            code: String::new(),
            name: "Current Period Earnings".to_string(),
            amount: current_earnings,
        });
    }

    let total_assets = sum(&assets);
    let total_liabilities = sum(&liabilities);
    let total_equity = sum(&equity);
    BalanceSheet {
        as_of,
        assets,
        liabilities,
        equity,
        current_earnings,
        total_assets,
        total_liabilities,
        total_equity,
        balanced: total_assets == total_liabilities + total_equity,
    }
}
