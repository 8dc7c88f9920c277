use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Income,
    Expense,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Asset => "ASSET",
            AccountType::Liability => "LIABILITY",
            AccountType::Equity => "EQUITY",
            AccountType::Income => "INCOME",
            AccountType::Expense => "EXPENSE",
        }
    }

    /// 借方残高が正となる勘定種別か。
    pub fn is_debit_normal(&self) -> bool {
        matches!(self, AccountType::Asset | AccountType::Expense)
    }

    /// 借方・貸方の合計から通常残高側を正とした残高を返す。
    pub fn signed_balance(&self, debit: Decimal, credit: Decimal) -> Decimal {
        if self.is_debit_normal() {
            debit - credit
        } else {
            credit - debit
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ASSET" => Ok(AccountType::Asset),
            "LIABILITY" => Ok(AccountType::Liability),
            "EQUITY" => Ok(AccountType::Equity),
            "INCOME" => Ok(AccountType::Income),
            "EXPENSE" => Ok(AccountType::Expense),
            other => Err(format!("invalid account type: {other}")),
        }
    }
}

/// LedgerAccount は勘定科目表の 1 科目。
#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct LedgerAccount {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub parent_code: Option<String>,
    pub is_system: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl LedgerAccount {
    pub fn new(code: &str, name: &str, account_type: AccountType, parent_code: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.to_string(),
            name: name.to_string(),
            account_type,
            parent_code,
            is_system: false,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

/// 勘定科目コードは 3〜10 桁の数字。
pub fn is_valid_account_code(code: &str) -> bool {
    (3..=10).contains(&code.len()) && code.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_signed_balance_follows_normal_side() {
        assert_eq!(AccountType::Asset.signed_balance(dec!(100), dec!(30)), dec!(70));
        assert_eq!(AccountType::Income.signed_balance(dec!(100), dec!(30)), dec!(-70));
        assert_eq!(AccountType::Liability.signed_balance(dec!(0), dec!(50)), dec!(50));
    }

    #[test]
    fn test_account_code_format() {
        assert!(is_valid_account_code("1000"));
        assert!(is_valid_account_code("101"));
        assert!(!is_valid_account_code("10"));
        assert!(!is_valid_account_code("10A0"));
        assert!(!is_valid_account_code("12345678901"));
    }
}
