//! GST（物品サービス税）の計算。
//!
//! 州内取引は税額を CGST と SGST に折半し、州間取引は IGST を課す。
//! 金額はすべて `Decimal` で扱い、行単位で小数第 2 位に丸める。

use std::fmt;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// 許容される GST 税率（%）。
pub const GST_RATES: [u32; 5] = [0, 5, 12, 18, 28];

/// 金額を小数第 2 位に四捨五入（0.5 は絶対値の大きい側）する。
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// 金額として受け付ける上限。金額列 NUMERIC(14,2) の最大値。
pub fn max_amount() -> Decimal {
    Decimal::new(99_999_999_999_999, 2)
}

pub fn exceeds_max_amount(value: Decimal) -> bool {
    value > max_amount()
}

/// 数量 × 単価を丸めた行金額。[`max_amount`] を超える場合は None。
pub fn line_amount(quantity: i32, unit: Decimal) -> Option<Decimal> {
    Decimal::from(quantity)
        .checked_mul(unit)
        .map(round_money)
        .filter(|amount| !exceeds_max_amount(*amount))
}

pub fn is_valid_rate(rate: Decimal) -> bool {
    GST_RATES.iter().any(|r| Decimal::from(*r) == rate)
}

/// SupplyType は供給の種別（州内・州間）を表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SupplyType {
    IntraState,
    InterState,
}

impl SupplyType {
    /// 自社の州コードと相手方の州コードから供給種別を決定する。
    /// 相手方の州が不明な場合（店頭の一般顧客など）は州内とみなす。
    pub fn determine(company_state: &str, counterparty_state: Option<&str>) -> Self {
        match counterparty_state.map(str::trim).filter(|s| !s.is_empty()) {
            Some(state) if state != company_state.trim() => SupplyType::InterState,
            _ => SupplyType::IntraState,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SupplyType::IntraState => "INTRA_STATE",
            SupplyType::InterState => "INTER_STATE",
        }
    }
}

impl fmt::Display for SupplyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SupplyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INTRA_STATE" => Ok(SupplyType::IntraState),
            "INTER_STATE" => Ok(SupplyType::InterState),
            other => Err(format!("invalid supply type: {other}")),
        }
    }
}

/// GstBreakdown は税目ごとの税額。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct GstBreakdown {
    pub cgst: Decimal,
    pub sgst: Decimal,
    pub igst: Decimal,
}

impl GstBreakdown {
    /// 課税標準額と税率から税額を計算する。
    /// 州内取引では端数調整分を SGST に寄せ、CGST + SGST が税額と一致するようにする。
    pub fn compute(taxable: Decimal, rate_percent: Decimal, supply_type: SupplyType) -> Self {
        Self::split(round_money(taxable * rate_percent / Decimal::ONE_HUNDRED), supply_type)
    }

    /// [`GstBreakdown::compute`] の桁あふれ検査版。
    pub fn try_compute(taxable: Decimal, rate_percent: Decimal, supply_type: SupplyType) -> Option<Self> {
        let tax = round_money(taxable.checked_mul(rate_percent)? / Decimal::ONE_HUNDRED);
        Some(Self::split(tax, supply_type))
    }

    fn split(tax: Decimal, supply_type: SupplyType) -> Self {
        match supply_type {
            SupplyType::IntraState => {
                let cgst = round_money(tax / Decimal::TWO);
                Self {
                    cgst,
                    sgst: tax - cgst,
                    igst: Decimal::ZERO,
                }
            }
            SupplyType::InterState => Self {
                cgst: Decimal::ZERO,
                sgst: Decimal::ZERO,
                igst: tax,
            },
        }
    }

    pub fn total(&self) -> Decimal {
        self.cgst + self.sgst + self.igst
    }

    #[must_use]
    pub fn add(self, other: GstBreakdown) -> Self {
        Self {
            cgst: self.cgst + other.cgst,
            sgst: self.sgst + other.sgst,
            igst: self.igst + other.igst,
        }
    }
}
