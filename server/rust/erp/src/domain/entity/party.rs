//! 販売・仕入・在庫処理が参照するマスタの型付きスナップショット。

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// ProductSnapshot は `products` マスタの業務処理用ビュー。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductSnapshot {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub hsn_code: Option<String>,
    pub gst_rate: Decimal,
    pub selling_price: Decimal,
    pub mrp: Option<Decimal>,
    pub min_stock_level: i32,
    pub reorder_level: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerSnapshot {
    pub id: Uuid,
    pub name: String,
    pub gstin: Option<String>,
    pub state_code: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupplierSnapshot {
    pub id: Uuid,
    pub name: String,
    pub gstin: Option<String>,
    pub state_code: Option<String>,
    pub is_active: bool,
}

/// Company は自社情報。供給種別（州内・州間）の判定に使う。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Company {
    pub name: String,
    pub gstin: Option<String>,
    pub state_code: String,
}

/// 州コードを優先し、なければ GSTIN の先頭 2 桁を用いる。
pub fn effective_state_code<'a>(
    state_code: Option<&'a str>,
    gstin: Option<&'a str>,
) -> Option<&'a str> {
    state_code
        .filter(|s| !s.trim().is_empty())
        .or_else(|| gstin.filter(|g| g.len() >= 2).map(|g| &g[..2]))
}

impl CustomerSnapshot {
    pub fn state(&self) -> Option<&str> {
        effective_state_code(self.state_code.as_deref(), self.gstin.as_deref())
    }
}

impl SupplierSnapshot {
    pub fn state(&self) -> Option<&str> {
        effective_state_code(self.state_code.as_deref(), self.gstin.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_state_code_prefers_state() {
        assert_eq!(effective_state_code(Some("29"), Some("27AAPFU0939F1ZV")), Some("29"));
        assert_eq!(effective_state_code(None, Some("27AAPFU0939F1ZV")), Some("27"));
        assert_eq!(effective_state_code(Some(""), None), None);
    }
}
