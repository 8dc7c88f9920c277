//! 在庫一覧・欠品アラート・期限アラート・在庫サマリの集計。

use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::entity::inventory_batch::InventoryBatch;
use crate::domain::entity::party::ProductSnapshot;
use crate::domain::entity::stock_report::{
    AlertSeverity, ExpiryAlert, ExpirySeverity, LowStockAlert, StockLevel, StockSummary,
};
use crate::domain::value_object::gst::round_money;

/// 期限切れ間近の判定日数。
pub const CRITICAL_EXPIRY_DAYS: i64 = 7;
pub const WARNING_EXPIRY_DAYS: i64 = 30;

/// 製品ごとの在庫水準を集計する。`include_zero` が false の場合は在庫 0 の製品を除く。
pub fn stock_levels(
    products: &[ProductSnapshot],
    batches: &[InventoryBatch],
    include_zero: bool,
) -> Vec<StockLevel> {
    let mut by_product: HashMap<Uuid, Vec<&InventoryBatch>> = HashMap::new();
    for batch in batches.iter().filter(|b| b.available_quantity > 0) {
        by_product.entry(batch.product_id).or_default().push(batch);
    }

    let mut levels: Vec<StockLevel> = products
        .iter()
        .map(|product| {
            let stocked = by_product.get(&product.id).map_or(&[][..], Vec::as_slice);
            let total_available: i64 = stocked
                .iter()
                .map(|b| i64::from(b.available_quantity))
                .sum();
            let stock_value = round_money(stocked.iter().map(|b| b.stock_value()).sum());
            StockLevel {
                product_id: product.id,
                sku: product.sku.clone(),
                product_name: product.name.clone(),
                total_available,
                batch_count: stocked.len(),
                stock_value,
                nearest_expiry: stocked.iter().filter_map(|b| b.expiry_date).min(),
                min_stock_level: product.min_stock_level,
                reorder_level: product.reorder_level,
                is_low_stock: product.min_stock_level > 0
                    && total_available < i64::from(product.min_stock_level),
            }
        })
        .filter(|level| include_zero || level.total_available > 0)
        .collect();
    levels.sort_by(|a, b| a.product_name.cmp(&b.product_name));
    levels
}

fn low_stock_severity(stock: i64, min: i64) -> AlertSeverity {
    if stock == 0 || stock * 100 < min * 30 {
        AlertSeverity::Critical
    } else if stock * 100 < min * 60 {
        AlertSeverity::High
    } else {
        AlertSeverity::Medium
    }
}

/// 最小在庫を下回る製品のアラート。重大度の高い順に並ぶ。
pub fn low_stock_alerts(levels: &[StockLevel]) -> Vec<LowStockAlert> {
    let mut alerts: Vec<LowStockAlert> = levels
        .iter()
        .filter(|l| l.is_low_stock)
        .map(|l| {
            let min = i64::from(l.min_stock_level);
            let target = i64::from(l.reorder_level).max(min);
            LowStockAlert {
                product_id: l.product_id,
                sku: l.sku.clone(),
                product_name: l.product_name.clone(),
                current_stock: l.total_available,
                min_stock_level: l.min_stock_level,
                reorder_level: l.reorder_level,
                reorder_quantity: (target - l.total_available).max(0),
                severity: low_stock_severity(l.total_available, min),
            }
        })
        .collect();
    alerts.sort_by(|a, b| {
        a.severity
            .cmp(&b.severity)
            .then_with(|| a.current_stock.cmp(&b.current_stock))
            .then_with(|| a.product_name.cmp(&b.product_name))
    });
    alerts
}

fn expiry_severity(days_to_expiry: i64) -> ExpirySeverity {
    if days_to_expiry < 0 {
        ExpirySeverity::Expired
    } else if days_to_expiry <= CRITICAL_EXPIRY_DAYS {
        ExpirySeverity::Critical
    } else if days_to_expiry <= WARNING_EXPIRY_DAYS {
        ExpirySeverity::Warning
    } else {
        ExpirySeverity::Info
    }
}

/// 在庫のあるロットのうち、期限が `today + days` 以内のもの。期限の早い順。
pub fn expiry_alerts(
    products: &[ProductSnapshot],
    batches: &[InventoryBatch],
    today: NaiveDate,
    days: i64,
) -> Vec<ExpiryAlert> {
    let names: HashMap<Uuid, &str> = products.iter().map(|p| (p.id, p.name.as_str())).collect();
    let horizon = today + Duration::days(days);

    let mut alerts: Vec<ExpiryAlert> = batches
        .iter()
        .filter(|b| b.available_quantity > 0)
        .filter_map(|b| {
            let expiry = b.expiry_date.filter(|d| *d <= horizon)?;
            let days_to_expiry = (expiry - today).num_days();
            Some(ExpiryAlert {
                batch_id: b.id,
                product_id: b.product_id,
                product_name: names.get(&b.product_id).copied().unwrap_or_default().to_string(),
                batch_no: b.batch_no.clone(),
                expiry_date: expiry,
                days_to_expiry,
                available_quantity: b.available_quantity,
                value_at_risk: round_money(b.stock_value()),
                severity: expiry_severity(days_to_expiry),
            })
        })
        .collect();
    alerts.sort_by(|a, b| {
        a.expiry_date
            .cmp(&b.expiry_date)
            .then_with(|| a.batch_no.cmp(&b.batch_no))
    });
    alerts
}

pub fn summary(
    products: &[ProductSnapshot],
    batches: &[InventoryBatch],
    today: NaiveDate,
    near_expiry_days: i64,
) -> StockSummary {
    let levels = stock_levels(products, batches, false);
    let stocked: Vec<&InventoryBatch> = batches.iter().filter(|b| b.available_quantity > 0).collect();
    let horizon = today + Duration::days(near_expiry_days);

    StockSummary {
        product_count: levels.len(),
        batch_count: stocked.len(),
        total_units: stocked.iter().map(|b| i64::from(b.available_quantity)).sum(),
        stock_value: round_money(stocked.iter().map(|b| b.stock_value()).sum::<Decimal>()),
        low_stock_count: stock_levels(products, batches, true)
            .iter()
            .filter(|l| l.is_low_stock)
            .count(),
        near_expiry_count: stocked
            .iter()
            .filter(|b| b.expiry_date.is_some_and(|d| d >= today && d <= horizon))
            .count(),
        expired_batch_count: stocked.iter().filter(|b| b.is_expired(today)).count(),
    }
}
