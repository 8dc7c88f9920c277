//! FEFO（先に期限が来るものから出庫）によるロット引当。

use std::cmp::Ordering;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::domain::entity::inventory_batch::InventoryBatch;

#[derive(Debug, Clone, PartialEq)]
pub struct BatchAllocation {
    pub batch: InventoryBatch,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockShortage {
    pub requested: i32,
    pub available: i64,
}

/// 期限の早い順、期限なしは最後。同一期限は入庫の古い順。
fn fefo_order(a: &InventoryBatch, b: &InventoryBatch) -> Ordering {
    match (a.expiry_date, b.expiry_date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.created_at.cmp(&b.created_at))
    .then_with(|| a.batch_no.cmp(&b.batch_no))
}

/// 引当可能なロット（在庫あり・期限切れでない）を FEFO 順に並べる。
pub fn eligible_batches(batches: &[InventoryBatch], today: NaiveDate) -> Vec<&InventoryBatch> {
    let mut eligible: Vec<&InventoryBatch> = batches
        .iter()
        .filter(|b| b.available_quantity > 0 && !b.is_expired(today))
        .collect();
    eligible.sort_by(|a, b| fefo_order(a, b));
    eligible
}

/// 数量をロットに引き当てる。`pinned` 指定時はそのロットのみから引き当てる。
pub fn allocate(
    batches: &[InventoryBatch],
    quantity: i32,
    today: NaiveDate,
    pinned: Option<Uuid>,
) -> Result<Vec<BatchAllocation>, StockShortage> {
    let mut eligible = eligible_batches(batches, today);
    if let Some(batch_id) = pinned {
        eligible.retain(|b| b.id == batch_id);
    }

    let available: i64 = eligible
        .iter()
        .map(|b| i64::from(b.available_quantity))
        .sum();
    if available < i64::from(quantity) {
        return Err(StockShortage {
            requested: quantity,
            available,
        });
    }

    let mut remaining = quantity;
    let mut allocations = Vec::new();
    for batch in eligible {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(batch.available_quantity);
        allocations.push(BatchAllocation {
            batch: batch.clone(),
            quantity: take,
        });
        remaining -= take;
    }
    Ok(allocations)
}
