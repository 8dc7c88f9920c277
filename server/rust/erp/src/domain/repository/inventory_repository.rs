use async_trait::async_trait;
use uuid::Uuid;
use yeelo_outbox::OutboxMessage;

use crate::domain::entity::inventory_batch::InventoryBatch;
use crate::domain::entity::journal_entry::JournalEntry;
use crate::domain::entity::party::ProductSnapshot;
use crate::domain::entity::stock_movement::StockMovement;

/// StockAdjustment は在庫調整 1 件の書き込み内容。
/// `expected_quantity` は読み取り時点の在庫数で、更新時に一致しなければ競合とする。
#[derive(Debug, Clone)]
pub struct StockAdjustment {
    pub batch_id: Uuid,
    pub expected_quantity: i32,
    pub quantity_delta: i32,
    pub movement: StockMovement,
    pub journal: Option<JournalEntry>,
    pub event: OutboxMessage,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdjustmentOutcome {
    Applied(InventoryBatch),
    StockChanged,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovementFilter {
    pub batch_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub limit: u32,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InventoryRepository: Send + Sync {
    async fn find_product(&self, id: Uuid) -> anyhow::Result<Option<ProductSnapshot>>;

    async fn find_products(&self, ids: Vec<Uuid>) -> anyhow::Result<Vec<ProductSnapshot>>;

    /// 有効な製品を名称・SKU で絞り込んで返す。
    async fn list_products(&self, search: Option<String>) -> anyhow::Result<Vec<ProductSnapshot>>;

    async fn find_batch(&self, id: Uuid) -> anyhow::Result<Option<InventoryBatch>>;

    /// 在庫 0 のロットも含めて返す。
    async fn list_batches(&self, product_id: Option<Uuid>) -> anyhow::Result<Vec<InventoryBatch>>;

    /// 在庫数の更新・移動履歴・仕訳・イベントを 1 トランザクションで書き込む。
    async fn apply_adjustment(
        &self,
        adjustment: &StockAdjustment,
    ) -> anyhow::Result<AdjustmentOutcome>;

    /// 新しい順に返す。
    async fn list_movements(&self, filter: &MovementFilter) -> anyhow::Result<Vec<StockMovement>>;
}
