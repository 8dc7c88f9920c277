use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;
use yeelo_outbox::OutboxMessage;

use crate::domain::entity::goods_receipt::{GoodsReceipt, GrnStatus, QcStatus};
use crate::domain::entity::journal_entry::JournalEntry;
use crate::domain::entity::party::SupplierSnapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrnFilter {
    pub status: Option<GrnStatus>,
    pub supplier_id: Option<Uuid>,
    pub page: u32,
    pub page_size: u32,
}

/// GrnApproval は入荷承認の書き込み内容。
/// リポジトリは明細ごとにロットを (製品, ロット番号) で加重平均原価により upsert し、
/// PURCHASE_IN の在庫移動を記録する。
#[derive(Debug, Clone)]
pub struct GrnApproval {
    pub grn_id: Uuid,
    pub qc_status: QcStatus,
    pub approved_by: String,
    pub approved_at: DateTime<Utc>,
    pub journal: Option<JournalEntry>,
    pub event: OutboxMessage,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PurchaseRepository: Send + Sync {
    async fn find_supplier(&self, id: Uuid) -> anyhow::Result<Option<SupplierSnapshot>>;

    async fn create_grn(&self, grn: &GoodsReceipt) -> anyhow::Result<()>;

    async fn find_grn(&self, id: Uuid) -> anyhow::Result<Option<GoodsReceipt>>;

    async fn list_grns(&self, filter: &GrnFilter) -> anyhow::Result<(Vec<GoodsReceipt>, i64)>;

    /// PENDING の入荷のみ承認する。状態が変わっていた場合は false。
    async fn approve_grn(&self, approval: &GrnApproval) -> anyhow::Result<bool>;

    /// PENDING の入荷のみ却下する。状態が変わっていた場合は false。
    async fn reject_grn(&self, id: Uuid, reason: &str, actor: &str) -> anyhow::Result<bool>;

    /// 入荷日が期間内の承認済み入荷。
    async fn approved_grns_for_period(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> anyhow::Result<Vec<GoodsReceipt>>;
}
