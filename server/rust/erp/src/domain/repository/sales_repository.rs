use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;
use yeelo_outbox::OutboxMessage;

use crate::domain::entity::journal_entry::JournalEntry;
use crate::domain::entity::party::CustomerSnapshot;
use crate::domain::entity::sales_invoice::{InvoiceStatus, SalesInvoice};
use crate::domain::entity::stock_movement::StockMovement;

/// InvoicePosting は販売 1 件の書き込み内容。
/// リポジトリは明細ごとに `available_quantity >= quantity` を条件にロット在庫を減らし、
/// 1 行でも条件を満たさなければ全体をロールバックする。
#[derive(Debug, Clone)]
pub struct InvoicePosting {
    pub invoice: SalesInvoice,
    pub movements: Vec<StockMovement>,
    pub journal: Option<JournalEntry>,
    pub events: Vec<OutboxMessage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostingOutcome {
    Posted,
    StockChanged,
}

/// InvoiceCancellation は販売取消の書き込み内容。
#[derive(Debug, Clone)]
pub struct InvoiceCancellation {
    pub invoice_id: Uuid,
    pub reason: String,
    pub cancelled_by: String,
    pub movements: Vec<StockMovement>,
    pub journal: Option<JournalEntry>,
    pub event: OutboxMessage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub status: Option<InvoiceStatus>,
    pub customer_id: Option<Uuid>,
    /// 伝票番号・顧客名の部分一致
    pub search: Option<String>,
    pub page: u32,
    pub page_size: u32,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SalesRepository: Send + Sync {
    async fn find_customer(&self, id: Uuid) -> anyhow::Result<Option<CustomerSnapshot>>;

    async fn create_invoice(&self, posting: &InvoicePosting) -> anyhow::Result<PostingOutcome>;

    async fn find_invoice(&self, id: Uuid) -> anyhow::Result<Option<SalesInvoice>>;

    async fn list_invoices(
        &self,
        filter: &InvoiceFilter,
    ) -> anyhow::Result<(Vec<SalesInvoice>, i64)>;

    /// COMPLETED の伝票のみ取消し、ロット在庫を戻す。状態が変わっていた場合は false。
    async fn cancel_invoice(&self, cancellation: &InvoiceCancellation) -> anyhow::Result<bool>;

    /// 伝票日付が期間内の伝票（取消を含む）。
    async fn invoices_for_period(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> anyhow::Result<Vec<SalesInvoice>>;
}
