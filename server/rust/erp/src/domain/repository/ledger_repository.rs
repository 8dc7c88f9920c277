use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;
use yeelo_outbox::OutboxMessage;

use crate::domain::entity::financial_report::{AccountMovement, AccountTotals};
use crate::domain::entity::journal_entry::{JournalEntry, SourceType};
use crate::domain::entity::ledger_account::LedgerAccount;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub source_type: Option<SourceType>,
    pub page: u32,
    pub page_size: u32,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    async fn list_accounts(&self) -> anyhow::Result<Vec<LedgerAccount>>;

    async fn find_account_by_id(&self, id: Uuid) -> anyhow::Result<Option<LedgerAccount>>;

    async fn find_account_by_code(&self, code: &str) -> anyhow::Result<Option<LedgerAccount>>;

    /// コードが既に存在する場合は false。
    async fn create_account(&self, account: &LedgerAccount) -> anyhow::Result<bool>;

    async fn post_entry(
        &self,
        entry: &JournalEntry,
        event: Option<OutboxMessage>,
    ) -> anyhow::Result<()>;

    async fn find_entry(&self, id: Uuid) -> anyhow::Result<Option<JournalEntry>>;

    async fn list_entries(&self, filter: &EntryFilter)
        -> anyhow::Result<(Vec<JournalEntry>, i64)>;

    /// `before` より前の日付の借方・貸方合計（期首残高の算出用）。
    async fn opening_totals(
        &self,
        account_id: Uuid,
        before: NaiveDate,
    ) -> anyhow::Result<(Decimal, Decimal)>;

    /// 期間内の明細を日付・起票順に返す。
    async fn account_movements(
        &self,
        account_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> anyhow::Result<Vec<AccountMovement>>;

    /// 全勘定の期間内の借方・貸方合計。期間外の勘定も 0 で含む。
    async fn account_totals(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> anyhow::Result<Vec<AccountTotals>>;
}
