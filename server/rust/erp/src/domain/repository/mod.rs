pub mod inventory_repository;
pub mod ledger_repository;
pub mod master_record_repository;
pub mod purchase_repository;
pub mod sales_repository;

pub use inventory_repository::InventoryRepository;
pub use ledger_repository::LedgerRepository;
pub use master_record_repository::MasterRecordRepository;
pub use purchase_repository::PurchaseRepository;
pub use sales_repository::SalesRepository;

/// ConstraintViolation はリポジトリ実装が DB 制約違反を識別して返すエラー。
/// ユースケースは `anyhow::Error::downcast_ref` で判別し、409 に変換する。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConstraintViolation {
    #[error("unique constraint violated: {0}")]
    Unique(String),
    #[error("foreign key constraint violated: {0}")]
    ForeignKey(String),
}

/// ページ番号（1 始まり）とページサイズからオフセットを求める。
pub fn offset(page: u32, page_size: u32) -> i64 {
    i64::from(page.saturating_sub(1)) * i64::from(page_size)
}
