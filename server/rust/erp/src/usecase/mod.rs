pub mod event;
pub mod financial_reports;
pub mod manage_inventory;
pub mod manage_ledger;
pub mod manage_master_records;
pub mod receive_goods;
pub mod sales_invoices;

pub use event::EventFactory;
pub use financial_reports::FinancialReportsUseCase;
pub use manage_inventory::ManageInventoryUseCase;
pub use manage_ledger::ManageLedgerUseCase;
pub use manage_master_records::ManageMasterRecordsUseCase;
pub use receive_goods::ReceiveGoodsUseCase;
pub use sales_invoices::SalesInvoicesUseCase;

/// 一覧取得のページサイズ上限。
pub const MAX_PAGE_SIZE: u32 = 200;
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// ページ指定を検証する。範囲外なら説明文を返す。
pub fn page_window(page: Option<u32>, page_size: Option<u32>) -> Result<(u32, u32), String> {
    let page = page.unwrap_or(1);
    let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    if page == 0 {
        return Err("page must be at least 1".to_string());
    }
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(format!("page_size must be between 1 and {MAX_PAGE_SIZE}"));
    }
    Ok((page, page_size))
}

/// 業務日付（UTC 基準）。
pub fn today() -> chrono::NaiveDate {
    chrono::Utc::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_window() {
        assert_eq!(page_window(None, None), Ok((1, 20)));
        assert_eq!(page_window(Some(3), Some(200)), Ok((3, 200)));
        assert!(page_window(Some(0), None).is_err());
        assert!(page_window(None, Some(201)).is_err());
        assert!(page_window(None, Some(0)).is_err());
    }
}
