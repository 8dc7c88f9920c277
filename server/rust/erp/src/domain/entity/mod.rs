pub mod change_log;
pub mod financial_report;
pub mod goods_receipt;
pub mod inventory_batch;
pub mod journal_entry;
pub mod ledger_account;
pub mod master_schema;
pub mod party;
pub mod sales_invoice;
pub mod stock_movement;
pub mod stock_report;
