//! 業務伝票から自動仕訳を起票する規則。

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::domain::entity::goods_receipt::GoodsReceipt;
use crate::domain::entity::inventory_batch::InventoryBatch;
use crate::domain::entity::journal_entry::{JournalEntry, JournalError, JournalLine, SourceType};
use crate::domain::entity::ledger_account::AccountType;
use crate::domain::entity::sales_invoice::SalesInvoice;
use crate::domain::value_object::gst::{round_money, GstBreakdown};

/// システム勘定科目コード。
pub mod accounts {
    pub const CASH: &str = "1000";
    pub const BANK: &str = "1010";
    pub const ACCOUNTS_RECEIVABLE: &str = "1100";
    pub const INVENTORY: &str = "1200";
    pub const CGST_INPUT: &str = "1310";
    pub const SGST_INPUT: &str = "1320";
    pub const IGST_INPUT: &str = "1330";
    pub const ACCOUNTS_PAYABLE: &str = "2000";
    pub const CGST_OUTPUT: &str = "2110";
    pub const SGST_OUTPUT: &str = "2120";
    pub const IGST_OUTPUT: &str = "2130";
    pub const OWNERS_CAPITAL: &str = "3000";
    pub const RETAINED_EARNINGS: &str = "3100";
    pub const SALES: &str = "4000";
    pub const COST_OF_GOODS_SOLD: &str = "5000";
    pub const STOCK_ADJUSTMENTS: &str = "5100";
}

/// マイグレーションで投入されるシステム勘定（コード, 名称, 種別）。
pub const SYSTEM_ACCOUNTS: [(&str, &str, AccountType); 16] = [
    (accounts::CASH, "Cash", AccountType::Asset),
    (accounts::BANK, "Bank", AccountType::Asset),
    (accounts::ACCOUNTS_RECEIVABLE, "Accounts Receivable", AccountType::Asset),
    (accounts::INVENTORY, "Inventory", AccountType::Asset),
    (accounts::CGST_INPUT, "CGST Input", AccountType::Asset),
    (accounts::SGST_INPUT, "SGST Input", AccountType::Asset),
    (accounts::IGST_INPUT, "IGST Input", AccountType::Asset),
    (accounts::ACCOUNTS_PAYABLE, "Accounts Payable", AccountType::Liability),
    (accounts::CGST_OUTPUT, "CGST Output", AccountType::Liability),
    (accounts::SGST_OUTPUT, "SGST Output", AccountType::Liability),
    (accounts::IGST_OUTPUT, "IGST Output", AccountType::Liability),
    (accounts::OWNERS_CAPITAL, "Owner's Capital", AccountType::Equity),
    (accounts::RETAINED_EARNINGS, "Retained Earnings", AccountType::Equity),
    (accounts::SALES, "Sales", AccountType::Income),
    (accounts::COST_OF_GOODS_SOLD, "Cost of Goods Sold", AccountType::Expense),
    (accounts::STOCK_ADJUSTMENTS, "Stock Adjustments", AccountType::Expense),
];

/// 金額 0 の行を除いて仕訳を生成する。有効な行がなければ None。
fn build(
    entry_date: NaiveDate,
    narration: String,
    source_type: SourceType,
    source_id: uuid::Uuid,
    lines: Vec<JournalLine>,
    actor: &str,
) -> Result<Option<JournalEntry>, JournalError> {
    let lines: Vec<JournalLine> = lines
        .into_iter()
        .filter(|l| l.debit != Decimal::ZERO || l.credit != Decimal::ZERO)
        .collect();
    if lines.is_empty() {
        return Ok(None);
    }
    JournalEntry::new(
        entry_date,
        &narration,
        source_type,
        Some(source_id),
        lines,
        actor,
    )
    .map(Some)
}

fn tax_credit_lines(tax: GstBreakdown) -> Vec<JournalLine> {
    vec![
        JournalLine::credit(accounts::CGST_OUTPUT, tax.cgst),
        JournalLine::credit(accounts::SGST_OUTPUT, tax.sgst),
        JournalLine::credit(accounts::IGST_OUTPUT, tax.igst),
    ]
}

fn tax_debit_lines(tax: GstBreakdown) -> Vec<JournalLine> {
    vec![
        JournalLine::debit(accounts::CGST_INPUT, tax.cgst),
        JournalLine::debit(accounts::SGST_INPUT, tax.sgst),
        JournalLine::debit(accounts::IGST_INPUT, tax.igst),
    ]
}

/// 販売: 借方 現金/銀行（入金）+ 売掛金（残額）/ 貸方 売上 + 出力 GST、
/// 借方 売上原価 / 貸方 棚卸資産（ロット原価）。
pub fn sales_invoice_entry(
    invoice: &SalesInvoice,
    actor: &str,
) -> Result<Option<JournalEntry>, JournalError> {
    let settled = invoice.amount_paid - invoice.change_due;
    let receipt_account = if invoice.payment_method.settles_in_cash() {
        accounts::CASH
    } else {
        accounts::BANK
    };
    let cogs = invoice.cost_of_goods();

    let mut lines = vec![
        JournalLine::debit(receipt_account, settled),
        JournalLine::debit(accounts::ACCOUNTS_RECEIVABLE, invoice.balance_due),
        JournalLine::credit(accounts::SALES, invoice.taxable_amount),
    ];
    lines.extend(tax_credit_lines(invoice.tax()));
    lines.push(JournalLine::debit(accounts::COST_OF_GOODS_SOLD, cogs).describe("cost of goods sold"));
    lines.push(JournalLine::credit(accounts::INVENTORY, cogs).describe("cost of goods sold"));

    build(
        invoice.invoice_date,
        format!("Sales invoice {}", invoice.invoice_number),
        SourceType::SalesInvoice,
        invoice.id,
        lines,
        actor,
    )
}

/// 販売取消: 販売仕訳の逆仕訳。
pub fn invoice_cancellation_entry(
    invoice: &SalesInvoice,
    cancelled_on: NaiveDate,
    actor: &str,
) -> Result<Option<JournalEntry>, JournalError> {
    Ok(sales_invoice_entry(invoice, actor)?.map(|original| {
        original.reversal(
            cancelled_on,
            &format!("Cancellation of invoice {}", invoice.invoice_number),
            SourceType::InvoiceCancellation,
            actor,
        )
    }))
}

/// 入荷承認: 借方 棚卸資産（課税額）+ 入力 GST / 貸方 買掛金（総額）。
pub fn goods_receipt_entry(
    grn: &GoodsReceipt,
    entry_date: NaiveDate,
    actor: &str,
) -> Result<Option<JournalEntry>, JournalError> {
    let mut lines = vec![JournalLine::debit(accounts::INVENTORY, grn.taxable_amount)];
    lines.extend(tax_debit_lines(grn.tax()));
    lines.push(JournalLine::credit(accounts::ACCOUNTS_PAYABLE, grn.total_amount));
    build(
        entry_date,
        format!("Goods receipt {} from {}", grn.grn_number, grn.supplier_name),
        SourceType::GoodsReceipt,
        grn.id,
        lines,
        actor,
    )
}

/// 在庫調整: 増加は 借方 棚卸資産 / 貸方 在庫調整、減少はその逆。金額はロット原価。
pub fn stock_adjustment_entry(
    batch: &InventoryBatch,
    quantity_delta: i32,
    reason: &str,
    entry_date: NaiveDate,
    actor: &str,
) -> Result<Option<JournalEntry>, JournalError> {
    let value = round_money(Decimal::from(quantity_delta.unsigned_abs()) * batch.unit_cost);
    let lines = if quantity_delta > 0 {
        vec![
            JournalLine::debit(accounts::INVENTORY, value),
            JournalLine::credit(accounts::STOCK_ADJUSTMENTS, value),
        ]
    } else {
        vec![
            JournalLine::debit(accounts::STOCK_ADJUSTMENTS, value),
            JournalLine::credit(accounts::INVENTORY, value),
        ]
    };
    build(
        entry_date,
        format!("Stock adjustment {} ({reason})", batch.batch_no),
        SourceType::StockAdjustment,
        batch.id,
        lines,
        actor,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::goods_receipt::{GrnStatus, QcStatus};
    use crate::domain::entity::sales_invoice::{
        InvoiceItem, InvoiceStatus, PaymentMethod, PaymentStatus,
    };
    use crate::domain::value_object::gst::SupplyType;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()
    }

    fn item(qty: i32, cost: Decimal) -> InvoiceItem {
        InvoiceItem {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            product_name: "Arnica".to_string(),
            sku: "ARN".to_string(),
            hsn_code: None,
            batch_id: Uuid::new_v4(),
            batch_no: "B".to_string(),
            expiry_date: None,
            quantity: qty,
            unit_price: dec!(100),
            unit_cost: cost,
            discount_percent: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
            taxable_amount: dec!(200),
            gst_rate: dec!(12),
            cgst_amount: dec!(12),
            sgst_amount: dec!(12),
            igst_amount: Decimal::ZERO,
            line_total: dec!(224),
        }
    }

    fn invoice(method: PaymentMethod, paid: Decimal, balance: Decimal, change: Decimal) -> SalesInvoice {
        SalesInvoice {
            id: Uuid::new_v4(),
            invoice_number: "INV-20250201-ABCDEF12".to_string(),
            invoice_date: date(),
            customer_id: None,
            customer_name: "Walk-in Customer".to_string(),
            customer_gstin: None,
            place_of_supply: None,
            supply_type: SupplyType::IntraState,
            items: vec![item(2, dec!(60))],
            subtotal: dec!(200),
            discount_amount: Decimal::ZERO,
            taxable_amount: dec!(200),
            cgst_amount: dec!(12),
            sgst_amount: dec!(12),
            igst_amount: Decimal::ZERO,
            total_tax: dec!(24),
            grand_total: dec!(224),
            amount_paid: paid,
            balance_due: balance,
            change_due: change,
            payment_method: method,
            payment_status: PaymentStatus::from_amounts(paid, dec!(224)),
            status: InvoiceStatus::Completed,
            cancellation_reason: None,
            notes: None,
            created_by: "cashier".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn amount(entry: &JournalEntry, code: &str) -> (Decimal, Decimal) {
        entry
            .lines
            .iter()
            .filter(|l| l.account_code == code)
            .fold((Decimal::ZERO, Decimal::ZERO), |(d, c), l| (d + l.debit, c + l.credit))
    }

    #[test]
    fn test_cash_sale_with_change() {
        let inv = invoice(PaymentMethod::Cash, dec!(300), Decimal::ZERO, dec!(76));
        let entry = sales_invoice_entry(&inv, "cashier").unwrap().unwrap();

        assert_eq!(amount(&entry, accounts::CASH), (dec!(224), Decimal::ZERO));
        assert_eq!(amount(&entry, accounts::SALES), (Decimal::ZERO, dec!(200)));
        assert_eq!(amount(&entry, accounts::CGST_OUTPUT), (Decimal::ZERO, dec!(12)));
        assert_eq!(amount(&entry, accounts::COST_OF_GOODS_SOLD), (dec!(120), Decimal::ZERO));
        assert_eq!(amount(&entry, accounts::INVENTORY), (Decimal::ZERO, dec!(120)));
        assert!(entry.lines.iter().all(|l| l.account_code != accounts::IGST_OUTPUT));
        assert!(entry.lines.iter().all(|l| l.account_code != accounts::ACCOUNTS_RECEIVABLE));
        assert_eq!(entry.total_debit, dec!(344));
    }

    #[test]
    fn test_partial_card_sale_goes_to_bank_and_receivable() {
        let inv = invoice(PaymentMethod::Card, dec!(100), dec!(124), Decimal::ZERO);
        let entry = sales_invoice_entry(&inv, "cashier").unwrap().unwrap();
        assert_eq!(amount(&entry, accounts::BANK), (dec!(100), Decimal::ZERO));
        assert_eq!(amount(&entry, accounts::ACCOUNTS_RECEIVABLE), (dec!(124), Decimal::ZERO));
    }

    #[test]
    fn test_cancellation_reverses_sale() {
        let inv = invoice(PaymentMethod::Credit, Decimal::ZERO, dec!(224), Decimal::ZERO);
        let reversal = invoice_cancellation_entry(&inv, date(), "manager").unwrap().unwrap();
        assert_eq!(reversal.source_type, SourceType::InvoiceCancellation);
        assert_eq!(reversal.source_id, Some(inv.id));
        assert_eq!(amount(&reversal, accounts::ACCOUNTS_RECEIVABLE), (Decimal::ZERO, dec!(224)));
        assert_eq!(amount(&reversal, accounts::SALES), (dec!(200), Decimal::ZERO));
        assert_eq!(amount(&reversal, accounts::INVENTORY), (dec!(120), Decimal::ZERO));
    }

    #[test]
    fn test_goods_receipt_entry() {
        let grn = GoodsReceipt {
            id: Uuid::new_v4(),
            grn_number: "GRN-20250201-00000001".to_string(),
            supplier_id: Uuid::new_v4(),
            supplier_name: "SBL".to_string(),
            supplier_gstin: None,
            supplier_invoice_no: None,
            supplier_invoice_date: None,
            received_date: date(),
            supply_type: SupplyType::InterState,
            status: GrnStatus::Pending,
            qc_status: QcStatus::Pending,
            items: vec![],
            taxable_amount: dec!(1000),
            cgst_amount: Decimal::ZERO,
            sgst_amount: Decimal::ZERO,
            igst_amount: dec!(120),
            total_amount: dec!(1120),
            notes: None,
            rejection_reason: None,
            created_by: "store".to_string(),
            approved_by: None,
            approved_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let entry = goods_receipt_entry(&grn, date(), "manager").unwrap().unwrap();
        assert_eq!(entry.lines.len(), 3);
        assert_eq!(amount(&entry, accounts::INVENTORY), (dec!(1000), Decimal::ZERO));
        assert_eq!(amount(&entry, accounts::IGST_INPUT), (dec!(120), Decimal::ZERO));
        assert_eq!(amount(&entry, accounts::ACCOUNTS_PAYABLE), (Decimal::ZERO, dec!(1120)));
    }

    #[test]
    fn test_stock_adjustment_direction_and_zero_cost() {
        let mut batch = InventoryBatch {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            batch_no: "B7".to_string(),
            expiry_date: None,
            mfg_date: None,
            available_quantity: 10,
            unit_cost: dec!(12.5),
            mrp: None,
            selling_price: None,
            location: None,
            grn_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let loss = stock_adjustment_entry(&batch, -2, "DAMAGED", date(), "store").unwrap().unwrap();
        assert_eq!(amount(&loss, accounts::STOCK_ADJUSTMENTS), (dec!(25), Decimal::ZERO));
        assert_eq!(amount(&loss, accounts::INVENTORY), (Decimal::ZERO, dec!(25)));

        batch.unit_cost = Decimal::ZERO;
        assert!(stock_adjustment_entry(&batch, 3, "FOUND", date(), "store").unwrap().is_none());
    }
}
