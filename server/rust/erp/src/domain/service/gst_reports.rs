//! GST 集計と GSTR-1（販売明細申告）の区分け。

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::domain::entity::financial_report::{
    Gstr1B2b, Gstr1B2cl, Gstr1B2cs, Gstr1Report, GstSummary, HsnSummaryRow,
};
use crate::domain::entity::goods_receipt::{GoodsReceipt, GrnStatus};
use crate::domain::entity::sales_invoice::{InvoiceStatus, SalesInvoice};
use crate::domain::value_object::gst::{GstBreakdown, SupplyType};

/// B2C 大口（B2CL）とする州間取引の請求額の下限（₹2,50,000 超）。
pub fn b2cl_threshold() -> Decimal {
    Decimal::from(250_000)
}

const UNCLASSIFIED_HSN: &str = "UNCLASSIFIED";

fn net(output: GstBreakdown, input: GstBreakdown) -> GstBreakdown {
    GstBreakdown {
        cgst: output.cgst - input.cgst,
        sgst: output.sgst - input.sgst,
        igst: output.igst - input.igst,
    }
}

/// 期間内の出力税（取消以外の販売）と仕入税額控除（承認済み入荷）を集計する。
pub fn gst_summary(
    from: NaiveDate,
    to: NaiveDate,
    invoices: &[SalesInvoice],
    grns: &[GoodsReceipt],
) -> GstSummary {
    let invoices: Vec<&SalesInvoice> = invoices
        .iter()
        .filter(|i| i.status != InvoiceStatus::Cancelled)
        .collect();
    let grns: Vec<&GoodsReceipt> = grns
        .iter()
        .filter(|g| g.status == GrnStatus::Approved)
        .collect();

    let output_tax = invoices
        .iter()
        .fold(GstBreakdown::default(), |acc, i| acc.add(i.tax()));
    let input_tax_credit = grns
        .iter()
        .fold(GstBreakdown::default(), |acc, g| acc.add(g.tax()));
    let total_output = output_tax.total();
    let total_input = input_tax_credit.total();
    let balance = total_output - total_input;

    GstSummary {
        from,
        to,
        output_tax,
        input_tax_credit,
        net: net(output_tax, input_tax_credit),
        total_output,
        total_input,
        net_payable: balance.max(Decimal::ZERO),
        carry_forward_credit: (-balance).max(Decimal::ZERO),
        taxable_sales: invoices.iter().map(|i| i.taxable_amount).sum(),
        taxable_purchases: grns.iter().map(|g| g.taxable_amount).sum(),
        invoice_count: invoices.len(),
        grn_count: grns.len(),
    }
}

pub fn gstr1(from: NaiveDate, to: NaiveDate, invoices: &[SalesInvoice]) -> Gstr1Report {
    let invoices: Vec<&SalesInvoice> = invoices
        .iter()
        .filter(|i| i.status != InvoiceStatus::Cancelled)
        .collect();

    let mut b2b = Vec::new();
    let mut b2cl = Vec::new();
    let mut b2cs: BTreeMap<(Option<String>, &'static str, Decimal), Gstr1B2cs> = BTreeMap::new();
    let mut hsn: BTreeMap<(String, Decimal), HsnSummaryRow> = BTreeMap::new();

    for invoice in &invoices {
        let gstin = invoice
            .customer_gstin
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty());

        if let Some(gstin) = gstin {
            b2b.push(Gstr1B2b {
                invoice_number: invoice.invoice_number.clone(),
                invoice_date: invoice.invoice_date,
                customer_gstin: gstin.to_string(),
                customer_name: invoice.customer_name.clone(),
                place_of_supply: invoice.place_of_supply.clone(),
                supply_type: invoice.supply_type,
                invoice_value: invoice.grand_total,
                taxable_value: invoice.taxable_amount,
                cgst: invoice.cgst_amount,
                sgst: invoice.sgst_amount,
                igst: invoice.igst_amount,
            });
        } else if invoice.supply_type == SupplyType::InterState
            && invoice.grand_total > b2cl_threshold()
        {
            b2cl.push(Gstr1B2cl {
                invoice_number: invoice.invoice_number.clone(),
                invoice_date: invoice.invoice_date,
                place_of_supply: invoice.place_of_supply.clone(),
                invoice_value: invoice.grand_total,
                taxable_value: invoice.taxable_amount,
                igst: invoice.igst_amount,
            });
        } else {
            for item in &invoice.items {
                let key = (
                    invoice.place_of_supply.clone(),
                    invoice.supply_type.as_str(),
                    item.gst_rate,
                );
                let row = b2cs.entry(key).or_insert_with(|| Gstr1B2cs {
                    place_of_supply: invoice.place_of_supply.clone(),
                    supply_type: invoice.supply_type,
                    gst_rate: item.gst_rate,
                    taxable_value: Decimal::ZERO,
                    cgst: Decimal::ZERO,
                    sgst: Decimal::ZERO,
                    igst: Decimal::ZERO,
                });
                row.taxable_value += item.taxable_amount;
                row.cgst += item.cgst_amount;
                row.sgst += item.sgst_amount;
                row.igst += item.igst_amount;
            }
        }

        for item in &invoice.items {
            let code = item
                .hsn_code
                .clone()
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| UNCLASSIFIED_HSN.to_string());
            let row = hsn
                .entry((code.clone(), item.gst_rate))
                .or_insert_with(|| HsnSummaryRow {
                    hsn_code: code,
                    gst_rate: item.gst_rate,
                    quantity: 0,
                    taxable_value: Decimal::ZERO,
                    cgst: Decimal::ZERO,
                    sgst: Decimal::ZERO,
                    igst: Decimal::ZERO,
                    total_value: Decimal::ZERO,
                });
            row.quantity += i64::from(item.quantity);
            row.taxable_value += item.taxable_amount;
            row.cgst += item.cgst_amount;
            row.sgst += item.sgst_amount;
            row.igst += item.igst_amount;
            row.total_value += item.line_total;
        }
    }

    Gstr1Report {
        from,
        to,
        b2b,
        b2cl,
        b2cs: b2cs.into_values().collect(),
        hsn_summary: hsn.into_values().collect(),
        total_taxable_value: invoices.iter().map(|i| i.taxable_amount).sum(),
        total_tax: invoices.iter().map(|i| i.total_tax).sum(),
        invoice_count: invoices.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::goods_receipt::QcStatus;
    use crate::domain::entity::sales_invoice::{InvoiceItem, PaymentMethod, PaymentStatus};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 15).unwrap()
    }

    fn invoice(
        gstin: Option<&str>,
        supply_type: SupplyType,
        taxable: Decimal,
        hsn: Option<&str>,
        status: InvoiceStatus,
    ) -> SalesInvoice {
        let tax = GstBreakdown::compute(taxable, dec!(12), supply_type);
        let item = InvoiceItem {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            product_name: "P".to_string(),
            sku: "P".to_string(),
            hsn_code: hsn.map(str::to_string),
            batch_id: Uuid::new_v4(),
            batch_no: "B".to_string(),
            expiry_date: None,
            quantity: 2,
            unit_price: taxable / dec!(2),
            unit_cost: dec!(1),
            discount_percent: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
            taxable_amount: taxable,
            gst_rate: dec!(12),
            cgst_amount: tax.cgst,
            sgst_amount: tax.sgst,
            igst_amount: tax.igst,
            line_total: taxable + tax.total(),
        };
        SalesInvoice {
            id: Uuid::new_v4(),
            invoice_number: format!("INV-{taxable}"),
            invoice_date: date(),
            customer_id: None,
            customer_name: "C".to_string(),
            customer_gstin: gstin.map(str::to_string),
            place_of_supply: Some(if supply_type == SupplyType::InterState { "29" } else { "27" }.to_string()),
            supply_type,
            items: vec![item],
            subtotal: taxable,
            discount_amount: Decimal::ZERO,
            taxable_amount: taxable,
            cgst_amount: tax.cgst,
            sgst_amount: tax.sgst,
            igst_amount: tax.igst,
            total_tax: tax.total(),
            grand_total: taxable + tax.total(),
            amount_paid: taxable + tax.total(),
            balance_due: Decimal::ZERO,
            change_due: Decimal::ZERO,
            payment_method: PaymentMethod::Cash,
            payment_status: PaymentStatus::Paid,
            status,
            cancellation_reason: None,
            notes: None,
            created_by: "u".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn grn(status: GrnStatus, cgst: Decimal) -> GoodsReceipt {
        GoodsReceipt {
            id: Uuid::new_v4(),
            grn_number: "GRN".to_string(),
            supplier_id: Uuid::new_v4(),
            supplier_name: "S".to_string(),
            supplier_gstin: None,
            supplier_invoice_no: None,
            supplier_invoice_date: None,
            received_date: date(),
            supply_type: SupplyType::IntraState,
            status,
            qc_status: QcStatus::Passed,
            items: vec![],
            taxable_amount: cgst * dec!(2) / dec!(0.12),
            cgst_amount: cgst,
            sgst_amount: cgst,
            igst_amount: Decimal::ZERO,
            total_amount: Decimal::ZERO,
            notes: None,
            rejection_reason: None,
            created_by: "u".to_string(),
            approved_by: None,
            approved_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_summary_nets_output_against_itc() {
        let invoices = vec![
            invoice(None, SupplyType::IntraState, dec!(1000), None, InvoiceStatus::Completed),
            invoice(None, SupplyType::IntraState, dec!(5000), None, InvoiceStatus::Cancelled),
        ];
        let grns = vec![grn(GrnStatus::Approved, dec!(20)), grn(GrnStatus::Pending, dec!(999))];
        let s = gst_summary(date(), date(), &invoices, &grns);

        assert_eq!(s.output_tax.cgst, dec!(60));
        assert_eq!(s.input_tax_credit.cgst, dec!(20));
        assert_eq!(s.net.cgst, dec!(40));
        assert_eq!(s.net_payable, dec!(80));
        assert_eq!(s.carry_forward_credit, Decimal::ZERO);
        assert_eq!(s.invoice_count, 1);
        assert_eq!(s.grn_count, 1);
    }

    #[test]
    fn test_summary_carries_forward_excess_credit() {
        let grns = vec![grn(GrnStatus::Approved, dec!(50))];
        let s = gst_summary(date(), date(), &[], &grns);
        assert_eq!(s.net_payable, Decimal::ZERO);
        assert_eq!(s.carry_forward_credit, dec!(100));
        assert_eq!(s.net.sgst, dec!(-50));
    }

    #[test]
    fn test_gstr1_classification() {
        let invoices = vec![
            invoice(Some("29AAPFU0939F1ZV"), SupplyType::InterState, dec!(1000), Some("3004"), InvoiceStatus::Completed),
            invoice(None, SupplyType::InterState, dec!(300000), Some("3004"), InvoiceStatus::Completed),
            invoice(None, SupplyType::InterState, dec!(1000), None, InvoiceStatus::Completed),
            invoice(None, SupplyType::IntraState, dec!(400000), Some("3004"), InvoiceStatus::Completed),
            invoice(None, SupplyType::IntraState, dec!(100), Some("3004"), InvoiceStatus::Completed),
            invoice(Some("27AAPFU0939F1ZV"), SupplyType::IntraState, dec!(50), None, InvoiceStatus::Cancelled),
        ];
        let report = gstr1(date(), date(), &invoices);

        assert_eq!(report.invoice_count, 5);
        assert_eq!(report.b2b.len(), 1);
        assert_eq!(report.b2cl.len(), 1);
        assert_eq!(report.b2cl[0].taxable_value, dec!(300000));

        // 州内 2 件は同一の (州, 税率) に集約される
        assert_eq!(report.b2cs.len(), 2);
        let intra = report
            .b2cs
            .iter()
            .find(|r| r.supply_type == SupplyType::IntraState)
            .unwrap();
        assert_eq!(intra.taxable_value, dec!(400100));

        let codes: Vec<&str> = report.hsn_summary.iter().map(|r| r.hsn_code.as_str()).collect();
        assert_eq!(codes, vec!["3004", UNCLASSIFIED_HSN]);
        assert_eq!(report.hsn_summary[0].quantity, 8);
    }
}
