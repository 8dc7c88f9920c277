pub mod fefo_allocator;
pub mod financial_reports;
pub mod grn_calculator;
pub mod gst_reports;
pub mod invoice_calculator;
pub mod posting_rules;
pub mod record_validator;
pub mod schema_generator;
pub mod stock_alert;
