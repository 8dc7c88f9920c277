use serde_json::json;

use super::{GSTIN_PATTERN, STATE_CODE_PATTERN};
use crate::domain::entity::master_schema::{FieldDef, MasterCategory, MasterSchema};

pub(super) fn sales_masters() -> Vec<MasterSchema> {
    vec![
        MasterSchema::new(
            "sales-types",
            "Sales Types",
            MasterCategory::Sales,
            vec![
                FieldDef::text("name", "Name").required().unique().searchable().list(),
                FieldDef::text("code", "Code").max_length(32).list(),
                FieldDef::textarea("description", "Description"),
            ],
        ),
        MasterSchema::new(
            "payment-terms",
            "Payment Terms",
            MasterCategory::Sales,
            vec![
                FieldDef::text("name", "Name").required().unique().searchable().list(),
                FieldDef::integer("days", "Credit Days")
                    .required()
                    .min(0.0)
                    .max(365.0)
                    .default_value(json!(0))
                    .sortable()
                    .list(),
                FieldDef::textarea("description", "Description"),
            ],
        ),
    ]
}

pub(super) fn purchase_masters() -> Vec<MasterSchema> {
    vec![
        MasterSchema::new(
            "suppliers",
            "Suppliers",
            MasterCategory::Purchase,
            vec![
                FieldDef::text("name", "Name").required().searchable().list(),
                FieldDef::text("code", "Code").unique().max_length(32).searchable().list(),
                FieldDef::text("contact_person", "Contact Person"),
                FieldDef::email("email", "Email").searchable(),
                FieldDef::tel("phone", "Phone").searchable().list(),
                FieldDef::text("gstin", "GSTIN")
                    .unique()
                    .max_length(15)
                    .pattern(GSTIN_PATTERN)
                    .placeholder("27AAPFU0939F1ZV")
                    .searchable()
                    .list(),
                FieldDef::text("state_code", "State Code")
                    .max_length(2)
                    .pattern(STATE_CODE_PATTERN),
                FieldDef::textarea("address", "Address"),
                FieldDef::text("city", "City").max_length(64).searchable(),
                FieldDef::reference("vendor_type_id", "Vendor Type", "vendor-types"),
                FieldDef::reference("payment_terms_id", "Payment Terms", "payment-terms"),
            ],
        ),
        MasterSchema::new(
            "vendor-types",
            "Vendor Types",
            MasterCategory::Purchase,
            vec![
                FieldDef::text("name", "Name").required().unique().searchable().list(),
                FieldDef::textarea("description", "Description"),
            ],
        ),
    ]
}

pub(super) fn customer_masters() -> Vec<MasterSchema> {
    vec![
        MasterSchema::new(
            "customers",
            "Customers",
            MasterCategory::Customer,
            vec![
                FieldDef::text("name", "Name").required().searchable().list(),
                FieldDef::tel("phone", "Phone").unique().searchable().list(),
                FieldDef::email("email", "Email").searchable(),
                FieldDef::text("gstin", "GSTIN")
                    .unique()
                    .max_length(15)
                    .pattern(GSTIN_PATTERN)
                    .searchable()
                    .list(),
                FieldDef::text("state_code", "State Code")
                    .max_length(2)
                    .pattern(STATE_CODE_PATTERN),
                FieldDef::textarea("address", "Address"),
                FieldDef::text("city", "City").max_length(64).searchable(),
                FieldDef::reference("customer_group_id", "Customer Group", "customer-groups").list(),
                FieldDef::reference("payment_terms_id", "Payment Terms", "payment-terms"),
                FieldDef::number("credit_limit", "Credit Limit")
                    .min(0.0)
                    .default_value(json!(0)),
            ],
        ),
        MasterSchema::new(
            "customer-groups",
            "Customer Groups",
            MasterCategory::Customer,
            vec![
                FieldDef::text("name", "Name").required().unique().searchable().list(),
                FieldDef::number("discount_percent", "Discount (%)")
                    .min(0.0)
                    .max(100.0)
                    .default_value(json!(0))
                    .list(),
                FieldDef::textarea("description", "Description"),
            ],
        ),
    ]
}
