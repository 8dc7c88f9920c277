use serde_json::json;

use super::{GSTIN_PATTERN, STATE_CODE_PATTERN};
use crate::domain::entity::master_schema::{FieldDef, MasterCategory, MasterSchema};

pub(super) fn system_masters() -> Vec<MasterSchema> {
    vec![MasterSchema::new(
        "company-profile",
        "Company Profile",
        MasterCategory::System,
        vec![
            FieldDef::text("name", "Trade Name").required().searchable().list(),
            FieldDef::text("legal_name", "Legal Name"),
            FieldDef::text("gstin", "GSTIN")
                .max_length(15)
                .pattern(GSTIN_PATTERN)
                .list(),
            FieldDef::text("state_code", "State Code")
                .required()
                .max_length(2)
                .pattern(STATE_CODE_PATTERN)
                .list(),
            FieldDef::text("pan", "PAN")
                .max_length(10)
                .pattern("^[A-Z]{5}[0-9]{4}[A-Z]$"),
            FieldDef::textarea("address", "Address"),
            FieldDef::text("city", "City").max_length(64),
            FieldDef::tel("phone", "Phone"),
            FieldDef::email("email", "Email"),
            FieldDef::date("financial_year_start", "Financial Year Start"),
        ],
    )
    .without_delete()
    .describe("Legal identity of the business used on invoices and GST returns")]
}

pub(super) fn hr_masters() -> Vec<MasterSchema> {
    vec![
        MasterSchema::new(
            "departments",
            "Departments",
            MasterCategory::Hr,
            vec![
                FieldDef::text("name", "Name").required().unique().searchable().list(),
                FieldDef::text("code", "Code").max_length(32).list(),
                FieldDef::textarea("description", "Description"),
            ],
        ),
        MasterSchema::new(
            "employees",
            "Employees",
            MasterCategory::Hr,
            vec![
                FieldDef::text("employee_code", "Employee Code")
                    .required()
                    .unique()
                    .max_length(32)
                    .searchable()
                    .list(),
                FieldDef::text("name", "Name").required().searchable().list(),
                FieldDef::email("email", "Email").unique().searchable(),
                FieldDef::tel("phone", "Phone"),
                FieldDef::reference("department_id", "Department", "departments").list(),
                FieldDef::text("designation", "Designation").list(),
                FieldDef::date("joining_date", "Joining Date").sortable(),
                FieldDef::number("salary", "Monthly Salary").min(0.0),
            ],
        )
        .label_field("name")
        .default_sort("name"),
    ]
}

pub(super) fn finance_masters() -> Vec<MasterSchema> {
    vec![MasterSchema::new(
        "banks",
        "Bank Accounts",
        MasterCategory::Finance,
        vec![
            FieldDef::text("bank_name", "Bank").required().searchable().list(),
            FieldDef::text("account_name", "Account Name").required().list(),
            FieldDef::text("account_number", "Account Number")
                .required()
                .unique()
                .max_length(34)
                .pattern("^[0-9A-Z]{6,34}$")
                .searchable()
                .list(),
            FieldDef::text("ifsc_code", "IFSC")
                .max_length(11)
                .pattern("^[A-Z]{4}0[A-Z0-9]{6}$")
                .list(),
            FieldDef::text("branch", "Branch"),
            FieldDef::number("opening_balance", "Opening Balance").default_value(json!(0)),
        ],
    )]
}

pub(super) fn settings_masters() -> Vec<MasterSchema> {
    vec![MasterSchema::new(
        "system-settings",
        "System Settings",
        MasterCategory::Settings,
        vec![
            FieldDef::text("setting_key", "Key")
                .required()
                .unique()
                .max_length(128)
                .pattern("^[a-z0-9_.]+$")
                .searchable()
                .list(),
            FieldDef::textarea("value", "Value").list(),
            FieldDef::select("value_type", "Type", &["string", "number", "boolean", "json"])
                .required()
                .default_value(json!("string"))
                .list(),
            FieldDef::textarea("description", "Description"),
        ],
    )]
}

pub(super) fn security_masters() -> Vec<MasterSchema> {
    vec![MasterSchema::new(
        "roles",
        "Roles",
        MasterCategory::Security,
        vec![
            FieldDef::text("name", "Name").required().unique().searchable().list(),
            FieldDef::text("code", "Code")
                .required()
                .unique()
                .max_length(32)
                .pattern("^[A-Z_]+$")
                .placeholder("STOREKEEPER")
                .list(),
            FieldDef::textarea("permissions", "Permissions").placeholder("inventory:read,inventory:write"),
            FieldDef::textarea("description", "Description"),
        ],
    )]
}
