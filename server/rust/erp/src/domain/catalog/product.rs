use serde_json::json;

use super::GST_RATE_OPTIONS;
use crate::domain::entity::master_schema::{FieldDef, MasterCategory, MasterSchema};

pub(super) fn product_masters() -> Vec<MasterSchema> {
    vec![
        MasterSchema::new(
            "products",
            "Products",
            MasterCategory::Product,
            vec![
                FieldDef::text("sku", "SKU").required().unique().max_length(64).searchable().list(),
                FieldDef::text("name", "Name").required().searchable().list(),
                FieldDef::reference("category_id", "Category", "categories").list(),
                FieldDef::reference("brand_id", "Brand", "brands").list(),
                FieldDef::reference("potency_id", "Potency", "potencies"),
                FieldDef::reference("unit_id", "Unit", "units"),
                FieldDef::text("hsn_code", "HSN Code")
                    .max_length(8)
                    .pattern("^[0-9]{4,8}$")
                    .searchable(),
                FieldDef::number("gst_rate", "GST Rate (%)")
                    .required()
                    .options(&GST_RATE_OPTIONS)
                    .default_value(json!(12))
                    .list(),
                FieldDef::number("mrp", "MRP").min(0.0),
                FieldDef::number("selling_price", "Selling Price")
                    .required()
                    .min(0.0)
                    .sortable()
                    .list(),
                FieldDef::number("purchase_price", "Purchase Price").min(0.0),
                FieldDef::integer("min_stock_level", "Minimum Stock")
                    .min(0.0)
                    .default_value(json!(0)),
                FieldDef::integer("reorder_level", "Reorder Level")
                    .min(0.0)
                    .default_value(json!(0)),
                FieldDef::textarea("description", "Description"),
            ],
        )
        .label_field("name")
        .default_sort("name")
        .describe("Sellable items with pricing, tax rate and stock thresholds"),
        MasterSchema::new(
            "categories",
            "Categories",
            MasterCategory::Product,
            vec![
                FieldDef::text("name", "Name").required().unique().searchable().list(),
                FieldDef::text("code", "Code").max_length(32).searchable().list(),
                FieldDef::reference("parent_id", "Parent Category", "categories").list(),
                FieldDef::textarea("description", "Description"),
            ],
        ),
        MasterSchema::new(
            "brands",
            "Brands",
            MasterCategory::Product,
            vec![
                FieldDef::text("name", "Name").required().unique().searchable().list(),
                FieldDef::text("code", "Code").max_length(32).searchable().list(),
                FieldDef::text("manufacturer", "Manufacturer").searchable().list(),
                FieldDef::text("country", "Country").max_length(64),
                FieldDef::textarea("description", "Description"),
            ],
        ),
        MasterSchema::new(
            "potencies",
            "Potencies",
            MasterCategory::Product,
            vec![
                FieldDef::text("name", "Name")
                    .required()
                    .unique()
                    .max_length(32)
                    .placeholder("30C")
                    .searchable()
                    .list(),
                FieldDef::select("scale", "Scale", &["X", "C", "LM", "Q", "MT"]).list(),
                FieldDef::textarea("description", "Description"),
            ],
        ),
        MasterSchema::new(
            "units",
            "Units",
            MasterCategory::Product,
            vec![
                FieldDef::text("name", "Name").required().searchable().list(),
                FieldDef::text("symbol", "Symbol")
                    .required()
                    .unique()
                    .max_length(16)
                    .searchable()
                    .list(),
                FieldDef::textarea("description", "Description"),
            ],
        ),
        MasterSchema::new(
            "hsn-codes",
            "HSN Codes",
            MasterCategory::Product,
            vec![
                FieldDef::text("code", "HSN Code")
                    .required()
                    .unique()
                    .max_length(8)
                    .pattern("^[0-9]{4,8}$")
                    .searchable()
                    .list(),
                FieldDef::text("description", "Description").searchable().list(),
                FieldDef::number("gst_rate", "GST Rate (%)")
                    .required()
                    .options(&GST_RATE_OPTIONS)
                    .list(),
            ],
        )
        .describe("Harmonized System of Nomenclature codes and their GST rates"),
    ]
}
