use serde_json::json;

use crate::domain::entity::master_schema::{FieldDef, MasterCategory, MasterSchema};

pub(super) fn marketing_masters() -> Vec<MasterSchema> {
    vec![MasterSchema::new(
        "campaign-types",
        "Campaign Types",
        MasterCategory::Marketing,
        vec![
            FieldDef::text("name", "Name").required().unique().searchable().list(),
            FieldDef::select(
                "channel",
                "Channel",
                &["SMS", "EMAIL", "WHATSAPP", "SOCIAL", "IN_STORE"],
            )
            .required()
            .list(),
            FieldDef::textarea("description", "Description"),
        ],
    )]
}

pub(super) fn ai_masters() -> Vec<MasterSchema> {
    vec![MasterSchema::new(
        "ai-agents",
        "AI Agents",
        MasterCategory::Ai,
        vec![
            FieldDef::text("name", "Name").required().unique().searchable().list(),
            FieldDef::select(
                "agent_type",
                "Type",
                &["FORECASTING", "PRICING", "CONTENT", "SUPPORT"],
            )
            .required()
            .list(),
            FieldDef::text("model", "Model").max_length(128).list(),
            FieldDef::number("temperature", "Temperature")
                .min(0.0)
                .max(2.0)
                .default_value(json!(0.7)),
            FieldDef::textarea("description", "Description"),
        ],
    )
    .describe("Reference data for assistant configurations")]
}
