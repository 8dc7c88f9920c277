use serde_json::{json, Map, Value};

use crate::domain::entity::master_schema::{FieldDef, FieldType, MasterSchema};

const JSON_SCHEMA_DIALECT: &str = "https://json-schema.org/draft/2020-12/schema";

pub struct SchemaGenerator;

impl SchemaGenerator {
    /// マスタの入力ペイロードを表す JSON Schema（draft 2020-12）を生成する。
    pub fn json_schema(schema: &MasterSchema) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for field in &schema.fields {
            properties.insert(field.key.clone(), Self::field_schema(field));
            if field.required {
                required.push(Value::String(field.key.clone()));
            }
        }

        json!({
            "$schema": JSON_SCHEMA_DIALECT,
            "$id": format!("urn:yeelo:masters:{}", schema.name),
            "title": schema.title,
            "description": schema.description,
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    fn field_schema(field: &FieldDef) -> Value {
        let mut s = Map::new();

        let base_type = match field.field_type {
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            _ => "string",
        };
        // 任意項目は null を許容する
        let type_value = if field.required {
            json!(base_type)
        } else {
            json!([base_type, "null"])
        };
        s.insert("type".to_string(), type_value);
        s.insert("title".to_string(), json!(field.label));

        match field.field_type {
            FieldType::Email => {
                s.insert("format".to_string(), json!("email"));
            }
            FieldType::Date => {
                s.insert("format".to_string(), json!("date"));
            }
            FieldType::Reference => {
                s.insert("format".to_string(), json!("uuid"));
                if let Some(target) = &field.references {
                    s.insert("x-references".to_string(), json!(target));
                }
            }
            _ => {}
        }

        if let Some(max_len) = field.max_length {
            s.insert("maxLength".to_string(), json!(max_len));
        }
        if let Some(min) = field.min {
            s.insert("minimum".to_string(), json!(min));
        }
        if let Some(max) = field.max {
            s.insert("maximum".to_string(), json!(max));
        }
        if let Some(pattern) = &field.pattern {
            s.insert("pattern".to_string(), json!(pattern));
        }

        if !field.options.is_empty() {
            let options: Vec<Value> = match field.field_type {
                FieldType::Number => field
                    .options
                    .iter()
                    .filter_map(|o| o.parse::<f64>().ok())
                    .map(|v| json!(v))
                    .collect(),
                _ => field.options.iter().map(|o| json!(o)).collect(),
            };
            s.insert("enum".to_string(), Value::Array(options));
        }
        if let Some(default) = &field.default {
            s.insert("default".to_string(), default.clone());
        }
        if let Some(placeholder) = &field.placeholder {
            s.insert("examples".to_string(), json!([placeholder]));
        }

        Value::Object(s)
    }
}
