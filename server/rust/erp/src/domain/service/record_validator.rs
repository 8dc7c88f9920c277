//! マスタレコードの入力検証と正規化。
//!
//! ペイロードをスキーマの項目定義に照らして検証し、保存用に正規化した JSON オブジェクトを返す。
//! 違反はすべて収集して返すため、クライアントは 1 回の応答で全項目のエラーを表示できる。

use std::collections::HashMap;
use std::sync::{LazyLock, RwLock};

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use uuid::Uuid;

use crate::domain::entity::master_schema::{FieldDef, FieldType, MasterSchema, READ_ONLY_KEYS};

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Invalid email regex")
});

static TEL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\+?[0-9][0-9 \-]{5,18}[0-9]$").expect("Invalid tel regex")
});

/// スキーマ定義の pattern をコンパイル済みで保持する。キーはカタログ上の pattern 文字列で、
/// コンパイルできない pattern は None として保持し、どの値にも一致しない扱いにする。
static SCHEMA_PATTERNS: LazyLock<RwLock<HashMap<String, Option<Regex>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// 違反理由コード。
pub mod reason {
    pub const UNKNOWN_FIELD: &str = "unknown_field";
    pub const READ_ONLY: &str = "read_only";
    pub const REQUIRED: &str = "required";
    pub const INVALID_TYPE: &str = "invalid_type";
    pub const TOO_LONG: &str = "too_long";
    pub const OUT_OF_RANGE: &str = "out_of_range";
    pub const PATTERN_MISMATCH: &str = "pattern_mismatch";
    pub const INVALID_FORMAT: &str = "invalid_format";
    pub const INVALID_DATE: &str = "invalid_date";
    pub const INVALID_OPTION: &str = "invalid_option";
    pub const INVALID_REFERENCE: &str = "invalid_reference";
    pub const DUPLICATE_VALUE: &str = "duplicate_value";
    pub const CONFLICTING_LINES: &str = "conflicting_lines";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    Create,
    Update,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub reason: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: &str, reason: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            reason: reason.to_string(),
            message: message.into(),
        }
    }
}

pub struct RecordValidator;

impl RecordValidator {
    /// ペイロードを検証し、正規化したオブジェクトを返す。
    ///
    /// Create では欠落項目に既定値を補い、Update では存在する項目のみを検証する（部分更新）。
    pub fn validate(
        schema: &MasterSchema,
        payload: &Value,
        mode: ValidationMode,
    ) -> Result<Map<String, Value>, Vec<FieldViolation>> {
        let Some(input) = payload.as_object() else {
            return Err(vec![FieldViolation::new(
                "",
                reason::INVALID_TYPE,
                "request body must be a JSON object",
            )]);
        };

        let mut violations = Vec::new();
        for key in input.keys() {
            if READ_ONLY_KEYS.contains(&key.as_str()) {
                violations.push(FieldViolation::new(
                    key,
                    reason::READ_ONLY,
                    format!("{key} is managed by the system"),
                ));
            } else if schema.field(key).is_none() {
                violations.push(FieldViolation::new(
                    key,
                    reason::UNKNOWN_FIELD,
                    format!("{key} is not a field of {}", schema.name),
                ));
            }
        }

        let mut output = Map::new();
        for field in &schema.fields {
            match input.get(&field.key) {
                None => {
                    if mode == ValidationMode::Create {
                        if let Some(default) = &field.default {
                            output.insert(field.key.clone(), default.clone());
                        } else if field.required {
                            violations.push(required(field));
                        }
                    }
                }
                Some(raw) => match normalize_value(field, raw) {
                    Ok(Value::Null) if field.required => violations.push(required(field)),
                    Ok(value) => {
                        output.insert(field.key.clone(), value);
                    }
                    Err(v) => violations.push(v),
                },
            }
        }

        if violations.is_empty() {
            Ok(output)
        } else {
            Err(violations)
        }
    }
}

fn required(field: &FieldDef) -> FieldViolation {
    FieldViolation::new(
        &field.key,
        reason::REQUIRED,
        format!("{} is required", field.label),
    )
}

fn invalid_type(field: &FieldDef, expected: &str) -> FieldViolation {
    FieldViolation::new(
        &field.key,
        reason::INVALID_TYPE,
        format!("{} must be {expected}", field.label),
    )
}

fn matches_schema_pattern(pattern: &str, value: &str) -> bool {
    if let Ok(cache) = SCHEMA_PATTERNS.read() {
        if let Some(compiled) = cache.get(pattern) {
            return compiled.as_ref().is_some_and(|re| re.is_match(value));
        }
    }
    let compiled = Regex::new(pattern).ok();
    let matched = compiled.as_ref().is_some_and(|re| re.is_match(value));
    if let Ok(mut cache) = SCHEMA_PATTERNS.write() {
        cache.insert(pattern.to_string(), compiled);
    }
    matched
}

/// 1 項目の値を検証・正規化する。一覧のフィルタ値の検証にも使う。
pub fn normalize_value(field: &FieldDef, raw: &Value) -> Result<Value, FieldViolation> {
    if raw.is_null() {
        return Ok(Value::Null);
    }
    match field.field_type {
        FieldType::Text
        | FieldType::Textarea
        | FieldType::Email
        | FieldType::Tel
        | FieldType::Select => normalize_text(field, raw),
        FieldType::Number => normalize_number(field, raw),
        FieldType::Integer => normalize_integer(field, raw),
        FieldType::Boolean => normalize_boolean(field, raw),
        FieldType::Date => normalize_date(field, raw),
        FieldType::Reference => normalize_reference(field, raw),
    }
}

fn normalize_text(field: &FieldDef, raw: &Value) -> Result<Value, FieldViolation> {
    let Some(s) = raw.as_str() else {
        return Err(invalid_type(field, "a string"));
    };
    let s = s.trim();
    if s.is_empty() {
        return Ok(Value::Null);
    }
    if let Some(max) = field.max_length {
        if s.chars().count() > max {
            return Err(FieldViolation::new(
                &field.key,
                reason::TOO_LONG,
                format!("{} must be at most {max} characters", field.label),
            ));
        }
    }
    match field.field_type {
        FieldType::Email if !EMAIL_REGEX.is_match(s) => {
            return Err(FieldViolation::new(
                &field.key,
                reason::INVALID_FORMAT,
                format!("{} must be a valid email address", field.label),
            ));
        }
        FieldType::Tel if !TEL_REGEX.is_match(s) => {
            return Err(FieldViolation::new(
                &field.key,
                reason::INVALID_FORMAT,
                format!("{} must be a valid phone number", field.label),
            ));
        }
        FieldType::Select if !field.options.iter().any(|o| o == s) => {
            return Err(FieldViolation::new(
                &field.key,
                reason::INVALID_OPTION,
                format!("{} must be one of: {}", field.label, field.options.join(", ")),
            ));
        }
        _ => {}
    }
    if let Some(pattern) = &field.pattern {
        if !matches_schema_pattern(pattern, s) {
            return Err(FieldViolation::new(
                &field.key,
                reason::PATTERN_MISMATCH,
                format!("{} has an invalid format", field.label),
            ));
        }
    }
    Ok(Value::String(s.to_string()))
}

/// 数値または数値文字列を f64 として取り出す。空文字列は None。
fn numeric(field: &FieldDef, raw: &Value) -> Result<Option<f64>, FieldViolation> {
    match raw {
        Value::Number(n) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| invalid_type(field, "a number")),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| invalid_type(field, "a number")),
        _ => Err(invalid_type(field, "a number")),
    }
}

fn check_range(field: &FieldDef, value: f64) -> Result<(), FieldViolation> {
    let below = field.min.is_some_and(|min| value < min);
    let above = field.max.is_some_and(|max| value > max);
    if below || above {
        let bounds = match (field.min, field.max) {
            (Some(min), Some(max)) => format!("between {min} and {max}"),
            (Some(min), None) => format!("at least {min}"),
            (None, Some(max)) => format!("at most {max}"),
            (None, None) => String::new(),
        };
        return Err(FieldViolation::new(
            &field.key,
            reason::OUT_OF_RANGE,
            format!("{} must be {bounds}", field.label),
        ));
    }
    Ok(())
}

fn normalize_number(field: &FieldDef, raw: &Value) -> Result<Value, FieldViolation> {
    let Some(value) = numeric(field, raw)? else {
        return Ok(Value::Null);
    };
    if !field.options.is_empty()
        && !field
            .options
            .iter()
            .any(|o| o.parse::<f64>().is_ok_and(|opt| (opt - value).abs() < f64::EPSILON))
    {
        return Err(FieldViolation::new(
            &field.key,
            reason::INVALID_OPTION,
            format!("{} must be one of: {}", field.label, field.options.join(", ")),
        ));
    }
    check_range(field, value)?;
    // 整数値は整数として保持し、`12` が `12.0` にならないようにする
    #[allow(clippy::cast_possible_truncation)]
    let number = if value.fract() == 0.0 && value.abs() < 9.0e15 {
        Number::from(value as i64)
    } else {
        Number::from_f64(value).ok_or_else(|| invalid_type(field, "a number"))?
    };
    Ok(Value::Number(number))
}

fn normalize_integer(field: &FieldDef, raw: &Value) -> Result<Value, FieldViolation> {
    let Some(value) = numeric(field, raw)? else {
        return Ok(Value::Null);
    };
    if value.fract() != 0.0 || value.abs() > f64::from(i32::MAX) {
        return Err(invalid_type(field, "an integer"));
    }
    check_range(field, value)?;
    #[allow(clippy::cast_possible_truncation)]
    Ok(Value::Number(Number::from(value as i64)))
}

fn normalize_boolean(field: &FieldDef, raw: &Value) -> Result<Value, FieldViolation> {
    match raw {
        Value::Bool(b) => Ok(Value::Bool(*b)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            "" => Ok(Value::Null),
            _ => Err(invalid_type(field, "a boolean")),
        },
        _ => Err(invalid_type(field, "a boolean")),
    }
}

fn normalize_date(field: &FieldDef, raw: &Value) -> Result<Value, FieldViolation> {
    let Some(s) = raw.as_str() else {
        return Err(invalid_type(field, "a date string"));
    };
    let s = s.trim();
    if s.is_empty() {
        return Ok(Value::Null);
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
        .map_err(|_| {
            FieldViolation::new(
                &field.key,
                reason::INVALID_DATE,
                format!("{} must be a date in YYYY-MM-DD format", field.label),
            )
        })
}

fn normalize_reference(field: &FieldDef, raw: &Value) -> Result<Value, FieldViolation> {
    let Some(s) = raw.as_str() else {
        return Err(invalid_type(field, "a record id"));
    };
    let s = s.trim();
    if s.is_empty() {
        return Ok(Value::Null);
    }
    Uuid::parse_str(s)
        .map(|id| Value::String(id.to_string()))
        .map_err(|_| {
            FieldViolation::new(
                &field.key,
                reason::INVALID_REFERENCE,
                format!("{} must reference an existing record id", field.label),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::MasterCatalog;
    use serde_json::json;

    fn products() -> MasterSchema {
        MasterCatalog::builtin().get("products").unwrap().clone()
    }

    fn reasons(violations: &[FieldViolation]) -> Vec<(&str, &str)> {
        violations
            .iter()
            .map(|v| (v.field.as_str(), v.reason.as_str()))
            .collect()
    }

    #[test]
    fn test_create_normalizes_and_fills_defaults() {
        let payload = json!({
            "sku": "  ARN-30C ",
            "name": "Arnica Montana 30C",
            "selling_price": "85.50",
            "description": "",
            "brand_id": "6F9619FF-8B86-D011-B42D-00C04FC964FF"
        });
        let record = RecordValidator::validate(&products(), &payload, ValidationMode::Create).unwrap();

        assert_eq!(record["sku"], json!("ARN-30C"));
        assert_eq!(record["selling_price"], json!(85.5));
        assert_eq!(record["description"], Value::Null);
        assert_eq!(record["gst_rate"], json!(12));
        assert_eq!(record["min_stock_level"], json!(0));
        assert_eq!(record["is_active"], json!(true));
        assert_eq!(record["brand_id"], json!("6f9619ff-8b86-d011-b42d-00c04fc964ff"));
    }

    #[test]
    fn test_create_collects_every_violation() {
        let payload = json!({
            "id": "x",
            "color": "red",
            "name": 12,
            "gst_rate": 15,
            "selling_price": -1,
            "reorder_level": 2.5,
            "hsn_code": "30AB",
            "category_id": "not-a-uuid"
        });
        let violations =
            RecordValidator::validate(&products(), &payload, ValidationMode::Create).unwrap_err();
        let found = reasons(&violations);

        assert!(found.contains(&("id", reason::READ_ONLY)));
        assert!(found.contains(&("color", reason::UNKNOWN_FIELD)));
        assert!(found.contains(&("sku", reason::REQUIRED)));
        assert!(found.contains(&("name", reason::INVALID_TYPE)));
        assert!(found.contains(&("gst_rate", reason::INVALID_OPTION)));
        assert!(found.contains(&("selling_price", reason::OUT_OF_RANGE)));
        assert!(found.contains(&("reorder_level", reason::INVALID_TYPE)));
        assert!(found.contains(&("hsn_code", reason::PATTERN_MISMATCH)));
        assert!(found.contains(&("category_id", reason::INVALID_REFERENCE)));
    }

    #[test]
    fn test_update_is_partial_but_rejects_clearing_required() {
        let schema = products();
        let record =
            RecordValidator::validate(&schema, &json!({"name": "Renamed"}), ValidationMode::Update).unwrap();
        assert_eq!(record.len(), 1);
        assert!(!record.contains_key("gst_rate"));

        let violations =
            RecordValidator::validate(&schema, &json!({"name": "  "}), ValidationMode::Update).unwrap_err();
        assert_eq!(reasons(&violations), vec![("name", reason::REQUIRED)]);

        let violations =
            RecordValidator::validate(&schema, &json!({"sku": null}), ValidationMode::Update).unwrap_err();
        assert_eq!(reasons(&violations), vec![("sku", reason::REQUIRED)]);
    }

    #[test]
    fn test_schema_pattern_is_compiled_once_and_reused() {
        let pattern = "^[0-9]{2}-cache$";
        assert!(matches_schema_pattern(pattern, "27-cache"));
        let compiled = SCHEMA_PATTERNS
            .read()
            .unwrap()
            .get(pattern)
            .and_then(|re| re.as_ref().map(|re| re.as_str().to_string()));
        assert_eq!(compiled.as_deref(), Some(pattern));

        assert!(!matches_schema_pattern(pattern, "2-cache"));
        assert!(matches_schema_pattern(pattern, "09-cache"));
    }

    #[test]
    fn test_invalid_schema_pattern_never_matches() {
        assert!(!matches_schema_pattern("([0-9]", "1"));
        assert!(!matches_schema_pattern("([0-9]", "1"));
        assert!(matches!(
            SCHEMA_PATTERNS.read().unwrap().get("([0-9]"),
            Some(None)
        ));
    }

    #[test]
    fn test_formats() {
        let catalog = MasterCatalog::builtin();
        let customers = catalog.get("customers").unwrap();

        let violations = RecordValidator::validate(
            customers,
            &json!({"name": "A", "email": "nope", "phone": "12ab", "gstin": "27AAPFU0939F1Z"}),
            ValidationMode::Create,
        )
        .unwrap_err();
        let found = reasons(&violations);
        assert!(found.contains(&("email", reason::INVALID_FORMAT)));
        assert!(found.contains(&("phone", reason::INVALID_FORMAT)));
        assert!(found.contains(&("gstin", reason::TOO_LONG)) || found.contains(&("gstin", reason::PATTERN_MISMATCH)));

        let ok = RecordValidator::validate(
            customers,
            &json!({"name": "A", "email": "a@b.in", "phone": "+91 98765 43210", "gstin": "27AAPFU0939F1ZV"}),
            ValidationMode::Create,
        );
        assert!(ok.is_ok());

        let employees = catalog.get("employees").unwrap();
        let violations = RecordValidator::validate(
            employees,
            &json!({"employee_code": "E1", "name": "B", "joining_date": "2024-02-30", "is_active": "maybe"}),
            ValidationMode::Create,
        )
        .unwrap_err();
        let found = reasons(&violations);
        assert!(found.contains(&("joining_date", reason::INVALID_DATE)));
        assert!(found.contains(&("is_active", reason::INVALID_TYPE)));
    }

    #[test]
    fn test_select_membership() {
        let catalog = MasterCatalog::builtin();
        let potencies = catalog.get("potencies").unwrap();
        let violations = RecordValidator::validate(
            potencies,
            &json!({"name": "30C", "scale": "Z"}),
            ValidationMode::Create,
        )
        .unwrap_err();
        assert_eq!(reasons(&violations), vec![("scale", reason::INVALID_OPTION)]);
    }

    #[test]
    fn test_rejects_non_object_payload() {
        let violations =
            RecordValidator::validate(&products(), &json!([1, 2]), ValidationMode::Create).unwrap_err();
        assert_eq!(violations[0].reason, reason::INVALID_TYPE);
    }
}
