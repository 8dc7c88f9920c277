//! マスタデータの宣言的スキーマ。
//!
//! 1 つの `MasterSchema` が一覧列・入力フォーム・検証規則・物理テーブルを定義し、
//! 汎用の CRUD ユースケースと動的 SQL の両方がこれを参照する。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// システムが管理する列。ペイロードからは変更できない。
pub const READ_ONLY_KEYS: [&str; 5] = ["id", "created_at", "updated_at", "created_by", "updated_by"];

/// 全マスタ共通の有効フラグ列。
pub const ACTIVE_KEY: &str = "is_active";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MasterCategory {
    System,
    Product,
    Sales,
    Purchase,
    Customer,
    Hr,
    Finance,
    Marketing,
    Ai,
    Settings,
    Security,
}

impl MasterCategory {
    pub const ALL: [MasterCategory; 11] = [
        MasterCategory::System,
        MasterCategory::Product,
        MasterCategory::Sales,
        MasterCategory::Purchase,
        MasterCategory::Customer,
        MasterCategory::Hr,
        MasterCategory::Finance,
        MasterCategory::Marketing,
        MasterCategory::Ai,
        MasterCategory::Settings,
        MasterCategory::Security,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MasterCategory::System => "system",
            MasterCategory::Product => "product",
            MasterCategory::Sales => "sales",
            MasterCategory::Purchase => "purchase",
            MasterCategory::Customer => "customer",
            MasterCategory::Hr => "hr",
            MasterCategory::Finance => "finance",
            MasterCategory::Marketing => "marketing",
            MasterCategory::Ai => "ai",
            MasterCategory::Settings => "settings",
            MasterCategory::Security => "security",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Textarea,
    Email,
    Tel,
    Number,
    Integer,
    Boolean,
    Date,
    Select,
    Reference,
}

impl FieldType {
    /// 値を text としてバインドする際の SQL キャスト先。
    pub fn sql_cast(&self) -> &'static str {
        match self {
            FieldType::Text
            | FieldType::Textarea
            | FieldType::Email
            | FieldType::Tel
            | FieldType::Select => "text",
            FieldType::Number => "numeric",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Reference => "uuid",
        }
    }

    /// 物理列の型。
    pub fn column_type(&self) -> &'static str {
        match self {
            FieldType::Text
            | FieldType::Textarea
            | FieldType::Email
            | FieldType::Tel
            | FieldType::Select => "TEXT",
            FieldType::Number => "NUMERIC(14,2)",
            FieldType::Integer => "INTEGER",
            FieldType::Boolean => "BOOLEAN",
            FieldType::Date => "DATE",
            FieldType::Reference => "UUID",
        }
    }

    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            FieldType::Text
                | FieldType::Textarea
                | FieldType::Email
                | FieldType::Tel
                | FieldType::Select
        )
    }
}

/// FieldDef はマスタの 1 項目の定義。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub key: String,
    pub label: String,
    pub field_type: FieldType,
    pub required: bool,
    pub unique: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// select の選択肢、または number の許容値
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    /// reference の参照先マスタ名
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    pub searchable: bool,
    pub sortable: bool,
    pub list_column: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

impl FieldDef {
    fn new(key: &str, label: &str, field_type: FieldType) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            field_type,
            required: false,
            unique: false,
            max_length: None,
            min: None,
            max: None,
            pattern: None,
            options: Vec::new(),
            references: None,
            default: None,
            searchable: false,
            sortable: false,
            list_column: false,
            placeholder: None,
        }
    }

    pub fn text(key: &str, label: &str) -> Self {
        Self::new(key, label, FieldType::Text).max_length(255)
    }

    pub fn textarea(key: &str, label: &str) -> Self {
        Self::new(key, label, FieldType::Textarea).max_length(2000)
    }

    pub fn email(key: &str, label: &str) -> Self {
        Self::new(key, label, FieldType::Email).max_length(255)
    }

    pub fn tel(key: &str, label: &str) -> Self {
        Self::new(key, label, FieldType::Tel).max_length(20)
    }

    pub fn number(key: &str, label: &str) -> Self {
        Self::new(key, label, FieldType::Number)
    }

    pub fn integer(key: &str, label: &str) -> Self {
        Self::new(key, label, FieldType::Integer)
    }

    pub fn boolean(key: &str, label: &str) -> Self {
        Self::new(key, label, FieldType::Boolean)
    }

    pub fn date(key: &str, label: &str) -> Self {
        Self::new(key, label, FieldType::Date)
    }

    pub fn select(key: &str, label: &str, options: &[&str]) -> Self {
        let mut field = Self::new(key, label, FieldType::Select);
        field.options = options.iter().map(|o| (*o).to_string()).collect();
        field
    }

    pub fn reference(key: &str, label: &str, target: &str) -> Self {
        let mut field = Self::new(key, label, FieldType::Reference);
        field.references = Some(target.to_string());
        field
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    #[must_use]
    pub fn max_length(mut self, n: usize) -> Self {
        self.max_length = Some(n);
        self
    }

    #[must_use]
    pub fn min(mut self, v: f64) -> Self {
        self.min = Some(v);
        self
    }

    #[must_use]
    pub fn max(mut self, v: f64) -> Self {
        self.max = Some(v);
        self
    }

    #[must_use]
    pub fn pattern(mut self, p: &str) -> Self {
        self.pattern = Some(p.to_string());
        self
    }

    #[must_use]
    pub fn options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|o| (*o).to_string()).collect();
        self
    }

    #[must_use]
    pub fn default_value(mut self, v: Value) -> Self {
        self.default = Some(v);
        self
    }

    #[must_use]
    pub fn searchable(mut self) -> Self {
        self.searchable = true;
        self.sortable = true;
        self
    }

    #[must_use]
    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    #[must_use]
    pub fn list(mut self) -> Self {
        self.list_column = true;
        self
    }

    #[must_use]
    pub fn placeholder(mut self, p: &str) -> Self {
        self.placeholder = Some(p.to_string());
        self
    }
}

/// MasterSchema は 1 つのマスタ画面・テーブルの定義。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterSchema {
    /// URL スラッグ（例: `brands`）
    pub name: String,
    pub title: String,
    pub description: String,
    pub category: MasterCategory,
    /// `masters` スキーマ内の物理テーブル名
    pub table: String,
    pub fields: Vec<FieldDef>,
    pub label_field: String,
    pub default_sort: String,
    pub allow_create: bool,
    pub allow_update: bool,
    pub allow_delete: bool,
}

impl MasterSchema {
    /// new はスキーマを生成する。物理テーブル名はスラッグのハイフンをアンダースコアに置換したもの。
    /// 末尾に共通の `is_active` 項目を追加する。
    pub fn new(
        name: &str,
        title: &str,
        category: MasterCategory,
        fields: Vec<FieldDef>,
    ) -> Self {
        let mut fields = fields;
        if !fields.iter().any(|f| f.key == ACTIVE_KEY) {
            fields.push(
                FieldDef::boolean(ACTIVE_KEY, "Active")
                    .default_value(Value::Bool(true))
                    .list(),
            );
        }
        let label_field = fields
            .first()
            .map_or_else(|| "id".to_string(), |f| f.key.clone());
        Self {
            name: name.to_string(),
            title: title.to_string(),
            description: String::new(),
            category,
            table: name.replace('-', "_"),
            fields,
            label_field: label_field.clone(),
            default_sort: label_field,
            allow_create: true,
            allow_update: true,
            allow_delete: true,
        }
    }

    #[must_use]
    pub fn describe(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    #[must_use]
    pub fn label_field(mut self, key: &str) -> Self {
        self.label_field = key.to_string();
        self
    }

    #[must_use]
    pub fn default_sort(mut self, sort: &str) -> Self {
        self.default_sort = sort.to_string();
        self
    }

    #[must_use]
    pub fn without_create(mut self) -> Self {
        self.allow_create = false;
        self
    }

    #[must_use]
    pub fn without_delete(mut self) -> Self {
        self.allow_delete = false;
        self
    }

    pub fn field(&self, key: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn searchable_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.searchable)
    }

    pub fn unique_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.unique)
    }

    pub fn reference_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields
            .iter()
            .filter(|f| f.field_type == FieldType::Reference)
    }

    /// ソート可能な列か。タイムスタンプ列は常にソート可能。
    pub fn is_sortable(&self, column: &str) -> bool {
        matches!(column, "created_at" | "updated_at")
            || self.field(column).is_some_and(|f| f.sortable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_appends_active_flag_and_derives_table() {
        let schema = MasterSchema::new(
            "hsn-codes",
            "HSN Codes",
            MasterCategory::Product,
            vec![FieldDef::text("code", "Code").required()],
        );
        assert_eq!(schema.table, "hsn_codes");
        assert_eq!(schema.label_field, "code");
        let active = schema.field(ACTIVE_KEY).unwrap();
        assert_eq!(active.field_type, FieldType::Boolean);
        assert_eq!(active.default, Some(Value::Bool(true)));
    }

    #[test]
    fn test_is_sortable() {
        let schema = MasterSchema::new(
            "brands",
            "Brands",
            MasterCategory::Product,
            vec![
                FieldDef::text("name", "Name").searchable(),
                FieldDef::textarea("notes", "Notes"),
            ],
        );
        assert!(schema.is_sortable("name"));
        assert!(schema.is_sortable("created_at"));
        assert!(!schema.is_sortable("notes"));
        assert!(!schema.is_sortable("unknown"));
    }
}
