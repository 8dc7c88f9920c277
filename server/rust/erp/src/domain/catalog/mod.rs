//! 組み込みマスタのカタログ。
//!
//! マスタごとの画面・API・テーブルはすべてここで宣言したスキーマから導出する。
//! マスタを追加する場合はスキーマを追加し、対応するテーブルをマイグレーションに追加する。

mod marketing;
mod organization;
mod product;
mod trade;

use std::collections::HashSet;

use regex::Regex;

use crate::domain::entity::master_schema::{FieldType, MasterCategory, MasterSchema, FieldDef};

/// GSTIN の書式（州コード 2 桁 + PAN 10 桁 + 登録番号 + `Z` + チェック文字）。
pub(crate) const GSTIN_PATTERN: &str = "^[0-9]{2}[A-Z]{5}[0-9]{4}[A-Z][1-9A-Z]Z[0-9A-Z]$";
pub(crate) const STATE_CODE_PATTERN: &str = "^[0-9]{2}$";
pub(crate) const GST_RATE_OPTIONS: [&str; 5] = ["0", "5", "12", "18", "28"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("duplicate master name: {0}")]
    DuplicateMaster(String),
    #[error("master {master}: duplicate field key {field}")]
    DuplicateField { master: String, field: String },
    #[error("master {master}: invalid identifier {identifier}")]
    InvalidIdentifier { master: String, identifier: String },
    #[error("master {master}: field {field} references unknown master {target}")]
    UnknownReference {
        master: String,
        field: String,
        target: String,
    },
    #[error("master {master}: label field {field} does not exist")]
    UnknownLabelField { master: String, field: String },
    #[error("master {master}: field {field} has an invalid pattern: {reason}")]
    InvalidPattern {
        master: String,
        field: String,
        reason: String,
    },
    #[error("master {master}: select field {field} has no options")]
    MissingOptions { master: String, field: String },
}

/// SQL 識別子として安全な名前か（小文字英字・数字・アンダースコア、先頭は英字かアンダースコア）。
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// MasterCatalog は登録済みマスタスキーマの順序付き一覧。
#[derive(Debug, Clone)]
pub struct MasterCatalog {
    schemas: Vec<MasterSchema>,
}

impl MasterCatalog {
    pub fn new(schemas: Vec<MasterSchema>) -> Self {
        Self { schemas }
    }

    /// 組み込みの 20 マスタを返す。
    pub fn builtin() -> Self {
        let mut schemas = Vec::new();
        schemas.extend(organization::system_masters());
        schemas.extend(product::product_masters());
        schemas.extend(trade::sales_masters());
        schemas.extend(trade::purchase_masters());
        schemas.extend(trade::customer_masters());
        schemas.extend(organization::hr_masters());
        schemas.extend(organization::finance_masters());
        schemas.extend(marketing::marketing_masters());
        schemas.extend(marketing::ai_masters());
        schemas.extend(organization::settings_masters());
        schemas.extend(organization::security_masters());
        Self { schemas }
    }

    pub fn get(&self, name: &str) -> Option<&MasterSchema> {
        self.schemas.iter().find(|s| s.name == name)
    }

    pub fn list(&self) -> &[MasterSchema] {
        &self.schemas
    }

    /// カテゴリ順に並べたスキーマ一覧。空のカテゴリは含めない。
    pub fn by_category(&self) -> Vec<(MasterCategory, Vec<&MasterSchema>)> {
        MasterCategory::ALL
            .iter()
            .filter_map(|category| {
                let schemas: Vec<&MasterSchema> = self
                    .schemas
                    .iter()
                    .filter(|s| s.category == *category)
                    .collect();
                (!schemas.is_empty()).then_some((*category, schemas))
            })
            .collect()
    }

    /// `name` を参照しているスキーマと項目（逆参照）。
    pub fn referencing(&self, name: &str) -> Vec<(&MasterSchema, &FieldDef)> {
        self.schemas
            .iter()
            .flat_map(|schema| {
                schema
                    .reference_fields()
                    .filter(move |f| f.references.as_deref() == Some(name))
                    .map(move |f| (schema, f))
            })
            .collect()
    }

    /// カタログ全体の整合性を検証し、見つかった問題をすべて返す。
    pub fn validate(&self) -> Result<(), Vec<CatalogError>> {
        let mut errors = Vec::new();
        let mut names = HashSet::new();

        for schema in &self.schemas {
            if !names.insert(schema.name.as_str()) {
                errors.push(CatalogError::DuplicateMaster(schema.name.clone()));
            }
            if !is_valid_identifier(&schema.table) {
                errors.push(CatalogError::InvalidIdentifier {
                    master: schema.name.clone(),
                    identifier: schema.table.clone(),
                });
            }
            if schema.field(&schema.label_field).is_none() {
                errors.push(CatalogError::UnknownLabelField {
                    master: schema.name.clone(),
                    field: schema.label_field.clone(),
                });
            }

            let mut keys = HashSet::new();
            for field in &schema.fields {
                self.validate_field(schema, field, &mut keys, &mut errors);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_field<'a>(
        &self,
        schema: &MasterSchema,
        field: &'a FieldDef,
        keys: &mut HashSet<&'a str>,
        errors: &mut Vec<CatalogError>,
    ) {
        if !keys.insert(field.key.as_str()) {
            errors.push(CatalogError::DuplicateField {
                master: schema.name.clone(),
                field: field.key.clone(),
            });
        }
        if !is_valid_identifier(&field.key) {
            errors.push(CatalogError::InvalidIdentifier {
                master: schema.name.clone(),
                identifier: field.key.clone(),
            });
        }
        if let Some(pattern) = &field.pattern {
            if let Err(e) = Regex::new(pattern) {
                errors.push(CatalogError::InvalidPattern {
                    master: schema.name.clone(),
                    field: field.key.clone(),
                    reason: e.to_string(),
                });
            }
        }
        if field.field_type == FieldType::Select && field.options.is_empty() {
            errors.push(CatalogError::MissingOptions {
                master: schema.name.clone(),
                field: field.key.clone(),
            });
        }
        if field.field_type == FieldType::Reference {
            let target = field.references.clone().unwrap_or_default();
            if self.get(&target).is_none() {
                errors.push(CatalogError::UnknownReference {
                    master: schema.name.clone(),
                    field: field.key.clone(),
                    target,
                });
            }
        }
    }
}

impl Default for MasterCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::master_schema::FieldDef;

    #[test]
    fn test_builtin_catalog_is_valid() {
        let catalog = MasterCatalog::builtin();
        assert_eq!(catalog.list().len(), 20);
        assert_eq!(catalog.validate(), Ok(()));
    }

    #[test]
    fn test_builtin_covers_every_category() {
        let catalog = MasterCatalog::builtin();
        let grouped = catalog.by_category();
        assert_eq!(grouped.len(), MasterCategory::ALL.len());
        let product = grouped
            .iter()
            .find(|(c, _)| *c == MasterCategory::Product)
            .unwrap();
        assert_eq!(product.1.len(), 6);
    }

    #[test]
    fn test_company_profile_cannot_be_deleted() {
        let catalog = MasterCatalog::builtin();
        let profile = catalog.get("company-profile").unwrap();
        assert!(!profile.allow_delete);
        assert!(catalog.get("brands").unwrap().allow_delete);
    }

    #[test]
    fn test_referencing_lists_reverse_references() {
        let catalog = MasterCatalog::builtin();
        let refs: Vec<(String, String)> = catalog
            .referencing("brands")
            .into_iter()
            .map(|(s, f)| (s.name.clone(), f.key.clone()))
            .collect();
        assert_eq!(refs, vec![("products".to_string(), "brand_id".to_string())]);
        assert!(catalog.referencing("roles").is_empty());
    }

    #[test]
    fn test_validate_reports_broken_schemas() {
        let broken = MasterSchema::new(
            "widgets",
            "Widgets",
            MasterCategory::Product,
            vec![
                FieldDef::text("name", "Name"),
                FieldDef::text("name", "Name again"),
                FieldDef::text("Bad-Key", "Bad"),
                FieldDef::text("code", "Code").pattern("([a-z"),
                FieldDef::select("kind", "Kind", &[]),
                FieldDef::reference("owner_id", "Owner", "owners"),
            ],
        )
        .label_field("title");
        let errors = MasterCatalog::new(vec![broken]).validate().unwrap_err();

        assert!(errors.iter().any(|e| matches!(e, CatalogError::DuplicateField { field, .. } if field == "name")));
        assert!(errors.iter().any(|e| matches!(e, CatalogError::InvalidIdentifier { identifier, .. } if identifier == "Bad-Key")));
        assert!(errors.iter().any(|e| matches!(e, CatalogError::InvalidPattern { .. })));
        assert!(errors.iter().any(|e| matches!(e, CatalogError::MissingOptions { .. })));
        assert!(errors.iter().any(|e| matches!(e, CatalogError::UnknownReference { target, .. } if target == "owners")));
        assert!(errors.iter().any(|e| matches!(e, CatalogError::UnknownLabelField { .. })));
    }

    #[test]
    fn test_is_valid_identifier() {
        assert!(is_valid_identifier("hsn_codes"));
        assert!(is_valid_identifier("_x1"));
        assert!(!is_valid_identifier("hsn-codes"));
        assert!(!is_valid_identifier("1abc"));
        assert!(!is_valid_identifier("name; drop"));
        assert!(!is_valid_identifier(""));
    }
}
