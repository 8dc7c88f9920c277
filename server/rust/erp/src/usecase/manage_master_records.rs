//! スキーマ駆動のマスタデータ CRUD。
//!
//! 20 のマスタすべてを 1 つのユースケースで扱う。マスタ名からスキーマを引き、
//! 検証・一意性・参照整合性の確認を経てリポジトリに委譲する。

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::catalog::MasterCatalog;
use crate::domain::entity::change_log::ChangeLog;
use crate::domain::entity::master_schema::MasterSchema;
use crate::domain::repository::master_record_repository::{
    DeleteOutcome, MasterOption, RecordQuery, SortKey,
};
use crate::domain::repository::{ConstraintViolation, MasterRecordRepository};
use crate::domain::service::record_validator::{
    normalize_value, reason, FieldViolation, RecordValidator, ValidationMode,
};
use crate::domain::service::schema_generator::SchemaGenerator;

/// 参照選択肢の最大件数。
pub const OPTIONS_LIMIT: u32 = 100;

#[derive(Debug, thiserror::Error)]
pub enum MasterDataError {
    #[error("unknown master: {0}")]
    UnknownMaster(String),
    #[error("{master} record not found: {id}")]
    NotFound { master: String, id: Uuid },
    #[error("validation failed")]
    Validation(Vec<FieldViolation>),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("duplicate value")]
    Duplicate(Vec<FieldViolation>),
    #[error("record is referenced by {0}")]
    InUse(String),
    #[error("operation not allowed: {0}")]
    NotAllowed(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// 一覧取得の未検証パラメータ（クエリ文字列そのまま）。
#[derive(Debug, Clone, Default)]
pub struct MasterListParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    /// `name,-created_at` 形式
    pub sort: Option<String>,
    pub search: Option<String>,
    /// `col:val,col2:val2` 形式
    pub filter: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct MasterSummary {
    pub name: String,
    pub title: String,
    pub description: String,
    pub field_count: usize,
    pub allow_create: bool,
    pub allow_update: bool,
    pub allow_delete: bool,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct CatalogGroup {
    pub category: String,
    pub masters: Vec<MasterSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MasterSchemaView {
    pub schema: MasterSchema,
    pub json_schema: Value,
}

/// クエリ文字列を検証済みの検索条件に変換する。
pub fn parse_query(
    schema: &MasterSchema,
    params: &MasterListParams,
) -> Result<RecordQuery, MasterDataError> {
    let (page, page_size) =
        super::page_window(params.page, params.page_size).map_err(MasterDataError::InvalidQuery)?;

    let sort_spec = params
        .sort
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(&schema.default_sort);
    let mut sort = Vec::new();
    for token in sort_spec.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let (column, descending) = match token.strip_prefix('-') {
            Some(column) => (column, true),
            None => (token, false),
        };
        if !schema.is_sortable(column) {
            return Err(MasterDataError::InvalidQuery(format!(
                "cannot sort {} by {column}",
                schema.name
            )));
        }
        sort.push(SortKey {
            column: column.to_string(),
            descending,
        });
    }

    let mut filters = Vec::new();
    if let Some(filter) = params.filter.as_deref() {
        for clause in filter.split(',').map(str::trim).filter(|c| !c.is_empty()) {
            let Some((column, raw)) = clause.split_once(':') else {
                return Err(MasterDataError::InvalidQuery(format!(
                    "filter clause must be column:value, got {clause}"
                )));
            };
            let column = column.trim();
            let Some(field) = schema.field(column) else {
                return Err(MasterDataError::InvalidQuery(format!(
                    "cannot filter {} by {column}",
                    schema.name
                )));
            };
            let value = normalize_value(field, &Value::String(raw.trim().to_string()))
                .map_err(|v| MasterDataError::InvalidQuery(v.message))?;
            let text = match value {
                Value::Null => {
                    return Err(MasterDataError::InvalidQuery(format!(
                        "filter value for {column} is empty"
                    )))
                }
                Value::String(s) => s,
                other => other.to_string(),
            };
            filters.push((column.to_string(), text));
        }
    }

    Ok(RecordQuery {
        page,
        page_size,
        sort,
        search: params
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        filters,
        is_active: params.is_active,
    })
}

fn map_write_error(schema: &MasterSchema, err: anyhow::Error) -> MasterDataError {
    match err.downcast_ref::<ConstraintViolation>() {
        Some(ConstraintViolation::Unique(column)) => {
            MasterDataError::Duplicate(vec![FieldViolation::new(
                column,
                reason::DUPLICATE_VALUE,
                format!("{column} already exists in {}", schema.name),
            )])
        }
        Some(ConstraintViolation::ForeignKey(column)) => {
            MasterDataError::Validation(vec![FieldViolation::new(
                column,
                reason::INVALID_REFERENCE,
                format!("{column} refers to a record that does not exist"),
            )])
        }
        None => MasterDataError::Internal(err.to_string()),
    }
}

pub struct ManageMasterRecordsUseCase {
    catalog: Arc<MasterCatalog>,
    repo: Arc<dyn MasterRecordRepository>,
}

impl ManageMasterRecordsUseCase {
    pub fn new(catalog: Arc<MasterCatalog>, repo: Arc<dyn MasterRecordRepository>) -> Self {
        Self { catalog, repo }
    }

    fn schema(&self, master: &str) -> Result<&MasterSchema, MasterDataError> {
        self.catalog
            .get(master)
            .ok_or_else(|| MasterDataError::UnknownMaster(master.to_string()))
    }

    pub async fn list(
        &self,
        master: &str,
        params: &MasterListParams,
    ) -> Result<(Vec<Value>, i64, RecordQuery), MasterDataError> {
        let schema = self.schema(master)?;
        let query = parse_query(schema, params)?;
        let (records, total) = self
            .repo
            .find_all(schema, &query)
            .await
            .map_err(|e| MasterDataError::Internal(e.to_string()))?;
        Ok((records, total, query))
    }

    pub async fn get(&self, master: &str, id: Uuid) -> Result<Value, MasterDataError> {
        let schema = self.schema(master)?;
        self.repo
            .find_by_id(schema, id)
            .await
            .map_err(|e| MasterDataError::Internal(e.to_string()))?
            .ok_or_else(|| MasterDataError::NotFound {
                master: master.to_string(),
                id,
            })
    }

    #[tracing::instrument(skip(self, payload), fields(master = %master))]
    pub async fn create(
        &self,
        master: &str,
        payload: &Value,
        actor: &str,
    ) -> Result<Value, MasterDataError> {
        let schema = self.schema(master)?;
        if !schema.allow_create {
            return Err(MasterDataError::NotAllowed(format!(
                "records cannot be created in {master}"
            )));
        }
        let record = RecordValidator::validate(schema, payload, ValidationMode::Create)
            .map_err(MasterDataError::Validation)?;
        self.check_references(schema, &record).await?;
        self.check_unique(schema, &record, None).await?;

        let created = self
            .repo
            .create(schema, &record, actor)
            .await
            .map_err(|e| map_write_error(schema, e))?;
        tracing::info!(master = %master, actor = %actor, "master record created");
        Ok(created)
    }

    #[tracing::instrument(skip(self, payload), fields(master = %master, id = %id))]
    pub async fn update(
        &self,
        master: &str,
        id: Uuid,
        payload: &Value,
        actor: &str,
    ) -> Result<Value, MasterDataError> {
        let schema = self.schema(master)?;
        if !schema.allow_update {
            return Err(MasterDataError::NotAllowed(format!(
                "records in {master} cannot be updated"
            )));
        }
        let record = RecordValidator::validate(schema, payload, ValidationMode::Update)
            .map_err(MasterDataError::Validation)?;
        self.check_references(schema, &record).await?;
        self.check_unique(schema, &record, Some(id)).await?;

        let updated = self
            .repo
            .update(schema, id, &record, actor)
            .await
            .map_err(|e| map_write_error(schema, e))?
            .ok_or_else(|| MasterDataError::NotFound {
                master: master.to_string(),
                id,
            })?;
        tracing::info!(master = %master, id = %id, actor = %actor, "master record updated");
        Ok(updated)
    }

    #[tracing::instrument(skip(self), fields(master = %master, id = %id))]
    pub async fn delete(&self, master: &str, id: Uuid, actor: &str) -> Result<Value, MasterDataError> {
        let schema = self.schema(master)?;
        if !schema.allow_delete {
            return Err(MasterDataError::NotAllowed(format!(
                "records in {master} cannot be deleted"
            )));
        }
        let exists = self
            .repo
            .exists(schema, id)
            .await
            .map_err(|e| MasterDataError::Internal(e.to_string()))?;
        if !exists {
            return Err(MasterDataError::NotFound {
                master: master.to_string(),
                id,
            });
        }

        for (referrer, field) in self.catalog.referencing(&schema.name) {
            let referenced = self
                .repo
                .is_referenced(referrer, &field.key, id)
                .await
                .map_err(|e| MasterDataError::Internal(e.to_string()))?;
            if referenced {
                return Err(MasterDataError::InUse(referrer.name.clone()));
            }
        }

        match self
            .repo
            .delete(schema, id, actor)
            .await
            .map_err(|e| MasterDataError::Internal(e.to_string()))?
        {
            DeleteOutcome::Deleted(before) => {
                tracing::info!(master = %master, id = %id, actor = %actor, "master record deleted");
                Ok(before)
            }
            DeleteOutcome::NotFound => Err(MasterDataError::NotFound {
                master: master.to_string(),
                id,
            }),
            DeleteOutcome::InUse => Err(MasterDataError::InUse("other documents".to_string())),
        }
    }

    pub async fn history(&self, master: &str, id: Uuid) -> Result<Vec<ChangeLog>, MasterDataError> {
        let schema = self.schema(master)?;
        self.repo
            .history(&schema.name, id)
            .await
            .map_err(|e| MasterDataError::Internal(e.to_string()))
    }

    pub async fn options(
        &self,
        master: &str,
        search: Option<String>,
    ) -> Result<Vec<MasterOption>, MasterDataError> {
        let schema = self.schema(master)?;
        let search = search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        self.repo
            .options(schema, search, OPTIONS_LIMIT)
            .await
            .map_err(|e| MasterDataError::Internal(e.to_string()))
    }

    pub fn catalog(&self) -> Vec<CatalogGroup> {
        self.catalog
            .by_category()
            .into_iter()
            .map(|(category, schemas)| CatalogGroup {
                category: category.as_str().to_string(),
                masters: schemas
                    .into_iter()
                    .map(|s| MasterSummary {
                        name: s.name.clone(),
                        title: s.title.clone(),
                        description: s.description.clone(),
                        field_count: s.fields.len(),
                        allow_create: s.allow_create,
                        allow_update: s.allow_update,
                        allow_delete: s.allow_delete,
                    })
                    .collect(),
            })
            .collect()
    }

    pub fn schema_view(&self, master: &str) -> Result<MasterSchemaView, MasterDataError> {
        let schema = self.schema(master)?;
        Ok(MasterSchemaView {
            schema: schema.clone(),
            json_schema: SchemaGenerator::json_schema(schema),
        })
    }

    /// 参照項目の参照先レコードが存在することを確認する。
    async fn check_references(
        &self,
        schema: &MasterSchema,
        record: &Map<String, Value>,
    ) -> Result<(), MasterDataError> {
        let mut violations = Vec::new();
        for field in schema.reference_fields() {
            let Some(Value::String(raw)) = record.get(&field.key) else {
                continue;
            };
            let Ok(target_id) = Uuid::parse_str(raw) else {
                continue;
            };
            let Some(target) = field.references.as_deref().and_then(|t| self.catalog.get(t))
            else {
                return Err(MasterDataError::Internal(format!(
                    "{}.{} references an unknown master",
                    schema.name, field.key
                )));
            };
            let exists = self
                .repo
                .exists(target, target_id)
                .await
                .map_err(|e| MasterDataError::Internal(e.to_string()))?;
            if !exists {
                violations.push(FieldViolation::new(
                    &field.key,
                    reason::INVALID_REFERENCE,
                    format!("{} {target_id} does not exist", target.title),
                ));
            }
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(MasterDataError::Validation(violations))
        }
    }

    async fn check_unique(
        &self,
        schema: &MasterSchema,
        record: &Map<String, Value>,
        exclude_id: Option<Uuid>,
    ) -> Result<(), MasterDataError> {
        let mut violations = Vec::new();
        for field in schema.unique_fields() {
            let Some(value) = record.get(&field.key).filter(|v| !v.is_null()) else {
                continue;
            };
            let taken = self
                .repo
                .exists_with_value(schema, &field.key, value, exclude_id)
                .await
                .map_err(|e| MasterDataError::Internal(e.to_string()))?;
            if taken {
                violations.push(FieldViolation::new(
                    &field.key,
                    reason::DUPLICATE_VALUE,
                    format!("{} {value} already exists", field.label),
                ));
            }
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(MasterDataError::Duplicate(violations))
        }
    }
}
