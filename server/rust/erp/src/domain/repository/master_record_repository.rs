use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::entity::change_log::ChangeLog;
use crate::domain::entity::master_schema::MasterSchema;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub column: String,
    pub descending: bool,
}

/// RecordQuery は検証済みの一覧検索条件。列名はスキーマ上の項目であることが保証されている。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    pub page: u32,
    pub page_size: u32,
    pub sort: Vec<SortKey>,
    pub search: Option<String>,
    pub filters: Vec<(String, String)>,
    pub is_active: Option<bool>,
}

impl Default for RecordQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
            sort: Vec::new(),
            search: None,
            filters: Vec::new(),
            is_active: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    Deleted(Value),
    NotFound,
    /// 外部キー制約により削除できない
    InUse,
}

/// 参照選択用の選択肢。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct MasterOption {
    pub value: Uuid,
    pub label: String,
}

/// MasterRecordRepository はスキーマ駆動のマスタレコード永続化を担う。
/// create / update / delete は変更履歴を同一トランザクションで記録する。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MasterRecordRepository: Send + Sync {
    async fn find_all(
        &self,
        schema: &MasterSchema,
        query: &RecordQuery,
    ) -> anyhow::Result<(Vec<Value>, i64)>;

    async fn find_by_id(&self, schema: &MasterSchema, id: Uuid) -> anyhow::Result<Option<Value>>;

    /// `field` に `value` を持つレコードが存在するか。`exclude_id` は自身を除外する。
    async fn exists_with_value(
        &self,
        schema: &MasterSchema,
        field: &str,
        value: &Value,
        exclude_id: Option<Uuid>,
    ) -> anyhow::Result<bool>;

    async fn exists(&self, schema: &MasterSchema, id: Uuid) -> anyhow::Result<bool>;

    async fn create(
        &self,
        schema: &MasterSchema,
        record: &Map<String, Value>,
        actor: &str,
    ) -> anyhow::Result<Value>;

    /// 対象が存在しない場合は None。
    async fn update(
        &self,
        schema: &MasterSchema,
        id: Uuid,
        record: &Map<String, Value>,
        actor: &str,
    ) -> anyhow::Result<Option<Value>>;

    async fn delete(
        &self,
        schema: &MasterSchema,
        id: Uuid,
        actor: &str,
    ) -> anyhow::Result<DeleteOutcome>;

    /// `schema` の `field` が `id` を参照しているレコードがあるか。
    async fn is_referenced(
        &self,
        schema: &MasterSchema,
        field: &str,
        id: Uuid,
    ) -> anyhow::Result<bool>;

    /// 変更履歴を新しい順に返す。
    async fn history(&self, master: &str, id: Uuid) -> anyhow::Result<Vec<ChangeLog>>;

    async fn options(
        &self,
        schema: &MasterSchema,
        search: Option<String>,
        limit: u32,
    ) -> anyhow::Result<Vec<MasterOption>>;
}
