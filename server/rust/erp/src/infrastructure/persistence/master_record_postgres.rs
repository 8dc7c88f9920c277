use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use std::sync::Arc;
use std::time::Instant;

use yeelo_telemetry::metrics::Metrics;

use super::{
    contains_pattern, is_foreign_key_violation, map_constraint_error, observe_query,
    quote_identifier,
};
use crate::domain::entity::change_log::{ChangeLog, ChangeOperation};
use crate::domain::entity::master_schema::MasterSchema;
use crate::domain::repository::master_record_repository::{
    DeleteOutcome, MasterOption, MasterRecordRepository, RecordQuery,
};
use crate::domain::repository::offset;

/// マスタテーブルを格納する DB スキーマ。
const MASTERS_SCHEMA: &str = "masters";

/// MasterRecordPostgresRepository はスキーマ定義から SQL を組み立てるマスタレコードリポジトリ。
/// 値はすべてテキストでバインドし、列型へのキャストは SQL 側で行う。
pub struct MasterRecordPostgresRepository {
    pool: PgPool,
    metrics: Option<Arc<Metrics>>,
}

impl MasterRecordPostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            metrics: None,
        }
    }

    pub fn with_metrics(pool: PgPool, metrics: Arc<Metrics>) -> Self {
        Self {
            pool,
            metrics: Some(metrics),
        }
    }
}

fn table_name(schema: &MasterSchema) -> String {
    format!("{MASTERS_SCHEMA}.{}", quote_identifier(&schema.table))
}

/// JSON 値をバインド用のテキストに変換する。null は SQL の NULL。
fn bind_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// `$n::cast` 形式のプレースホルダ。
fn placeholder(schema: &MasterSchema, column: &str, index: usize) -> anyhow::Result<String> {
    let field = schema
        .field(column)
        .ok_or_else(|| anyhow::anyhow!("{column} is not a field of {}", schema.name))?;
    Ok(format!("${index}::{}", field.field_type.sql_cast()))
}

/// WHERE 句とバインド値。
struct Conditions {
    sql: String,
    binds: Vec<Option<String>>,
}

fn build_conditions(schema: &MasterSchema, query: &RecordQuery) -> anyhow::Result<Conditions> {
    let mut clauses = Vec::new();
    let mut binds = Vec::new();

    for (column, value) in &query.filters {
        binds.push(Some(value.clone()));
        clauses.push(format!(
            "{} = {}",
            quote_identifier(column),
            placeholder(schema, column, binds.len())?
        ));
    }

    if let Some(active) = query.is_active {
        binds.push(Some(active.to_string()));
        clauses.push(format!("is_active = ${}::boolean", binds.len()));
    }

    if let Some(search) = &query.search {
        let columns: Vec<String> = schema
            .searchable_fields()
            .map(|f| quote_identifier(&f.key))
            .collect();
        if !columns.is_empty() {
            binds.push(Some(contains_pattern(search)));
            let index = binds.len();
            let ors: Vec<String> = columns
                .iter()
                .map(|c| format!("{c}::text ILIKE ${index} ESCAPE '\\'"))
                .collect();
            clauses.push(format!("({})", ors.join(" OR ")));
        }
    }

    let sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    Ok(Conditions { sql, binds })
}

fn order_by(schema: &MasterSchema, query: &RecordQuery) -> String {
    let mut parts: Vec<String> = query
        .sort
        .iter()
        .map(|key| {
            format!(
                "{} {}",
                quote_identifier(&key.column),
                if key.descending { "DESC" } else { "ASC" }
            )
        })
        .collect();
    if parts.is_empty() {
        parts.push(format!("{} ASC", quote_identifier(&schema.default_sort)));
    }
    parts.push("id ASC".to_string());
    format!(" ORDER BY {}", parts.join(", "))
}

async fn lock_record(
    conn: &mut PgConnection,
    schema: &MasterSchema,
    id: Uuid,
) -> anyhow::Result<Option<Value>> {
    let sql = format!(
        "SELECT to_jsonb(t) FROM {} t WHERE id = $1 FOR UPDATE",
        table_name(schema)
    );
    let record = sqlx::query_scalar::<_, Value>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(record)
}

async fn insert_change_log(conn: &mut PgConnection, log: &ChangeLog) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO masters.change_logs
            (id, master, record_id, operation, before_data, after_data, changed_by, changed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(log.id)
    .bind(&log.master)
    .bind(log.record_id)
    .bind(log.operation.as_str())
    .bind(&log.before)
    .bind(&log.after)
    .bind(&log.changed_by)
    .bind(log.changed_at)
    .execute(conn)
    .await?;
    Ok(())
}

fn record_id(record: &Value) -> anyhow::Result<Uuid> {
    let id = record
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("record returned without id"))?;
    Ok(Uuid::parse_str(id)?)
}

#[async_trait]
impl MasterRecordRepository for MasterRecordPostgresRepository {
    async fn find_all(
        &self,
        schema: &MasterSchema,
        query: &RecordQuery,
    ) -> anyhow::Result<(Vec<Value>, i64)> {
        let start = Instant::now();
        let table = table_name(schema);
        let conditions = build_conditions(schema, query)?;

        let count_sql = format!("SELECT COUNT(*) FROM {table}{}", conditions.sql);
        let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
        for value in &conditions.binds {
            count_q = count_q.bind(value.clone());
        }
        let total = count_q.fetch_one(&self.pool).await?;

        let data_sql = format!(
            "SELECT to_jsonb(t) FROM {table} t{}{} LIMIT {} OFFSET {}",
            conditions.sql,
            order_by(schema, query),
            query.page_size,
            offset(query.page, query.page_size)
        );
        let mut data_q = sqlx::query_scalar::<_, Value>(&data_sql);
        for value in &conditions.binds {
            data_q = data_q.bind(value.clone());
        }
        let records = data_q.fetch_all(&self.pool).await?;

        observe_query(self.metrics.as_ref(), "find_all", &schema.table, start);
        Ok((records, total))
    }

    async fn find_by_id(&self, schema: &MasterSchema, id: Uuid) -> anyhow::Result<Option<Value>> {
        let start = Instant::now();
        let sql = format!(
            "SELECT to_jsonb(t) FROM {} t WHERE id = $1",
            table_name(schema)
        );
        let record = sqlx::query_scalar::<_, Value>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        observe_query(self.metrics.as_ref(), "find_by_id", &schema.table, start);
        Ok(record)
    }

    async fn exists_with_value(
        &self,
        schema: &MasterSchema,
        field: &str,
        value: &Value,
        exclude_id: Option<Uuid>,
    ) -> anyhow::Result<bool> {
        let def = schema
            .field(field)
            .ok_or_else(|| anyhow::anyhow!("{field} is not a field of {}", schema.name))?;
        let column = quote_identifier(field);
        // 文字列項目は大文字小文字を区別せずに比較する
        let predicate = if def.field_type.is_textual() {
            format!("lower({column}) = lower($1)")
        } else {
            format!("{column} = $1::{}", def.field_type.sql_cast())
        };
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE {predicate} AND ($2::uuid IS NULL OR id <> $2))",
            table_name(schema)
        );
        let exists = sqlx::query_scalar::<_, bool>(&sql)
            .bind(bind_text(value))
            .bind(exclude_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn exists(&self, schema: &MasterSchema, id: Uuid) -> anyhow::Result<bool> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1)",
            table_name(schema)
        );
        let exists = sqlx::query_scalar::<_, bool>(&sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn create(
        &self,
        schema: &MasterSchema,
        record: &Map<String, Value>,
        actor: &str,
    ) -> anyhow::Result<Value> {
        let start = Instant::now();
        let mut columns = Vec::new();
        let mut placeholders = Vec::new();
        let mut binds = Vec::new();
        for (key, value) in record {
            binds.push(bind_text(value));
            columns.push(quote_identifier(key));
            placeholders.push(placeholder(schema, key, binds.len())?);
        }
        let actor_index = binds.len() + 1;
        columns.extend(["created_by".to_string(), "updated_by".to_string()]);
        placeholders.extend([format!("${actor_index}"), format!("${actor_index}")]);

        let sql = format!(
            "INSERT INTO {} AS t ({}) VALUES ({}) RETURNING to_jsonb(t)",
            table_name(schema),
            columns.join(", "),
            placeholders.join(", ")
        );

        let mut tx = self.pool.begin().await?;
        let mut q = sqlx::query_scalar::<_, Value>(&sql);
        for value in &binds {
            q = q.bind(value.clone());
        }
        let created = q
            .bind(actor)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_constraint_error(e, &schema.table))?;

        let log = ChangeLog::new(
            &schema.name,
            record_id(&created)?,
            ChangeOperation::Create,
            None,
            Some(created.clone()),
            actor,
        );
        insert_change_log(&mut tx, &log).await?;
        tx.commit().await?;

        observe_query(self.metrics.as_ref(), "create", &schema.table, start);
        Ok(created)
    }

    async fn update(
        &self,
        schema: &MasterSchema,
        id: Uuid,
        record: &Map<String, Value>,
        actor: &str,
    ) -> anyhow::Result<Option<Value>> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await?;
        let Some(before) = lock_record(&mut tx, schema, id).await? else {
            return Ok(None);
        };

        let mut sets = Vec::new();
        let mut binds = Vec::new();
        for (key, value) in record {
            binds.push(bind_text(value));
            sets.push(format!(
                "{} = {}",
                quote_identifier(key),
                placeholder(schema, key, binds.len())?
            ));
        }
        let actor_index = binds.len() + 1;
        let id_index = binds.len() + 2;
        sets.push("updated_at = NOW()".to_string());
        sets.push(format!("updated_by = ${actor_index}"));

        let sql = format!(
            "UPDATE {} AS t SET {} WHERE id = ${id_index} RETURNING to_jsonb(t)",
            table_name(schema),
            sets.join(", ")
        );
        let mut q = sqlx::query_scalar::<_, Value>(&sql);
        for value in &binds {
            q = q.bind(value.clone());
        }
        let updated = q
            .bind(actor)
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_constraint_error(e, &schema.table))?;

        let log = ChangeLog::new(
            &schema.name,
            id,
            ChangeOperation::Update,
            Some(before),
            Some(updated.clone()),
            actor,
        );
        insert_change_log(&mut tx, &log).await?;
        tx.commit().await?;

        observe_query(self.metrics.as_ref(), "update", &schema.table, start);
        Ok(Some(updated))
    }

    async fn delete(
        &self,
        schema: &MasterSchema,
        id: Uuid,
        actor: &str,
    ) -> anyhow::Result<DeleteOutcome> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await?;
        let Some(before) = lock_record(&mut tx, schema, id).await? else {
            return Ok(DeleteOutcome::NotFound);
        };

        let sql = format!("DELETE FROM {} WHERE id = $1", table_name(schema));
        match sqlx::query(&sql).bind(id).execute(&mut *tx).await {
            Ok(_) => {}
            // 在庫・伝票などマスタ外からの参照
            Err(e) if is_foreign_key_violation(&e) => return Ok(DeleteOutcome::InUse),
            Err(e) => return Err(e.into()),
        }

        let log = ChangeLog::new(
            &schema.name,
            id,
            ChangeOperation::Delete,
            Some(before.clone()),
            None,
            actor,
        );
        insert_change_log(&mut tx, &log).await?;
        tx.commit().await?;

        observe_query(self.metrics.as_ref(), "delete", &schema.table, start);
        Ok(DeleteOutcome::Deleted(before))
    }

    async fn is_referenced(
        &self,
        schema: &MasterSchema,
        field: &str,
        id: Uuid,
    ) -> anyhow::Result<bool> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = $1)",
            table_name(schema),
            quote_identifier(field)
        );
        let referenced = sqlx::query_scalar::<_, bool>(&sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(referenced)
    }

    async fn history(&self, master: &str, id: Uuid) -> anyhow::Result<Vec<ChangeLog>> {
        let rows = sqlx::query_as::<_, ChangeLogRow>(
            r#"
            SELECT id, master, record_id, operation, before_data, after_data, changed_by, changed_at
            FROM masters.change_logs
            WHERE master = $1 AND record_id = $2
            ORDER BY changed_at DESC
            "#,
        )
        .bind(master)
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn options(
        &self,
        schema: &MasterSchema,
        search: Option<String>,
        limit: u32,
    ) -> anyhow::Result<Vec<MasterOption>> {
        let label = quote_identifier(&schema.label_field);
        let sql = format!(
            r#"
            SELECT id, COALESCE({label}::text, '') AS label
            FROM {}
            WHERE is_active AND ($1::text IS NULL OR {label}::text ILIKE $1 ESCAPE '\')
            ORDER BY {label} ASC, id ASC
            LIMIT $2
            "#,
            table_name(schema)
        );
        let rows = sqlx::query_as::<_, (Uuid, String)>(&sql)
            .bind(search.as_deref().map(contains_pattern))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(value, label)| MasterOption { value, label })
            .collect())
    }
}

#[derive(sqlx::FromRow)]
struct ChangeLogRow {
    id: Uuid,
    master: String,
    record_id: Uuid,
    operation: String,
    before_data: Option<Value>,
    after_data: Option<Value>,
    changed_by: String,
    changed_at: DateTime<Utc>,
}

impl TryFrom<ChangeLogRow> for ChangeLog {
    type Error = anyhow::Error;

    fn try_from(row: ChangeLogRow) -> Result<Self, Self::Error> {
        Ok(ChangeLog {
            id: row.id,
            master: row.master,
            record_id: row.record_id,
            operation: row.operation.parse().map_err(anyhow::Error::msg)?,
            before: row.before_data,
            after: row.after_data,
            changed_by: row.changed_by,
            changed_at: row.changed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::MasterCatalog;
    use crate::domain::repository::master_record_repository::SortKey;

    #[test]
    fn test_build_conditions_casts_filters() {
        let catalog = MasterCatalog::builtin();
        let schema = catalog.get("products").unwrap();
        let query = RecordQuery {
            filters: vec![
                ("gst_rate".to_string(), "12".to_string()),
                ("sku".to_string(), "ARN-30".to_string()),
            ],
            is_active: Some(true),
            search: Some("arnica".to_string()),
            ..RecordQuery::default()
        };
        let conditions = build_conditions(schema, &query).unwrap();
        assert!(conditions.sql.contains("\"gst_rate\" = $1::numeric"));
        assert!(conditions.sql.contains("\"sku\" = $2::text"));
        assert!(conditions.sql.contains("is_active = $3::boolean"));
        assert!(conditions.sql.contains("\"name\"::text ILIKE $4 ESCAPE '\\'"));
        assert_eq!(conditions.binds.len(), 4);
        assert_eq!(conditions.binds[3].as_deref(), Some("%arnica%"));
    }

    #[test]
    fn test_search_wildcards_match_literally() {
        let catalog = MasterCatalog::builtin();
        let query = RecordQuery {
            search: Some("100%_pure".to_string()),
            ..RecordQuery::default()
        };
        let conditions = build_conditions(catalog.get("brands").unwrap(), &query).unwrap();
        assert_eq!(conditions.binds[0].as_deref(), Some("%100\\%\\_pure%"));
        assert!(conditions.sql.contains("ESCAPE '\\'"));
    }

    #[test]
    fn test_build_conditions_rejects_unknown_column() {
        let catalog = MasterCatalog::builtin();
        let query = RecordQuery {
            filters: vec![("nope".to_string(), "x".to_string())],
            ..RecordQuery::default()
        };
        assert!(build_conditions(catalog.get("brands").unwrap(), &query).is_err());
    }

    #[test]
    fn test_order_by_defaults_to_schema_sort() {
        let catalog = MasterCatalog::builtin();
        let schema = catalog.get("banks").unwrap();
        assert_eq!(
            order_by(schema, &RecordQuery::default()),
            " ORDER BY \"bank_name\" ASC, id ASC"
        );

        let query = RecordQuery {
            sort: vec![SortKey {
                column: "created_at".to_string(),
                descending: true,
            }],
            ..RecordQuery::default()
        };
        assert_eq!(
            order_by(schema, &query),
            " ORDER BY \"created_at\" DESC, id ASC"
        );
    }

    #[test]
    fn test_bind_text() {
        assert_eq!(bind_text(&Value::Null), None);
        assert_eq!(bind_text(&serde_json::json!(12.5)).as_deref(), Some("12.5"));
        assert_eq!(bind_text(&serde_json::json!(true)).as_deref(), Some("true"));
        assert_eq!(bind_text(&serde_json::json!("SBL")).as_deref(), Some("SBL"));
    }
}
