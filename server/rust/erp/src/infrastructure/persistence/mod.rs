pub mod in_memory;
pub mod inventory_postgres;
pub mod ledger_postgres;
pub mod master_record_postgres;
pub mod purchase_postgres;
pub mod sales_postgres;

pub use in_memory::InMemoryStore;
pub use inventory_postgres::InventoryPostgresRepository;
pub use ledger_postgres::LedgerPostgresRepository;
pub use master_record_postgres::MasterRecordPostgresRepository;
pub use purchase_postgres::PurchasePostgresRepository;
pub use sales_postgres::SalesPostgresRepository;

use std::sync::Arc;
use std::time::Instant;

use yeelo_telemetry::metrics::Metrics;

use crate::domain::repository::ConstraintViolation;

/// 入荷承認で記録する在庫移動の参照種別。
pub const GRN_REFERENCE: &str = "GOODS_RECEIPT";

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// SQL 識別子を二重引用符で囲む。内部の二重引用符はエスケープする。
pub(crate) fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// DB クエリの所要時間を記録する。metrics 未設定なら何もしない。
pub(crate) fn observe_query(
    metrics: Option<&Arc<Metrics>>,
    query_name: &str,
    table: &str,
    started: Instant,
) {
    if let Some(m) = metrics {
        m.record_db_query_duration(query_name, table, started.elapsed().as_secs_f64());
    }
}

/// 部分一致検索用の ILIKE パターン。`\` `%` `_` をエスケープし、`ESCAPE '\'` と組み合わせて使う。
pub(crate) fn contains_pattern(search: &str) -> String {
    let mut pattern = String::with_capacity(search.len() + 2);
    pattern.push('%');
    for c in search.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// 一意制約・外部キー制約の違反を `ConstraintViolation` に変換する。
/// それ以外の DB エラーはそのまま返す。
pub(crate) fn map_constraint_error(err: sqlx::Error, table: &str) -> anyhow::Error {
    if let sqlx::Error::Database(db) = &err {
        let column = db
            .constraint()
            .map(|c| constraint_column(c, table))
            .unwrap_or_default();
        match db.code().as_deref() {
            Some(UNIQUE_VIOLATION) => return ConstraintViolation::Unique(column).into(),
            Some(FOREIGN_KEY_VIOLATION) => return ConstraintViolation::ForeignKey(column).into(),
            _ => {}
        }
    }
    err.into()
}

/// PostgreSQL の既定の制約名（`{table}_{column}_key` / `{table}_{column}_fkey`）から列名を取り出す。
fn constraint_column(constraint: &str, table: &str) -> String {
    let trimmed = constraint
        .strip_prefix(table)
        .and_then(|s| s.strip_prefix('_'))
        .unwrap_or(constraint);
    trimmed
        .strip_suffix("_fkey")
        .or_else(|| trimmed.strip_suffix("_key"))
        .unwrap_or(trimmed)
        .to_string()
}

/// 外部キー違反か。
pub(crate) fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(FOREIGN_KEY_VIOLATION))
}
