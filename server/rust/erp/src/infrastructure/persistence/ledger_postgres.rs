use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use yeelo_outbox::{OutboxMessage, PostgresOutboxStore};
use yeelo_telemetry::metrics::Metrics;

use super::observe_query;
use crate::domain::entity::financial_report::{AccountMovement, AccountTotals};
use crate::domain::entity::journal_entry::{JournalEntry, JournalLine};
use crate::domain::entity::ledger_account::LedgerAccount;
use crate::domain::repository::ledger_repository::{EntryFilter, LedgerRepository};
use crate::domain::repository::offset;

/// LedgerPostgresRepository は勘定科目と仕訳の PostgreSQL 実装。
pub struct LedgerPostgresRepository {
    pool: PgPool,
    metrics: Option<Arc<Metrics>>,
}

impl LedgerPostgresRepository {
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

/// 呼び出し側のトランザクション上で仕訳を書き込む。明細の勘定はコードで解決する。
pub(crate) async fn insert_entry(
    conn: &mut PgConnection,
    entry: &JournalEntry,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO finance.journal_entries
            (id, entry_number, entry_date, narration, source_type, source_id,
             total_debit, total_credit, created_by, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(entry.id)
    .bind(&entry.entry_number)
    .bind(entry.entry_date)
    .bind(&entry.narration)
    .bind(entry.source_type.as_str())
    .bind(entry.source_id)
    .bind(entry.total_debit)
    .bind(entry.total_credit)
    .bind(&entry.created_by)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;

    for (line_no, line) in entry.lines.iter().enumerate() {
        let inserted = sqlx::query(
            r#"
            INSERT INTO finance.journal_lines
                (id, entry_id, line_no, account_id, debit, credit, description)
            SELECT $1, $2, $3, a.id, $5, $6, $7
            FROM finance.ledger_accounts a
            WHERE a.code = $4
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.id)
        .bind(i32::try_from(line_no)?)
        .bind(&line.account_code)
        .bind(line.debit)
        .bind(line.credit)
        .bind(&line.description)
        .execute(&mut *conn)
        .await?;
        if inserted.rows_affected() == 0 {
            anyhow::bail!("unknown ledger account code: {}", line.account_code);
        }
    }
    Ok(())
}

/// 業務トランザクション内で仕訳とイベントを書き込む。
pub(crate) async fn insert_entry_and_event(
    conn: &mut PgConnection,
    entry: Option<&JournalEntry>,
    event: &OutboxMessage,
) -> anyhow::Result<()> {
    if let Some(entry) = entry {
        insert_entry(conn, entry).await?;
    }
    PostgresOutboxStore::insert_in_tx(conn, event).await?;
    Ok(())
}

const ENTRY_COLUMNS: &str = "id, entry_number, entry_date, narration, source_type, source_id, \
                             total_debit, total_credit, created_by, created_at";

async fn load_lines(
    pool: &PgPool,
    entry_ids: &[Uuid],
) -> anyhow::Result<HashMap<Uuid, Vec<JournalLine>>> {
    let rows = sqlx::query_as::<_, JournalLineRow>(
        r#"
        SELECT l.entry_id, a.code AS account_code, a.name AS account_name,
               l.debit, l.credit, l.description
        FROM finance.journal_lines l
        JOIN finance.ledger_accounts a ON a.id = l.account_id
        WHERE l.entry_id = ANY($1)
        ORDER BY l.entry_id, l.line_no
        "#,
    )
    .bind(entry_ids)
    .fetch_all(pool)
    .await?;

    let mut lines: HashMap<Uuid, Vec<JournalLine>> = HashMap::new();
    for row in rows {
        lines.entry(row.entry_id).or_default().push(JournalLine {
            account_code: row.account_code,
            account_name: Some(row.account_name),
            debit: row.debit,
            credit: row.credit,
            description: row.description,
        });
    }
    Ok(lines)
}

async fn with_lines(pool: &PgPool, rows: Vec<JournalEntryRow>) -> anyhow::Result<Vec<JournalEntry>> {
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let mut lines = load_lines(pool, &ids).await?;
    rows.into_iter()
        .map(|row| {
            let entry_lines = lines.remove(&row.id).unwrap_or_default();
            row.into_entry(entry_lines)
        })
        .collect()
}

#[async_trait]
impl LedgerRepository for LedgerPostgresRepository {
    async fn list_accounts(&self) -> anyhow::Result<Vec<LedgerAccount>> {
        let rows = sqlx::query_as::<_, LedgerAccountRow>(
            r#"
            SELECT id, code, name, account_type, parent_code, is_system, is_active, created_at
            FROM finance.ledger_accounts
            ORDER BY code
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn find_account_by_id(&self, id: Uuid) -> anyhow::Result<Option<LedgerAccount>> {
        let row = sqlx::query_as::<_, LedgerAccountRow>(
            r#"
            SELECT id, code, name, account_type, parent_code, is_system, is_active, created_at
            FROM finance.ledger_accounts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn find_account_by_code(&self, code: &str) -> anyhow::Result<Option<LedgerAccount>> {
        let row = sqlx::query_as::<_, LedgerAccountRow>(
            r#"
            SELECT id, code, name, account_type, parent_code, is_system, is_active, created_at
            FROM finance.ledger_accounts
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn create_account(&self, account: &LedgerAccount) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO finance.ledger_accounts
                (id, code, name, account_type, parent_code, is_system, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (code) DO NOTHING
            "#,
        )
        .bind(account.id)
        .bind(&account.code)
        .bind(&account.name)
        .bind(account.account_type.as_str())
        .bind(&account.parent_code)
        .bind(account.is_system)
        .bind(account.is_active)
        .bind(account.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn post_entry(
        &self,
        entry: &JournalEntry,
        event: Option<OutboxMessage>,
    ) -> anyhow::Result<()> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await?;
        insert_entry(&mut tx, entry).await?;
        if let Some(event) = &event {
            PostgresOutboxStore::insert_in_tx(&mut tx, event).await?;
        }
        tx.commit().await?;
        observe_query(self.metrics.as_ref(), "post_entry", "finance.journal_entries", start);
        Ok(())
    }

    async fn find_entry(&self, id: Uuid) -> anyhow::Result<Option<JournalEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM finance.journal_entries WHERE id = $1");
        let Some(row) = sqlx::query_as::<_, JournalEntryRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };
        let mut entries = with_lines(&self.pool, vec![row]).await?;
        Ok(entries.pop())
    }

    async fn list_entries(
        &self,
        filter: &EntryFilter,
    ) -> anyhow::Result<(Vec<JournalEntry>, i64)> {
        const WHERE: &str = "WHERE ($1::date IS NULL OR entry_date >= $1) \
                             AND ($2::date IS NULL OR entry_date <= $2) \
                             AND ($3::text IS NULL OR source_type = $3)";
        let start = Instant::now();
        let source_type = filter.source_type.map(|s| s.as_str());

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM finance.journal_entries {WHERE}"
        ))
        .bind(filter.from)
        .bind(filter.to)
        .bind(source_type)
        .fetch_one(&self.pool)
        .await?;

        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM finance.journal_entries {WHERE} \
             ORDER BY entry_date DESC, created_at DESC LIMIT $4 OFFSET $5"
        );
        let rows = sqlx::query_as::<_, JournalEntryRow>(&sql)
            .bind(filter.from)
            .bind(filter.to)
            .bind(source_type)
            .bind(i64::from(filter.page_size))
            .bind(offset(filter.page, filter.page_size))
            .fetch_all(&self.pool)
            .await?;

        let entries = with_lines(&self.pool, rows).await?;
        observe_query(self.metrics.as_ref(), "list_entries", "finance.journal_entries", start);
        Ok((entries, total))
    }

    async fn opening_totals(
        &self,
        account_id: Uuid,
        before: NaiveDate,
    ) -> anyhow::Result<(Decimal, Decimal)> {
        let totals: (Decimal, Decimal) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(l.debit), 0), COALESCE(SUM(l.credit), 0)
            FROM finance.journal_lines l
            JOIN finance.journal_entries e ON e.id = l.entry_id
            WHERE l.account_id = $1 AND e.entry_date < $2
            "#,
        )
        .bind(account_id)
        .bind(before)
        .fetch_one(&self.pool)
        .await?;
        Ok(totals)
    }

    async fn account_movements(
        &self,
        account_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> anyhow::Result<Vec<AccountMovement>> {
        let rows = sqlx::query_as::<_, AccountMovementRow>(
            r#"
            SELECT e.id AS entry_id, e.entry_number, e.entry_date, e.narration, e.source_type,
                   l.debit, l.credit
            FROM finance.journal_lines l
            JOIN finance.journal_entries e ON e.id = l.entry_id
            WHERE l.account_id = $1
              AND ($2::date IS NULL OR e.entry_date >= $2)
              AND ($3::date IS NULL OR e.entry_date <= $3)
            ORDER BY e.entry_date, e.created_at, l.line_no
            "#,
        )
        .bind(account_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn account_totals(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> anyhow::Result<Vec<AccountTotals>> {
        let start = Instant::now();
        let rows = sqlx::query_as::<_, AccountTotalsRow>(
            r#"
            SELECT a.id AS account_id, a.code, a.name, a.account_type,
                   COALESCE(SUM(m.debit), 0) AS debit,
                   COALESCE(SUM(m.credit), 0) AS credit
            FROM finance.ledger_accounts a
            LEFT JOIN (
                SELECT l.account_id, l.debit, l.credit
                FROM finance.journal_lines l
                JOIN finance.journal_entries e ON e.id = l.entry_id
                WHERE ($1::date IS NULL OR e.entry_date >= $1)
                  AND ($2::date IS NULL OR e.entry_date <= $2)
            ) m ON m.account_id = a.id
            GROUP BY a.id, a.code, a.name, a.account_type
            ORDER BY a.code
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        observe_query(self.metrics.as_ref(), "account_totals", "finance.journal_lines", start);
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct LedgerAccountRow {
    id: Uuid,
    code: String,
    name: String,
    account_type: String,
    parent_code: Option<String>,
    is_system: bool,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<LedgerAccountRow> for LedgerAccount {
    type Error = anyhow::Error;

    fn try_from(row: LedgerAccountRow) -> Result<Self, Self::Error> {
        Ok(LedgerAccount {
            id: row.id,
            code: row.code,
            name: row.name,
            account_type: row.account_type.parse().map_err(anyhow::Error::msg)?,
            parent_code: row.parent_code,
            is_system: row.is_system,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct JournalEntryRow {
    id: Uuid,
    entry_number: String,
    entry_date: NaiveDate,
    narration: String,
    source_type: String,
    source_id: Option<Uuid>,
    total_debit: Decimal,
    total_credit: Decimal,
    created_by: String,
    created_at: DateTime<Utc>,
}

impl JournalEntryRow {
    fn into_entry(self, lines: Vec<JournalLine>) -> anyhow::Result<JournalEntry> {
        Ok(JournalEntry {
            id: self.id,
            entry_number: self.entry_number,
            entry_date: self.entry_date,
            narration: self.narration,
            source_type: self.source_type.parse().map_err(anyhow::Error::msg)?,
            source_id: self.source_id,
            lines,
            total_debit: self.total_debit,
            total_credit: self.total_credit,
            created_by: self.created_by,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct JournalLineRow {
    entry_id: Uuid,
    account_code: String,
    account_name: String,
    debit: Decimal,
    credit: Decimal,
    description: Option<String>,
}

#[derive(sqlx::FromRow)]
struct AccountMovementRow {
    entry_id: Uuid,
    entry_number: String,
    entry_date: NaiveDate,
    narration: String,
    source_type: String,
    debit: Decimal,
    credit: Decimal,
}

impl TryFrom<AccountMovementRow> for AccountMovement {
    type Error = anyhow::Error;

    fn try_from(row: AccountMovementRow) -> Result<Self, Self::Error> {
        Ok(AccountMovement {
            entry_id: row.entry_id,
            entry_number: row.entry_number,
            entry_date: row.entry_date,
            narration: row.narration,
            source_type: row.source_type.parse().map_err(anyhow::Error::msg)?,
            debit: row.debit,
            credit: row.credit,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AccountTotalsRow {
    account_id: Uuid,
    code: String,
    name: String,
    account_type: String,
    debit: Decimal,
    credit: Decimal,
}

impl TryFrom<AccountTotalsRow> for AccountTotals {
    type Error = anyhow::Error;

    fn try_from(row: AccountTotalsRow) -> Result<Self, Self::Error> {
        Ok(AccountTotals {
            account_id: row.account_id,
            code: row.code,
            name: row.name,
            account_type: row.account_type.parse().map_err(anyhow::Error::msg)?,
            debit: row.debit,
            credit: row.credit,
        })
    }
}
