//! データベースなしで動作するインメモリストア。
//!
//! 開発用の起動とルーターのテストで使う。すべてのリポジトリトレイトと `OutboxStore` を
//! 1 つのロックの下で実装し、書き込みは検証を終えてから状態を変更する（途中失敗で部分更新しない）。

use std::cmp::Ordering;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;
use yeelo_outbox::{OutboxError, OutboxMessage, OutboxStatus, OutboxStore};

use super::GRN_REFERENCE;
use crate::domain::catalog::MasterCatalog;
use crate::domain::entity::change_log::{ChangeLog, ChangeOperation};
use crate::domain::entity::financial_report::{AccountMovement, AccountTotals};
use crate::domain::entity::goods_receipt::{GoodsReceipt, GrnStatus};
use crate::domain::entity::inventory_batch::{weighted_average_cost, InventoryBatch};
use crate::domain::entity::journal_entry::JournalEntry;
use crate::domain::entity::ledger_account::LedgerAccount;
use crate::domain::entity::master_schema::{FieldDef, FieldType, MasterSchema};
use crate::domain::entity::party::{CustomerSnapshot, ProductSnapshot, SupplierSnapshot};
use crate::domain::entity::sales_invoice::{InvoiceStatus, SalesInvoice};
use crate::domain::entity::stock_movement::{MovementType, StockMovement};
use crate::domain::repository::inventory_repository::{
    AdjustmentOutcome, InventoryRepository, MovementFilter, StockAdjustment,
};
use crate::domain::repository::ledger_repository::{EntryFilter, LedgerRepository};
use crate::domain::repository::master_record_repository::{
    DeleteOutcome, MasterOption, MasterRecordRepository, RecordQuery,
};
use crate::domain::repository::purchase_repository::{GrnApproval, GrnFilter, PurchaseRepository};
use crate::domain::repository::sales_repository::{
    InvoiceCancellation, InvoiceFilter, InvoicePosting, PostingOutcome, SalesRepository,
};
use crate::domain::repository::{offset, ConstraintViolation};
use crate::domain::service::posting_rules::SYSTEM_ACCOUNTS;

#[derive(Default)]
struct State {
    masters: HashMap<String, Vec<Value>>,
    change_logs: Vec<ChangeLog>,
    batches: Vec<InventoryBatch>,
    movements: Vec<StockMovement>,
    grns: Vec<GoodsReceipt>,
    invoices: Vec<SalesInvoice>,
    accounts: Vec<LedgerAccount>,
    entries: Vec<JournalEntry>,
    outbox: Vec<OutboxMessage>,
}

/// InMemoryStore はインメモリの ERP ストア。勘定科目表はシステム勘定で初期化される。
pub struct InMemoryStore {
    catalog: Arc<MasterCatalog>,
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new(catalog: Arc<MasterCatalog>) -> Self {
        let accounts = SYSTEM_ACCOUNTS
            .iter()
            .map(|(code, name, account_type)| {
                let mut account = LedgerAccount::new(code, name, *account_type, None);
                account.is_system = true;
                account
            })
            .collect();
        Self {
            catalog,
            state: RwLock::new(State {
                accounts,
                ..State::default()
            }),
        }
    }

    /// ロットを直接登録する（テスト・初期データ用）。
    pub async fn seed_batch(&self, batch: InventoryBatch) {
        self.state.write().await.batches.push(batch);
    }

    /// 保存済みのアウトボックスメッセージ（登録順）。
    pub async fn outbox_messages(&self) -> Vec<OutboxMessage> {
        self.state.read().await.outbox.clone()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(Arc::new(MasterCatalog::builtin()))
    }
}

fn record_uuid(record: &Value) -> Option<Uuid> {
    record
        .get("id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
}

fn decimal_of(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => Decimal::from_str(s).ok(),
        _ => None,
    }
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn opt_string(record: &Value, key: &str) -> Option<String> {
    record.get(key).and_then(Value::as_str).map(str::to_string)
}

fn int_of(record: &Value, key: &str) -> i32 {
    record
        .get(key)
        .and_then(Value::as_i64)
        .and_then(|v| i32::try_from(v).ok())
        .unwrap_or(0)
}

fn is_active(record: &Value) -> bool {
    record.get("is_active").and_then(Value::as_bool).unwrap_or(true)
}

/// NULL は非 NULL より大きい（PostgreSQL の昇順と同じく末尾に並ぶ）。
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(_), Value::Number(_)) => decimal_of(a).cmp(&decimal_of(b)),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => text_of(a).cmp(&text_of(b)),
    }
}

fn values_equal(field: &FieldDef, a: &Value, b: &Value) -> bool {
    match field.field_type {
        FieldType::Number | FieldType::Integer => {
            decimal_of(a).is_some() && decimal_of(a) == decimal_of(b)
        }
        _ => !a.is_null() && text_of(a) == text_of(b),
    }
}

fn matches_filter(field: &FieldDef, value: &Value, filter: &str) -> bool {
    match field.field_type {
        FieldType::Number | FieldType::Integer => {
            decimal_of(value).is_some() && decimal_of(value) == Decimal::from_str(filter).ok()
        }
        _ => text_of(value).as_deref() == Some(filter),
    }
}

fn product_snapshot(record: &Value) -> Option<ProductSnapshot> {
    Some(ProductSnapshot {
        id: record_uuid(record)?,
        sku: opt_string(record, "sku")?,
        name: opt_string(record, "name")?,
        hsn_code: opt_string(record, "hsn_code"),
        gst_rate: record.get("gst_rate").and_then(decimal_of).unwrap_or_default(),
        selling_price: record
            .get("selling_price")
            .and_then(decimal_of)
            .unwrap_or_default(),
        mrp: record.get("mrp").and_then(decimal_of),
        min_stock_level: int_of(record, "min_stock_level"),
        reorder_level: int_of(record, "reorder_level"),
        is_active: is_active(record),
    })
}

impl State {
    fn records(&self, master: &str) -> &[Value] {
        self.masters.get(master).map_or(&[], Vec::as_slice)
    }

    fn find_record(&self, master: &str, id: Uuid) -> Option<&Value> {
        self.records(master)
            .iter()
            .find(|r| record_uuid(r) == Some(id))
    }

    /// 一意制約と参照制約を検査する。
    fn check_constraints(
        &self,
        schema: &MasterSchema,
        record: &Map<String, Value>,
        self_id: Uuid,
    ) -> anyhow::Result<()> {
        for field in schema.unique_fields() {
            let Some(value) = record.get(&field.key).filter(|v| !v.is_null()) else {
                continue;
            };
            let duplicate = self.records(&schema.name).iter().any(|other| {
                record_uuid(other) != Some(self_id)
                    && other
                        .get(&field.key)
                        .is_some_and(|v| values_equal(field, v, value))
            });
            if duplicate {
                return Err(ConstraintViolation::Unique(field.key.clone()).into());
            }
        }
        for field in schema.reference_fields() {
            let Some(target_id) = record
                .get(&field.key)
                .and_then(Value::as_str)
                .and_then(|s| Uuid::parse_str(s).ok())
            else {
                continue;
            };
            let target = field.references.as_deref().unwrap_or_default();
            if self.find_record(target, target_id).is_none() {
                return Err(ConstraintViolation::ForeignKey(field.key.clone()).into());
            }
        }
        Ok(())
    }

    /// 在庫・伝票からマスタレコードへの参照があるか。
    fn document_references(&self, master: &str, id: Uuid) -> bool {
        match master {
            "products" => {
                self.batches.iter().any(|b| b.product_id == id)
                    || self.grns.iter().flat_map(|g| &g.items).any(|i| i.product_id == id)
                    || self
                        .invoices
                        .iter()
                        .flat_map(|inv| &inv.items)
                        .any(|i| i.product_id == id)
            }
            "customers" => self.invoices.iter().any(|i| i.customer_id == Some(id)),
            "suppliers" => self.grns.iter().any(|g| g.supplier_id == id),
            _ => false,
        }
    }

    fn account_by_code(&self, code: &str) -> Option<&LedgerAccount> {
        self.accounts.iter().find(|a| a.code == code)
    }

    /// 明細の勘定コードを解決し、科目名を補った仕訳を返す。
    fn resolve_entry(&self, entry: &JournalEntry) -> anyhow::Result<JournalEntry> {
        let mut resolved = entry.clone();
        for line in &mut resolved.lines {
            let account = self
                .account_by_code(&line.account_code)
                .ok_or_else(|| anyhow::anyhow!("unknown ledger account code: {}", line.account_code))?;
            line.account_name = Some(account.name.clone());
        }
        Ok(resolved)
    }

    fn resolve_optional(&self, entry: Option<&JournalEntry>) -> anyhow::Result<Option<JournalEntry>> {
        entry.map(|e| self.resolve_entry(e)).transpose()
    }

    /// 移動をすべて適用できるか（ロットが存在し、在庫が負にならず i32 に収まる）。
    fn can_apply(&self, movements: &[StockMovement]) -> bool {
        net_deltas(movements).iter().all(|(batch_id, delta)| {
            self.batches
                .iter()
                .find(|b| b.id == *batch_id)
                .is_some_and(|b| fits_quantity(i64::from(b.available_quantity) + delta))
        })
    }

    /// can_apply を通った移動だけを渡す。ロットごとの差分をまとめて反映する。
    fn apply_movements(&mut self, movements: &[StockMovement]) {
        let now = Utc::now();
        for (batch_id, delta) in net_deltas(movements) {
            if let Some(batch) = self.batches.iter_mut().find(|b| b.id == batch_id) {
                let next = i64::from(batch.available_quantity) + delta;
                batch.available_quantity = i32::try_from(next).unwrap_or(batch.available_quantity);
                batch.updated_at = now;
            }
        }
        self.movements.extend(movements.iter().cloned());
    }

    fn entry_lines_for(
        &self,
        code: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> impl Iterator<Item = (&JournalEntry, Decimal, Decimal)> + '_ {
        let code = code.to_string();
        self.entries
            .iter()
            .filter(move |e| from.is_none_or(|f| e.entry_date >= f) && to.is_none_or(|t| e.entry_date <= t))
            .flat_map(move |e| {
                let code = code.clone();
                e.lines
                    .iter()
                    .filter(move |l| l.account_code == code)
                    .map(move |l| (e, l.debit, l.credit))
            })
    }
}

fn net_deltas(movements: &[StockMovement]) -> HashMap<Uuid, i64> {
    let mut deltas: HashMap<Uuid, i64> = HashMap::new();
    for m in movements {
        *deltas.entry(m.batch_id).or_default() += i64::from(m.quantity);
    }
    deltas
}

fn fits_quantity(quantity: i64) -> bool {
    (0..=i64::from(i32::MAX)).contains(&quantity)
}

fn paginate<T>(items: Vec<T>, page: u32, page_size: u32) -> Vec<T> {
    let skip = usize::try_from(offset(page, page_size)).unwrap_or(0);
    let take = usize::try_from(page_size).unwrap_or(usize::MAX);
    items.into_iter().skip(skip).take(take).collect()
}

fn total_of<T>(items: &[T]) -> i64 {
    i64::try_from(items.len()).unwrap_or(i64::MAX)
}

#[async_trait]
impl MasterRecordRepository for InMemoryStore {
    async fn find_all(
        &self,
        schema: &MasterSchema,
        query: &RecordQuery,
    ) -> anyhow::Result<(Vec<Value>, i64)> {
        let state = self.state.read().await;
        let search = query.search.as_ref().map(|s| s.to_lowercase());

        let mut records: Vec<Value> = state
            .records(&schema.name)
            .iter()
            .filter(|r| {
                query.filters.iter().all(|(column, filter)| {
                    schema.field(column).is_some_and(|f| {
                        r.get(column).is_some_and(|v| matches_filter(f, v, filter))
                    })
                })
            })
            .filter(|r| query.is_active.is_none_or(|active| is_active(r) == active))
            .filter(|r| {
                search.as_ref().is_none_or(|needle| {
                    schema.searchable_fields().any(|f| {
                        r.get(&f.key)
                            .and_then(text_of)
                            .is_some_and(|t| t.to_lowercase().contains(needle))
                    })
                })
            })
            .cloned()
            .collect();

        let default_sort = [(schema.default_sort.clone(), false)];
        let keys: Vec<(String, bool)> = if query.sort.is_empty() {
            default_sort.to_vec()
        } else {
            query
                .sort
                .iter()
                .map(|k| (k.column.clone(), k.descending))
                .collect()
        };
        records.sort_by(|a, b| {
            keys.iter()
                .map(|(column, descending)| {
                    let ord = compare_values(
                        a.get(column).unwrap_or(&Value::Null),
                        b.get(column).unwrap_or(&Value::Null),
                    );
                    if *descending {
                        ord.reverse()
                    } else {
                        ord
                    }
                })
                .find(|o| *o != Ordering::Equal)
                .unwrap_or_else(|| record_uuid(a).cmp(&record_uuid(b)))
        });

        let total = total_of(&records);
        Ok((paginate(records, query.page, query.page_size), total))
    }

    async fn find_by_id(&self, schema: &MasterSchema, id: Uuid) -> anyhow::Result<Option<Value>> {
        let state = self.state.read().await;
        Ok(state.find_record(&schema.name, id).cloned())
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
        let state = self.state.read().await;
        let needle = text_of(value).map(|s| s.to_lowercase());
        Ok(state.records(&schema.name).iter().any(|r| {
            if exclude_id.is_some() && record_uuid(r) == exclude_id {
                return false;
            }
            let Some(current) = r.get(field) else {
                return false;
            };
            if def.field_type.is_textual() {
                needle.is_some() && text_of(current).map(|s| s.to_lowercase()) == needle
            } else {
                values_equal(def, current, value)
            }
        }))
    }

    async fn exists(&self, schema: &MasterSchema, id: Uuid) -> anyhow::Result<bool> {
        Ok(self.state.read().await.find_record(&schema.name, id).is_some())
    }

    async fn create(
        &self,
        schema: &MasterSchema,
        record: &Map<String, Value>,
        actor: &str,
    ) -> anyhow::Result<Value> {
        let mut state = self.state.write().await;
        let id = Uuid::new_v4();
        state.check_constraints(schema, record, id)?;

        let now = Utc::now().to_rfc3339();
        let mut stored = Map::new();
        stored.insert("id".to_string(), Value::String(id.to_string()));
        for field in &schema.fields {
            stored.insert(
                field.key.clone(),
                record.get(&field.key).cloned().unwrap_or(Value::Null),
            );
        }
        stored.insert("created_at".to_string(), Value::String(now.clone()));
        stored.insert("updated_at".to_string(), Value::String(now));
        stored.insert("created_by".to_string(), Value::String(actor.to_string()));
        stored.insert("updated_by".to_string(), Value::String(actor.to_string()));
        let created = Value::Object(stored);

        state
            .masters
            .entry(schema.name.clone())
            .or_default()
            .push(created.clone());
        state.change_logs.push(ChangeLog::new(
            &schema.name,
            id,
            ChangeOperation::Create,
            None,
            Some(created.clone()),
            actor,
        ));
        Ok(created)
    }

    async fn update(
        &self,
        schema: &MasterSchema,
        id: Uuid,
        record: &Map<String, Value>,
        actor: &str,
    ) -> anyhow::Result<Option<Value>> {
        let mut state = self.state.write().await;
        let Some(before) = state.find_record(&schema.name, id).cloned() else {
            return Ok(None);
        };

        let mut merged = before.as_object().cloned().unwrap_or_default();
        for (key, value) in record {
            merged.insert(key.clone(), value.clone());
        }
        state.check_constraints(schema, &merged, id)?;
        merged.insert(
            "updated_at".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        merged.insert("updated_by".to_string(), Value::String(actor.to_string()));
        let updated = Value::Object(merged);

        if let Some(slot) = state
            .masters
            .get_mut(&schema.name)
            .and_then(|records| records.iter_mut().find(|r| record_uuid(r) == Some(id)))
        {
            *slot = updated.clone();
        }
        state.change_logs.push(ChangeLog::new(
            &schema.name,
            id,
            ChangeOperation::Update,
            Some(before),
            Some(updated.clone()),
            actor,
        ));
        Ok(Some(updated))
    }

    async fn delete(
        &self,
        schema: &MasterSchema,
        id: Uuid,
        actor: &str,
    ) -> anyhow::Result<DeleteOutcome> {
        let mut state = self.state.write().await;
        let Some(before) = state.find_record(&schema.name, id).cloned() else {
            return Ok(DeleteOutcome::NotFound);
        };
        if state.document_references(&schema.name, id) {
            return Ok(DeleteOutcome::InUse);
        }

        if let Some(records) = state.masters.get_mut(&schema.name) {
            records.retain(|r| record_uuid(r) != Some(id));
        }
        state.change_logs.push(ChangeLog::new(
            &schema.name,
            id,
            ChangeOperation::Delete,
            Some(before.clone()),
            None,
            actor,
        ));
        Ok(DeleteOutcome::Deleted(before))
    }

    async fn is_referenced(
        &self,
        schema: &MasterSchema,
        field: &str,
        id: Uuid,
    ) -> anyhow::Result<bool> {
        let state = self.state.read().await;
        let target = id.to_string();
        Ok(state
            .records(&schema.name)
            .iter()
            .any(|r| r.get(field).and_then(Value::as_str) == Some(target.as_str())))
    }

    async fn history(&self, master: &str, id: Uuid) -> anyhow::Result<Vec<ChangeLog>> {
        let state = self.state.read().await;
        Ok(state
            .change_logs
            .iter()
            .rev()
            .filter(|log| log.master == master && log.record_id == id)
            .cloned()
            .collect())
    }

    async fn options(
        &self,
        schema: &MasterSchema,
        search: Option<String>,
        limit: u32,
    ) -> anyhow::Result<Vec<MasterOption>> {
        let state = self.state.read().await;
        let needle = search.map(|s| s.to_lowercase());
        let mut options: Vec<MasterOption> = state
            .records(&schema.name)
            .iter()
            .filter(|r| is_active(r))
            .filter_map(|r| {
                let label = r
                    .get(&schema.label_field)
                    .and_then(text_of)
                    .unwrap_or_default();
                Some(MasterOption {
                    value: record_uuid(r)?,
                    label,
                })
            })
            .filter(|o| {
                needle
                    .as_ref()
                    .is_none_or(|n| o.label.to_lowercase().contains(n))
            })
            .collect();
        options.sort_by(|a, b| a.label.cmp(&b.label).then(a.value.cmp(&b.value)));
        options.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(options)
    }
}

#[async_trait]
impl InventoryRepository for InMemoryStore {
    async fn find_product(&self, id: Uuid) -> anyhow::Result<Option<ProductSnapshot>> {
        let state = self.state.read().await;
        Ok(state.find_record("products", id).and_then(product_snapshot))
    }

    async fn find_products(&self, ids: Vec<Uuid>) -> anyhow::Result<Vec<ProductSnapshot>> {
        let state = self.state.read().await;
        Ok(state
            .records("products")
            .iter()
            .filter_map(product_snapshot)
            .filter(|p| ids.contains(&p.id))
            .collect())
    }

    async fn list_products(&self, search: Option<String>) -> anyhow::Result<Vec<ProductSnapshot>> {
        let state = self.state.read().await;
        let needle = search.map(|s| s.to_lowercase());
        let mut products: Vec<ProductSnapshot> = state
            .records("products")
            .iter()
            .filter_map(product_snapshot)
            .filter(|p| p.is_active)
            .filter(|p| {
                needle.as_ref().is_none_or(|n| {
                    p.name.to_lowercase().contains(n) || p.sku.to_lowercase().contains(n)
                })
            })
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(products)
    }

    async fn find_batch(&self, id: Uuid) -> anyhow::Result<Option<InventoryBatch>> {
        let state = self.state.read().await;
        Ok(state.batches.iter().find(|b| b.id == id).cloned())
    }

    async fn list_batches(&self, product_id: Option<Uuid>) -> anyhow::Result<Vec<InventoryBatch>> {
        let state = self.state.read().await;
        let mut batches: Vec<InventoryBatch> = state
            .batches
            .iter()
            .filter(|b| product_id.is_none_or(|p| b.product_id == p))
            .cloned()
            .collect();
        batches.sort_by(|a, b| {
            a.product_id
                .cmp(&b.product_id)
                .then_with(|| match (a.expiry_date, b.expiry_date) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                })
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(batches)
    }

    async fn apply_adjustment(
        &self,
        adjustment: &StockAdjustment,
    ) -> anyhow::Result<AdjustmentOutcome> {
        let mut state = self.state.write().await;
        let Some(current) = state.batches.iter().find(|b| b.id == adjustment.batch_id) else {
            return Ok(AdjustmentOutcome::StockChanged);
        };
        if current.available_quantity != adjustment.expected_quantity {
            return Ok(AdjustmentOutcome::StockChanged);
        }
        let Ok(next_quantity) = i32::try_from(
            i64::from(current.available_quantity) + i64::from(adjustment.quantity_delta),
        ) else {
            anyhow::bail!("batch {} quantity is out of range", adjustment.batch_id);
        };
        if next_quantity < 0 {
            anyhow::bail!("batch {} would go negative", adjustment.batch_id);
        }
        let journal = state.resolve_optional(adjustment.journal.as_ref())?;

        let now = Utc::now();
        let mut applied = None;
        if let Some(batch) = state.batches.iter_mut().find(|b| b.id == adjustment.batch_id) {
            batch.available_quantity = next_quantity;
            batch.updated_at = now;
            applied = Some(batch.clone());
        }
        state.movements.push(adjustment.movement.clone());
        state.entries.extend(journal);
        state.outbox.push(adjustment.event.clone());

        applied
            .map(AdjustmentOutcome::Applied)
            .ok_or_else(|| anyhow::anyhow!("batch {} disappeared", adjustment.batch_id))
    }

    async fn list_movements(&self, filter: &MovementFilter) -> anyhow::Result<Vec<StockMovement>> {
        let state = self.state.read().await;
        Ok(state
            .movements
            .iter()
            .rev()
            .filter(|m| filter.batch_id.is_none_or(|id| m.batch_id == id))
            .filter(|m| filter.product_id.is_none_or(|id| m.product_id == id))
            .take(usize::try_from(filter.limit).unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PurchaseRepository for InMemoryStore {
    async fn find_supplier(&self, id: Uuid) -> anyhow::Result<Option<SupplierSnapshot>> {
        let state = self.state.read().await;
        Ok(state.find_record("suppliers", id).and_then(|r| {
            Some(SupplierSnapshot {
                id: record_uuid(r)?,
                name: opt_string(r, "name")?,
                gstin: opt_string(r, "gstin"),
                state_code: opt_string(r, "state_code"),
                is_active: is_active(r),
            })
        }))
    }

    async fn create_grn(&self, grn: &GoodsReceipt) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        if state.grns.iter().any(|g| g.grn_number == grn.grn_number) {
            return Err(ConstraintViolation::Unique("grn_number".to_string()).into());
        }
        state.grns.push(grn.clone());
        Ok(())
    }

    async fn find_grn(&self, id: Uuid) -> anyhow::Result<Option<GoodsReceipt>> {
        let state = self.state.read().await;
        Ok(state.grns.iter().find(|g| g.id == id).cloned())
    }

    async fn list_grns(&self, filter: &GrnFilter) -> anyhow::Result<(Vec<GoodsReceipt>, i64)> {
        let state = self.state.read().await;
        let mut grns: Vec<GoodsReceipt> = state
            .grns
            .iter()
            .filter(|g| filter.status.is_none_or(|s| g.status == s))
            .filter(|g| filter.supplier_id.is_none_or(|s| g.supplier_id == s))
            .cloned()
            .collect();
        grns.sort_by(|a, b| {
            b.received_date
                .cmp(&a.received_date)
                .then(b.created_at.cmp(&a.created_at))
        });
        let total = total_of(&grns);
        Ok((paginate(grns, filter.page, filter.page_size), total))
    }

    async fn approve_grn(&self, approval: &GrnApproval) -> anyhow::Result<bool> {
        let mut state = self.state.write().await;
        let Some(grn) = state
            .grns
            .iter()
            .find(|g| g.id == approval.grn_id && g.status == GrnStatus::Pending)
            .cloned()
        else {
            return Ok(false);
        };
        let journal = state.resolve_optional(approval.journal.as_ref())?;

        // 途中で失敗しても状態を変えないよう、写しに適用してから差し替える
        let now = Utc::now();
        let mut batches = state.batches.clone();
        let mut movements = Vec::new();
        for item in grn.items.iter().filter(|i| i.accepted_quantity > 0) {
            let existing = batches
                .iter_mut()
                .find(|b| b.product_id == item.product_id && b.batch_no == item.batch_no);
            let batch_id = match existing {
                Some(batch) => {
                    batch.unit_cost = weighted_average_cost(
                        batch.available_quantity,
                        batch.unit_cost,
                        item.accepted_quantity,
                        item.unit_cost,
                    )
                    .ok_or_else(|| anyhow::anyhow!("batch {} cost is out of range", batch.batch_no))?;
                    batch.available_quantity = batch
                        .available_quantity
                        .checked_add(item.accepted_quantity)
                        .ok_or_else(|| anyhow::anyhow!("batch {} quantity is out of range", batch.batch_no))?;
                    batch.mrp = item.mrp.or(batch.mrp);
                    batch.selling_price = item.selling_price.or(batch.selling_price);
                    batch.expiry_date = batch.expiry_date.or(item.expiry_date);
                    batch.mfg_date = batch.mfg_date.or(item.mfg_date);
                    batch.updated_at = now;
                    batch.id
                }
                None => {
                    let batch = InventoryBatch {
                        id: Uuid::new_v4(),
                        product_id: item.product_id,
                        batch_no: item.batch_no.clone(),
                        expiry_date: item.expiry_date,
                        mfg_date: item.mfg_date,
                        available_quantity: item.accepted_quantity,
                        unit_cost: item.unit_cost,
                        mrp: item.mrp,
                        selling_price: item.selling_price,
                        location: None,
                        grn_id: Some(grn.id),
                        created_at: now,
                        updated_at: now,
                    };
                    let id = batch.id;
                    batches.push(batch);
                    id
                }
            };
            movements.push(StockMovement::new(
                batch_id,
                item.product_id,
                MovementType::PurchaseIn,
                item.accepted_quantity,
                GRN_REFERENCE,
                Some(grn.id),
                None,
                &approval.approved_by,
            ));
        }
        state.batches = batches;
        state.movements.extend(movements);

        if let Some(stored) = state.grns.iter_mut().find(|g| g.id == approval.grn_id) {
            stored.status = GrnStatus::Approved;
            stored.qc_status = approval.qc_status;
            stored.approved_by = Some(approval.approved_by.clone());
            stored.approved_at = Some(approval.approved_at);
            stored.updated_at = approval.approved_at;
        }
        state.entries.extend(journal);
        state.outbox.push(approval.event.clone());
        Ok(true)
    }

    async fn reject_grn(&self, id: Uuid, reason: &str, _actor: &str) -> anyhow::Result<bool> {
        let mut state = self.state.write().await;
        let Some(grn) = state
            .grns
            .iter_mut()
            .find(|g| g.id == id && g.status == GrnStatus::Pending)
        else {
            return Ok(false);
        };
        grn.status = GrnStatus::Rejected;
        grn.rejection_reason = Some(reason.to_string());
        grn.updated_at = Utc::now();
        Ok(true)
    }

    async fn approved_grns_for_period(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> anyhow::Result<Vec<GoodsReceipt>> {
        let state = self.state.read().await;
        let mut grns: Vec<GoodsReceipt> = state
            .grns
            .iter()
            .filter(|g| g.status == GrnStatus::Approved)
            .filter(|g| g.received_date >= from && g.received_date <= to)
            .cloned()
            .collect();
        grns.sort_by(|a, b| {
            a.received_date
                .cmp(&b.received_date)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(grns)
    }
}

#[async_trait]
impl SalesRepository for InMemoryStore {
    async fn find_customer(&self, id: Uuid) -> anyhow::Result<Option<CustomerSnapshot>> {
        let state = self.state.read().await;
        Ok(state.find_record("customers", id).and_then(|r| {
            Some(CustomerSnapshot {
                id: record_uuid(r)?,
                name: opt_string(r, "name")?,
                gstin: opt_string(r, "gstin"),
                state_code: opt_string(r, "state_code"),
                is_active: is_active(r),
            })
        }))
    }

    async fn create_invoice(&self, posting: &InvoicePosting) -> anyhow::Result<PostingOutcome> {
        let mut state = self.state.write().await;
        if !state.can_apply(&posting.movements) {
            return Ok(PostingOutcome::StockChanged);
        }
        let journal = state.resolve_optional(posting.journal.as_ref())?;

        state.apply_movements(&posting.movements);
        state.invoices.push(posting.invoice.clone());
        state.entries.extend(journal);
        state.outbox.extend(posting.events.iter().cloned());
        Ok(PostingOutcome::Posted)
    }

    async fn find_invoice(&self, id: Uuid) -> anyhow::Result<Option<SalesInvoice>> {
        let state = self.state.read().await;
        Ok(state.invoices.iter().find(|i| i.id == id).cloned())
    }

    async fn list_invoices(
        &self,
        filter: &InvoiceFilter,
    ) -> anyhow::Result<(Vec<SalesInvoice>, i64)> {
        let state = self.state.read().await;
        let needle = filter.search.as_ref().map(|s| s.to_lowercase());
        let mut invoices: Vec<SalesInvoice> = state
            .invoices
            .iter()
            .filter(|i| filter.from.is_none_or(|f| i.invoice_date >= f))
            .filter(|i| filter.to.is_none_or(|t| i.invoice_date <= t))
            .filter(|i| filter.status.is_none_or(|s| i.status == s))
            .filter(|i| filter.customer_id.is_none_or(|c| i.customer_id == Some(c)))
            .filter(|i| {
                needle.as_ref().is_none_or(|n| {
                    i.invoice_number.to_lowercase().contains(n)
                        || i.customer_name.to_lowercase().contains(n)
                })
            })
            .cloned()
            .collect();
        invoices.sort_by(|a, b| {
            b.invoice_date
                .cmp(&a.invoice_date)
                .then(b.created_at.cmp(&a.created_at))
        });
        let total = total_of(&invoices);
        Ok((paginate(invoices, filter.page, filter.page_size), total))
    }

    async fn cancel_invoice(&self, cancellation: &InvoiceCancellation) -> anyhow::Result<bool> {
        let mut state = self.state.write().await;
        let completed = state.invoices.iter().any(|i| {
            i.id == cancellation.invoice_id && i.status == InvoiceStatus::Completed
        });
        if !completed {
            return Ok(false);
        }
        if !state.can_apply(&cancellation.movements) {
            anyhow::bail!("invoice {} could not be restocked", cancellation.invoice_id);
        }
        let journal = state.resolve_optional(cancellation.journal.as_ref())?;

        state.apply_movements(&cancellation.movements);
        if let Some(invoice) = state
            .invoices
            .iter_mut()
            .find(|i| i.id == cancellation.invoice_id)
        {
            invoice.status = InvoiceStatus::Cancelled;
            invoice.cancellation_reason = Some(cancellation.reason.clone());
            invoice.updated_at = Utc::now();
        }
        state.entries.extend(journal);
        state.outbox.push(cancellation.event.clone());
        Ok(true)
    }

    async fn invoices_for_period(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> anyhow::Result<Vec<SalesInvoice>> {
        let state = self.state.read().await;
        let mut invoices: Vec<SalesInvoice> = state
            .invoices
            .iter()
            .filter(|i| i.invoice_date >= from && i.invoice_date <= to)
            .cloned()
            .collect();
        invoices.sort_by(|a, b| {
            a.invoice_date
                .cmp(&b.invoice_date)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(invoices)
    }
}

#[async_trait]
impl LedgerRepository for InMemoryStore {
    async fn list_accounts(&self) -> anyhow::Result<Vec<LedgerAccount>> {
        let state = self.state.read().await;
        let mut accounts = state.accounts.clone();
        accounts.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(accounts)
    }

    async fn find_account_by_id(&self, id: Uuid) -> anyhow::Result<Option<LedgerAccount>> {
        let state = self.state.read().await;
        Ok(state.accounts.iter().find(|a| a.id == id).cloned())
    }

    async fn find_account_by_code(&self, code: &str) -> anyhow::Result<Option<LedgerAccount>> {
        let state = self.state.read().await;
        Ok(state.account_by_code(code).cloned())
    }

    async fn create_account(&self, account: &LedgerAccount) -> anyhow::Result<bool> {
        let mut state = self.state.write().await;
        if state.account_by_code(&account.code).is_some() {
            return Ok(false);
        }
        state.accounts.push(account.clone());
        Ok(true)
    }

    async fn post_entry(
        &self,
        entry: &JournalEntry,
        event: Option<OutboxMessage>,
    ) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        let resolved = state.resolve_entry(entry)?;
        state.entries.push(resolved);
        state.outbox.extend(event);
        Ok(())
    }

    async fn find_entry(&self, id: Uuid) -> anyhow::Result<Option<JournalEntry>> {
        let state = self.state.read().await;
        Ok(state.entries.iter().find(|e| e.id == id).cloned())
    }

    async fn list_entries(
        &self,
        filter: &EntryFilter,
    ) -> anyhow::Result<(Vec<JournalEntry>, i64)> {
        let state = self.state.read().await;
        let mut entries: Vec<JournalEntry> = state
            .entries
            .iter()
            .filter(|e| filter.from.is_none_or(|f| e.entry_date >= f))
            .filter(|e| filter.to.is_none_or(|t| e.entry_date <= t))
            .filter(|e| filter.source_type.is_none_or(|s| e.source_type == s))
            .cloned()
            .collect();
        entries.sort_by(|a, b| {
            b.entry_date
                .cmp(&a.entry_date)
                .then(b.created_at.cmp(&a.created_at))
        });
        let total = total_of(&entries);
        Ok((paginate(entries, filter.page, filter.page_size), total))
    }

    async fn opening_totals(
        &self,
        account_id: Uuid,
        before: NaiveDate,
    ) -> anyhow::Result<(Decimal, Decimal)> {
        let state = self.state.read().await;
        let Some(account) = state.accounts.iter().find(|a| a.id == account_id) else {
            return Ok((Decimal::ZERO, Decimal::ZERO));
        };
        Ok(state
            .entry_lines_for(&account.code, None, None)
            .filter(|(e, _, _)| e.entry_date < before)
            .fold((Decimal::ZERO, Decimal::ZERO), |(d, c), (_, debit, credit)| {
                (d + debit, c + credit)
            }))
    }

    async fn account_movements(
        &self,
        account_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> anyhow::Result<Vec<AccountMovement>> {
        let state = self.state.read().await;
        let Some(account) = state.accounts.iter().find(|a| a.id == account_id) else {
            return Ok(Vec::new());
        };
        let mut movements: Vec<(chrono::DateTime<Utc>, AccountMovement)> = state
            .entry_lines_for(&account.code, from, to)
            .map(|(e, debit, credit)| {
                (
                    e.created_at,
                    AccountMovement {
                        entry_id: e.id,
                        entry_number: e.entry_number.clone(),
                        entry_date: e.entry_date,
                        narration: e.narration.clone(),
                        source_type: e.source_type,
                        debit,
                        credit,
                    },
                )
            })
            .collect();
        movements.sort_by(|a, b| a.1.entry_date.cmp(&b.1.entry_date).then(a.0.cmp(&b.0)));
        Ok(movements.into_iter().map(|(_, m)| m).collect())
    }

    async fn account_totals(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> anyhow::Result<Vec<AccountTotals>> {
        let state = self.state.read().await;
        let mut accounts: Vec<&LedgerAccount> = state.accounts.iter().collect();
        accounts.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(accounts
            .into_iter()
            .map(|account| {
                let (debit, credit) = state
                    .entry_lines_for(&account.code, from, to)
                    .fold((Decimal::ZERO, Decimal::ZERO), |(d, c), (_, debit, credit)| {
                        (d + debit, c + credit)
                    });
                AccountTotals {
                    account_id: account.id,
                    code: account.code.clone(),
                    name: account.name.clone(),
                    account_type: account.account_type,
                    debit,
                    credit,
                }
            })
            .collect())
    }
}

#[async_trait]
impl OutboxStore for InMemoryStore {
    async fn save(&self, message: &OutboxMessage) -> Result<(), OutboxError> {
        self.state.write().await.outbox.push(message.clone());
        Ok(())
    }

    async fn claim_pending(
        &self,
        limit: u32,
        lease: Duration,
    ) -> Result<Vec<OutboxMessage>, OutboxError> {
        let lease = chrono::Duration::from_std(lease)?;
        let now = Utc::now();
        let mut state = self.state.write().await;

        let mut indices: Vec<usize> = state
            .outbox
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_processable_at(now))
            .map(|(i, _)| i)
            .collect();
        indices.sort_by_key(|i| state.outbox[*i].created_at);
        indices.truncate(usize::try_from(limit).unwrap_or(usize::MAX));

        let mut claimed = Vec::with_capacity(indices.len());
        for i in indices {
            let message = &mut state.outbox[i];
            message.mark_processing(lease);
            claimed.push(message.clone());
        }
        Ok(claimed)
    }

    async fn update(&self, message: &OutboxMessage) -> Result<(), OutboxError> {
        let mut state = self.state.write().await;
        let stored = state
            .outbox
            .iter_mut()
            .find(|m| m.id == message.id)
            .ok_or(OutboxError::NotFound(message.id))?;
        *stored = message.clone();
        Ok(())
    }

    async fn delete_delivered(&self, older_than_days: u32) -> Result<u64, OutboxError> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(older_than_days));
        let mut state = self.state.write().await;
        let before = state.outbox.len();
        state
            .outbox
            .retain(|m| !(m.status == OutboxStatus::Delivered && m.created_at < cutoff));
        Ok(u64::try_from(before - state.outbox.len()).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::journal_entry::{JournalLine, SourceType};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn catalog() -> Arc<MasterCatalog> {
        Arc::new(MasterCatalog::builtin())
    }

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_create_records_change_log_and_enforces_unique() {
        let catalog = catalog();
        let store = InMemoryStore::new(catalog.clone());
        let brands = catalog.get("brands").unwrap();

        let created = store
            .create(brands, &object(json!({"name": "SBL", "is_active": true})), "admin")
            .await
            .unwrap();
        let id = record_uuid(&created).unwrap();
        assert_eq!(created["created_by"], "admin");
        assert_eq!(created["description"], Value::Null);

        let err = store
            .create(brands, &object(json!({"name": "SBL"})), "admin")
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConstraintViolation>(),
            Some(&ConstraintViolation::Unique("name".to_string()))
        );

        let history = store.history("brands", id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].operation, ChangeOperation::Create);
    }

    #[tokio::test]
    async fn test_find_all_filters_sorts_and_paginates() {
        let catalog = catalog();
        let store = InMemoryStore::new(catalog.clone());
        let terms = catalog.get("payment-terms").unwrap();
        for (name, days) in [("Net 30", 30), ("Immediate", 0), ("Net 15", 15)] {
            store
                .create(terms, &object(json!({"name": name, "days": days, "is_active": true})), "admin")
                .await
                .unwrap();
        }

        let query = RecordQuery {
            page_size: 2,
            ..RecordQuery::default()
        };
        let (records, total) = store.find_all(terms, &query).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["name"], "Immediate");

        let query = RecordQuery {
            filters: vec![("days".to_string(), "15".to_string())],
            ..RecordQuery::default()
        };
        let (records, total) = store.find_all(terms, &query).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(records[0]["name"], "Net 15");

        let query = RecordQuery {
            search: Some("net".to_string()),
            ..RecordQuery::default()
        };
        assert_eq!(store.find_all(terms, &query).await.unwrap().1, 2);
    }

    #[tokio::test]
    async fn test_reference_must_exist() {
        let catalog = catalog();
        let store = InMemoryStore::new(catalog.clone());
        let categories = catalog.get("categories").unwrap();
        let err = store
            .create(
                categories,
                &object(json!({"name": "Dilutions", "parent_id": Uuid::new_v4().to_string()})),
                "admin",
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConstraintViolation>(),
            Some(&ConstraintViolation::ForeignKey("parent_id".to_string()))
        );
    }

    #[tokio::test]
    async fn test_post_entry_requires_known_accounts() {
        let store = InMemoryStore::default();
        let entry = JournalEntry::new(
            NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(),
            "capital",
            SourceType::Manual,
            None,
            vec![
                JournalLine::debit("1000", dec!(500)),
                JournalLine::credit("3000", dec!(500)),
            ],
            "admin",
        )
        .unwrap();
        store.post_entry(&entry, None).await.unwrap();

        let stored = store.find_entry(entry.id).await.unwrap().unwrap();
        assert_eq!(stored.lines[0].account_name.as_deref(), Some("Cash"));

        let totals = store.account_totals(None, None).await.unwrap();
        let cash = totals.iter().find(|t| t.code == "1000").unwrap();
        assert_eq!(cash.debit, dec!(500));

        let unknown = JournalEntry::new(
            NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(),
            "bad",
            SourceType::Manual,
            None,
            vec![
                JournalLine::debit("9999", dec!(1)),
                JournalLine::credit("3000", dec!(1)),
            ],
            "admin",
        )
        .unwrap();
        assert!(store.post_entry(&unknown, None).await.is_err());
        assert_eq!(store.list_entries(&EntryFilter {
            from: None,
            to: None,
            source_type: None,
            page: 1,
            page_size: 20,
        }).await.unwrap().1, 1);
    }

    fn batch_with(quantity: i32) -> InventoryBatch {
        let now = Utc::now();
        InventoryBatch {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            batch_no: "B1".to_string(),
            expiry_date: None,
            mfg_date: None,
            available_quantity: quantity,
            unit_cost: dec!(10),
            mrp: None,
            selling_price: None,
            location: None,
            grn_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn adjustment_of(batch: &InventoryBatch, delta: i32) -> StockAdjustment {
        StockAdjustment {
            batch_id: batch.id,
            expected_quantity: batch.available_quantity,
            quantity_delta: delta,
            movement: StockMovement::new(
                batch.id,
                batch.product_id,
                MovementType::AdjustmentIn,
                delta,
                "ADJUSTMENT",
                None,
                None,
                "admin",
            ),
            journal: None,
            event: OutboxMessage::new("yeelo.inventory", "inventory.adjusted", "k", json!({})),
        }
    }

    #[tokio::test]
    async fn test_adjustment_past_i32_range_leaves_batch_untouched() {
        let store = InMemoryStore::default();
        let batch = batch_with(i32::MAX - 1);
        store.seed_batch(batch.clone()).await;

        assert!(store.apply_adjustment(&adjustment_of(&batch, 5)).await.is_err());

        let stored = store.find_batch(batch.id).await.unwrap().unwrap();
        assert_eq!(stored.available_quantity, i32::MAX - 1);
        assert!(store.outbox_messages().await.is_empty());

        let outcome = store.apply_adjustment(&adjustment_of(&batch, 1)).await.unwrap();
        assert!(matches!(
            outcome,
            AdjustmentOutcome::Applied(ref b) if b.available_quantity == i32::MAX
        ));
    }

    #[tokio::test]
    async fn test_outbox_claim_and_purge() {
        let store = InMemoryStore::default();
        let mut delivered = OutboxMessage::new("yeelo.sales", "invoice.created", "k", json!({}));
        delivered.mark_delivered();
        delivered.created_at = Utc::now() - chrono::Duration::days(10);
        store.save(&delivered).await.unwrap();
        store
            .save(&OutboxMessage::new("yeelo.sales", "invoice.created", "k", json!({})))
            .await
            .unwrap();

        let claimed = store.claim_pending(10, Duration::from_secs(30)).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].status, OutboxStatus::Processing);
        assert!(store
            .claim_pending(10, Duration::from_secs(30))
            .await
            .unwrap()
            .is_empty());

        assert_eq!(store.delete_delivered(7).await.unwrap(), 1);
        assert_eq!(store.outbox_messages().await.len(), 1);
    }
}
