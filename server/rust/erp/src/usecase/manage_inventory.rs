use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::domain::entity::inventory_batch::InventoryBatch;
use crate::domain::entity::stock_movement::{MovementType, StockMovement};
use crate::domain::entity::stock_report::{
    AlertSeverity, ExpiryAlert, LowStockAlert, StockLevel, StockSummary,
};
use crate::domain::repository::inventory_repository::{
    AdjustmentOutcome, MovementFilter, StockAdjustment,
};
use crate::domain::repository::InventoryRepository;
use crate::domain::service::posting_rules;
use crate::domain::service::record_validator::{reason, FieldViolation};
use crate::domain::service::stock_alert;
use crate::usecase::event::{event_type, EventFactory, EventStream};

pub const DEFAULT_EXPIRY_WINDOW_DAYS: i64 = 90;
pub const MAX_EXPIRY_WINDOW_DAYS: i64 = 365;
pub const DEFAULT_MOVEMENT_LIMIT: u32 = 50;
pub const MAX_MOVEMENT_LIMIT: u32 = 500;

/// 在庫移動の参照種別。
pub const ADJUSTMENT_REFERENCE: &str = "STOCK_ADJUSTMENT";

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("batch not found: {0}")]
    BatchNotFound(Uuid),
    #[error("validation failed")]
    Validation(Vec<FieldViolation>),
    #[error("adjustment would make stock negative: available {available}, delta {delta}")]
    NegativeStock { available: i32, delta: i32 },
    #[error("stock changed concurrently, retry the adjustment")]
    StockChanged,
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone)]
pub struct AdjustStockInput {
    pub batch_id: Uuid,
    pub quantity_delta: i32,
    pub reason: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct AdjustStockOutput {
    pub batch: InventoryBatch,
    pub movement: StockMovement,
    pub journal_entry_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct LowStockReport {
    pub alerts: Vec<LowStockAlert>,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct ExpiryReport {
    pub days: i64,
    pub alerts: Vec<ExpiryAlert>,
    pub expired: usize,
    pub value_at_risk: rust_decimal::Decimal,
}

pub struct ManageInventoryUseCase {
    repo: Arc<dyn InventoryRepository>,
    events: EventFactory,
    near_expiry_days: i64,
    /// 期限アラートで `days` 省略時に使う先読み日数
    expiry_window_days: i64,
}

impl ManageInventoryUseCase {
    pub fn new(repo: Arc<dyn InventoryRepository>, events: EventFactory, near_expiry_days: i64) -> Self {
        Self {
            repo,
            events,
            near_expiry_days,
            expiry_window_days: DEFAULT_EXPIRY_WINDOW_DAYS,
        }
    }

    #[must_use]
    pub fn with_expiry_window_days(mut self, days: i64) -> Self {
        self.expiry_window_days = days;
        self
    }

    pub async fn stock_levels(
        &self,
        search: Option<String>,
        include_zero: bool,
    ) -> Result<Vec<StockLevel>, InventoryError> {
        let search = search.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        let products = self
            .repo
            .list_products(search)
            .await
            .map_err(|e| InventoryError::Internal(e.to_string()))?;
        let batches = self.all_batches().await?;
        Ok(stock_alert::stock_levels(&products, &batches, include_zero))
    }

    pub async fn list_batches(
        &self,
        product_id: Option<Uuid>,
        include_empty: bool,
    ) -> Result<Vec<InventoryBatch>, InventoryError> {
        let mut batches = self
            .repo
            .list_batches(product_id)
            .await
            .map_err(|e| InventoryError::Internal(e.to_string()))?;
        if !include_empty {
            batches.retain(|b| b.available_quantity > 0);
        }
        Ok(batches)
    }

    pub async fn low_stock_alerts(&self) -> Result<LowStockReport, InventoryError> {
        let levels = self.stock_levels(None, true).await?;
        let alerts = stock_alert::low_stock_alerts(&levels);
        let count = |severity| alerts.iter().filter(|a| a.severity == severity).count();
        Ok(LowStockReport {
            critical: count(AlertSeverity::Critical),
            high: count(AlertSeverity::High),
            medium: count(AlertSeverity::Medium),
            alerts,
        })
    }

    pub async fn expiry_alerts(&self, days: Option<i64>) -> Result<ExpiryReport, InventoryError> {
        let days = days.unwrap_or(self.expiry_window_days);
        if !(0..=MAX_EXPIRY_WINDOW_DAYS).contains(&days) {
            return Err(InventoryError::Validation(vec![FieldViolation::new(
                "days",
                reason::OUT_OF_RANGE,
                format!("days must be between 0 and {MAX_EXPIRY_WINDOW_DAYS}"),
            )]));
        }
        let products = self
            .repo
            .list_products(None)
            .await
            .map_err(|e| InventoryError::Internal(e.to_string()))?;
        let batches = self.all_batches().await?;
        let alerts = stock_alert::expiry_alerts(&products, &batches, super::today(), days);
        Ok(ExpiryReport {
            days,
            expired: alerts
                .iter()
                .filter(|a| a.days_to_expiry < 0)
                .count(),
            value_at_risk: alerts.iter().map(|a| a.value_at_risk).sum(),
            alerts,
        })
    }

    pub async fn summary(&self) -> Result<StockSummary, InventoryError> {
        let products = self
            .repo
            .list_products(None)
            .await
            .map_err(|e| InventoryError::Internal(e.to_string()))?;
        let batches = self.all_batches().await?;
        Ok(stock_alert::summary(
            &products,
            &batches,
            super::today(),
            self.near_expiry_days,
        ))
    }

    /// ロット在庫を増減する。移動履歴・調整仕訳・`inventory.adjusted` を同時に書き込む。
    #[tracing::instrument(skip(self, input), fields(batch_id = %input.batch_id, delta = input.quantity_delta))]
    pub async fn adjust_stock(
        &self,
        input: &AdjustStockInput,
        actor: &str,
    ) -> Result<AdjustStockOutput, InventoryError> {
        let mut violations = Vec::new();
        if input.quantity_delta == 0 {
            violations.push(FieldViolation::new(
                "quantity_delta",
                reason::OUT_OF_RANGE,
                "quantity_delta must not be zero",
            ));
        }
        let reason = input.reason.trim();
        if reason.is_empty() {
            violations.push(FieldViolation::new("reason", reason::REQUIRED, "reason is required"));
        }
        if !violations.is_empty() {
            return Err(InventoryError::Validation(violations));
        }

        let batch = self
            .repo
            .find_batch(input.batch_id)
            .await
            .map_err(|e| InventoryError::Internal(e.to_string()))?
            .ok_or(InventoryError::BatchNotFound(input.batch_id))?;

        let new_quantity = i64::from(batch.available_quantity) + i64::from(input.quantity_delta);
        if new_quantity < 0 {
            return Err(InventoryError::NegativeStock {
                available: batch.available_quantity,
                delta: input.quantity_delta,
            });
        }

        let movement_type = if input.quantity_delta > 0 {
            MovementType::AdjustmentIn
        } else {
            MovementType::AdjustmentOut
        };
        let note = match input.notes.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            Some(notes) => format!("{reason}: {notes}"),
            None => reason.to_string(),
        };
        let movement = StockMovement::new(
            batch.id,
            batch.product_id,
            movement_type,
            input.quantity_delta,
            ADJUSTMENT_REFERENCE,
            None,
            Some(note),
            actor,
        );
        let journal = posting_rules::stock_adjustment_entry(
            &batch,
            input.quantity_delta,
            reason,
            super::today(),
            actor,
        )
        .map_err(|e| InventoryError::Internal(e.to_string()))?;
        let event = self.events.build(
            EventStream::Inventory,
            event_type::INVENTORY_ADJUSTED,
            batch.product_id.to_string(),
            json!({
                "batch_id": batch.id,
                "product_id": batch.product_id,
                "batch_no": batch.batch_no,
                "quantity_delta": input.quantity_delta,
                "new_quantity": new_quantity,
                "reason": reason,
                "adjusted_by": actor,
            }),
        );

        let adjustment = StockAdjustment {
            batch_id: batch.id,
            expected_quantity: batch.available_quantity,
            quantity_delta: input.quantity_delta,
            movement: movement.clone(),
            journal: journal.clone(),
            event,
        };
        match self
            .repo
            .apply_adjustment(&adjustment)
            .await
            .map_err(|e| InventoryError::Internal(e.to_string()))?
        {
            AdjustmentOutcome::Applied(updated) => {
                tracing::info!(
                    batch_id = %updated.id,
                    available_quantity = updated.available_quantity,
                    actor = %actor,
                    "stock adjusted"
                );
                Ok(AdjustStockOutput {
                    batch: updated,
                    movement,
                    journal_entry_number: journal.map(|j| j.entry_number),
                })
            }
            AdjustmentOutcome::StockChanged => {
                tracing::warn!(batch_id = %batch.id, "stock changed during adjustment");
                Err(InventoryError::StockChanged)
            }
        }
    }

    pub async fn movements(
        &self,
        batch_id: Option<Uuid>,
        product_id: Option<Uuid>,
        limit: Option<u32>,
    ) -> Result<Vec<StockMovement>, InventoryError> {
        let limit = limit.unwrap_or(DEFAULT_MOVEMENT_LIMIT);
        if limit == 0 || limit > MAX_MOVEMENT_LIMIT {
            return Err(InventoryError::Validation(vec![FieldViolation::new(
                "limit",
                reason::OUT_OF_RANGE,
                format!("limit must be between 1 and {MAX_MOVEMENT_LIMIT}"),
            )]));
        }
        self.repo
            .list_movements(&MovementFilter {
                batch_id,
                product_id,
                limit,
            })
            .await
            .map_err(|e| InventoryError::Internal(e.to_string()))
    }

    async fn all_batches(&self) -> Result<Vec<InventoryBatch>, InventoryError> {
        self.repo
            .list_batches(None)
            .await
            .map_err(|e| InventoryError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::party::ProductSnapshot;
    use crate::domain::repository::inventory_repository::MockInventoryRepository;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn product(min: i32) -> ProductSnapshot {
        ProductSnapshot {
            id: Uuid::new_v4(),
            sku: "ARN30".to_string(),
            name: "Arnica Montana 30C".to_string(),
            hsn_code: Some("3004".to_string()),
            gst_rate: dec!(12),
            selling_price: dec!(120),
            mrp: Some(dec!(130)),
            min_stock_level: min,
            reorder_level: min * 2,
            is_active: true,
        }
    }

    fn batch(product_id: Uuid, qty: i32, expires_in_days: i64) -> InventoryBatch {
        InventoryBatch {
            id: Uuid::new_v4(),
            product_id,
            batch_no: format!("B-{qty}"),
            expiry_date: Some(super::super::today() + Duration::days(expires_in_days)),
            mfg_date: None,
            available_quantity: qty,
            unit_cost: dec!(50),
            mrp: None,
            selling_price: None,
            location: None,
            grn_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn usecase(repo: MockInventoryRepository) -> ManageInventoryUseCase {
        ManageInventoryUseCase::new(Arc::new(repo), EventFactory::default(), 30)
    }

    #[tokio::test]
    async fn test_adjust_stock_success() {
        let b = batch(Uuid::new_v4(), 10, 200);
        let found = b.clone();
        let mut repo = MockInventoryRepository::new();
        repo.expect_find_batch()
            .returning(move |_| Ok(Some(found.clone())));
        repo.expect_apply_adjustment()
            .withf(|a| {
                a.expected_quantity == 10
                    && a.quantity_delta == -3
                    && a.movement.movement_type == MovementType::AdjustmentOut
                    && a.journal.as_ref().is_some_and(|j| j.total_debit == dec!(150))
                    && a.event.event_type == "inventory.adjusted"
                    && a.event.topic == "yeelo.inventory"
            })
            .returning(|a| {
                let mut updated = InventoryBatch {
                    available_quantity: 7,
                    ..batch(Uuid::new_v4(), 7, 200)
                };
                updated.id = a.batch_id;
                Ok(AdjustmentOutcome::Applied(updated))
            });

        let uc = usecase(repo);
        let input = AdjustStockInput {
            batch_id: b.id,
            quantity_delta: -3,
            reason: "damaged".to_string(),
            notes: Some("dropped shelf".to_string()),
        };
        let out = uc.adjust_stock(&input, "store@yeelo.in").await.unwrap();
        assert_eq!(out.batch.available_quantity, 7);
        assert_eq!(out.movement.quantity, -3);
        assert_eq!(out.movement.reason.as_deref(), Some("damaged: dropped shelf"));
        assert!(out.journal_entry_number.is_some());
    }

    #[tokio::test]
    async fn test_adjust_stock_rejects_negative_result() {
        let b = batch(Uuid::new_v4(), 2, 200);
        let found = b.clone();
        let mut repo = MockInventoryRepository::new();
        repo.expect_find_batch()
            .returning(move |_| Ok(Some(found.clone())));
        repo.expect_apply_adjustment().never();

        let uc = usecase(repo);
        let input = AdjustStockInput {
            batch_id: b.id,
            quantity_delta: -5,
            reason: "count".to_string(),
            notes: None,
        };
        let result = uc.adjust_stock(&input, "store").await;
        assert!(matches!(
            result,
            Err(InventoryError::NegativeStock {
                available: 2,
                delta: -5
            })
        ));
    }

    #[tokio::test]
    async fn test_adjust_stock_validation() {
        let uc = usecase(MockInventoryRepository::new());
        let input = AdjustStockInput {
            batch_id: Uuid::new_v4(),
            quantity_delta: 0,
            reason: " ".to_string(),
            notes: None,
        };
        match uc.adjust_stock(&input, "store").await {
            Err(InventoryError::Validation(v)) => assert_eq!(v.len(), 2),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_adjust_stock_concurrent_change() {
        let b = batch(Uuid::new_v4(), 10, 200);
        let found = b.clone();
        let mut repo = MockInventoryRepository::new();
        repo.expect_find_batch()
            .returning(move |_| Ok(Some(found.clone())));
        repo.expect_apply_adjustment()
            .returning(|_| Ok(AdjustmentOutcome::StockChanged));

        let uc = usecase(repo);
        let input = AdjustStockInput {
            batch_id: b.id,
            quantity_delta: 4,
            reason: "recount".to_string(),
            notes: None,
        };
        assert!(matches!(
            uc.adjust_stock(&input, "store").await,
            Err(InventoryError::StockChanged)
        ));
    }

    #[tokio::test]
    async fn test_adjust_stock_batch_not_found() {
        let mut repo = MockInventoryRepository::new();
        repo.expect_find_batch().returning(|_| Ok(None));

        let uc = usecase(repo);
        let input = AdjustStockInput {
            batch_id: Uuid::new_v4(),
            quantity_delta: 1,
            reason: "recount".to_string(),
            notes: None,
        };
        assert!(matches!(
            uc.adjust_stock(&input, "store").await,
            Err(InventoryError::BatchNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_low_stock_alerts_counts_severity() {
        let empty = product(10);
        let low = product(10);
        let batches = vec![batch(low.id, 5, 100)];
        let products = vec![empty, low];

        let mut repo = MockInventoryRepository::new();
        repo.expect_list_products()
            .returning(move |_| Ok(products.clone()));
        repo.expect_list_batches()
            .returning(move |_| Ok(batches.clone()));

        let report = usecase(repo).low_stock_alerts().await.unwrap();
        assert_eq!(report.alerts.len(), 2);
        assert_eq!(report.alerts[0].severity, AlertSeverity::Critical);
        assert_eq!(report.critical, 1);
        assert_eq!(report.high, 1);
    }

    #[tokio::test]
    async fn test_expiry_alerts_window() {
        let p = product(0);
        let batches = vec![batch(p.id, 5, -2), batch(p.id, 5, 20), batch(p.id, 5, 200)];
        let products = vec![p];

        let mut repo = MockInventoryRepository::new();
        repo.expect_list_products()
            .returning(move |_| Ok(products.clone()));
        repo.expect_list_batches()
            .returning(move |_| Ok(batches.clone()));

        let report = usecase(repo).expiry_alerts(None).await.unwrap();
        assert_eq!(report.days, 90);
        assert_eq!(report.alerts.len(), 2);
        assert_eq!(report.expired, 1);
        assert_eq!(report.value_at_risk, dec!(500));
    }

    #[tokio::test]
    async fn test_expiry_alerts_rejects_large_window() {
        let uc = usecase(MockInventoryRepository::new());
        assert!(matches!(
            uc.expiry_alerts(Some(400)).await,
            Err(InventoryError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_list_batches_hides_empty_by_default() {
        let pid = Uuid::new_v4();
        let batches = vec![batch(pid, 0, 100), batch(pid, 3, 100)];
        let mut repo = MockInventoryRepository::new();
        repo.expect_list_batches()
            .returning(move |_| Ok(batches.clone()));

        let uc = usecase(repo);
        assert_eq!(uc.list_batches(Some(pid), false).await.unwrap().len(), 1);
        assert_eq!(uc.list_batches(Some(pid), true).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_movements_limit() {
        let mut repo = MockInventoryRepository::new();
        repo.expect_list_movements()
            .withf(|f| f.limit == 50 && f.batch_id.is_none())
            .returning(|_| Ok(vec![]));

        let uc = usecase(repo);
        assert!(uc.movements(None, None, None).await.unwrap().is_empty());
        assert!(matches!(
            uc.movements(None, None, Some(1000)).await,
            Err(InventoryError::Validation(_))
        ));
    }
}
