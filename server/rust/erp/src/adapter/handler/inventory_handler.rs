use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use yeelo_server_common::ServiceError;

use super::AppState;
use crate::adapter::middleware::auth::Actor;
use crate::adapter::presenter::{ApiResponse, ReportResponse};
use crate::domain::entity::inventory_batch::InventoryBatch;
use crate::domain::entity::stock_movement::StockMovement;
use crate::domain::entity::stock_report::{ExpiryAlert, LowStockAlert, StockLevel, StockSummary};
use crate::usecase::manage_inventory::{AdjustStockInput, AdjustStockOutput};

// --- Request / Response DTOs ---

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct StockQuery {
    pub search: Option<String>,
    #[serde(default)]
    pub include_zero: bool,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct BatchQuery {
    pub product_id: Option<Uuid>,
    #[serde(default)]
    pub include_empty: bool,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ExpiryQuery {
    /// 期限切れ判定の先読み日数（0..=365）
    pub days: Option<i64>,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct MovementQuery {
    pub batch_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct AdjustStockRequest {
    pub batch_id: Uuid,
    /// 正で入庫、負で出庫
    pub quantity_delta: i32,
    pub reason: String,
    pub notes: Option<String>,
}

impl From<AdjustStockRequest> for AdjustStockInput {
    fn from(req: AdjustStockRequest) -> Self {
        AdjustStockInput {
            batch_id: req.batch_id,
            quantity_delta: req.quantity_delta,
            reason: req.reason,
            notes: req.notes,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LowStockSummary {
    pub total: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ExpirySummary {
    pub days: i64,
    pub total: usize,
    pub expired: usize,
    pub value_at_risk: Decimal,
}

// --- Handlers ---

#[utoipa::path(
    get,
    path = "/api/v1/inventory/stock",
    params(StockQuery),
    responses((status = 200, description = "Stock per product", body = ApiResponse<Vec<StockLevel>>)),
    security(("bearer_auth" = []))
)]
pub async fn stock_levels(
    State(state): State<AppState>,
    Query(query): Query<StockQuery>,
) -> Result<Json<ApiResponse<Vec<StockLevel>>>, ServiceError> {
    let levels = state
        .inventory_uc
        .stock_levels(query.search, query.include_zero)
        .await?;
    Ok(Json(ApiResponse::new(levels)))
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory/batches",
    params(BatchQuery),
    responses((status = 200, description = "Batches", body = ApiResponse<Vec<InventoryBatch>>)),
    security(("bearer_auth" = []))
)]
pub async fn list_batches(
    State(state): State<AppState>,
    Query(query): Query<BatchQuery>,
) -> Result<Json<ApiResponse<Vec<InventoryBatch>>>, ServiceError> {
    let batches = state
        .inventory_uc
        .list_batches(query.product_id, query.include_empty)
        .await?;
    Ok(Json(ApiResponse::new(batches)))
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory/low-stock",
    responses((status = 200, description = "Products below their minimum stock level")),
    security(("bearer_auth" = []))
)]
pub async fn low_stock(
    State(state): State<AppState>,
) -> Result<Json<ReportResponse<LowStockAlert, LowStockSummary>>, ServiceError> {
    let report = state.inventory_uc.low_stock_alerts().await?;
    Ok(Json(ReportResponse {
        summary: LowStockSummary {
            total: report.alerts.len(),
            critical: report.critical,
            high: report.high,
            medium: report.medium,
        },
        data: report.alerts,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory/expiry-alerts",
    params(ExpiryQuery),
    responses(
        (status = 200, description = "Batches expired or expiring within the window"),
        (status = 400, description = "Window out of range"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn expiry_alerts(
    State(state): State<AppState>,
    Query(query): Query<ExpiryQuery>,
) -> Result<Json<ReportResponse<ExpiryAlert, ExpirySummary>>, ServiceError> {
    let report = state.inventory_uc.expiry_alerts(query.days).await?;
    Ok(Json(ReportResponse {
        summary: ExpirySummary {
            days: report.days,
            total: report.alerts.len(),
            expired: report.expired,
            value_at_risk: report.value_at_risk,
        },
        data: report.alerts,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory/summary",
    responses((status = 200, description = "Inventory totals", body = ApiResponse<StockSummary>)),
    security(("bearer_auth" = []))
)]
pub async fn summary(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<StockSummary>>, ServiceError> {
    let summary = state.inventory_uc.summary().await?;
    Ok(Json(ApiResponse::new(summary)))
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory/movements",
    params(MovementQuery),
    responses(
        (status = 200, description = "Stock movements, newest first", body = ApiResponse<Vec<StockMovement>>),
        (status = 400, description = "Limit out of range"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn movements(
    State(state): State<AppState>,
    Query(query): Query<MovementQuery>,
) -> Result<Json<ApiResponse<Vec<StockMovement>>>, ServiceError> {
    let movements = state
        .inventory_uc
        .movements(query.batch_id, query.product_id, query.limit)
        .await?;
    Ok(Json(ApiResponse::new(movements)))
}

#[utoipa::path(
    post,
    path = "/api/v1/inventory/adjustments",
    request_body = AdjustStockRequest,
    responses(
        (status = 201, description = "Stock adjusted", body = ApiResponse<AdjustStockOutput>),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Batch not found"),
        (status = 409, description = "Stock changed concurrently"),
        (status = 422, description = "Adjustment would make stock negative"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn adjust_stock(
    State(state): State<AppState>,
    actor: Actor,
    Json(req): Json<AdjustStockRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AdjustStockOutput>>), ServiceError> {
    let output = state
        .inventory_uc
        .adjust_stock(&req.into(), actor.as_str())
        .await?;
    state
        .metrics
        .record_stock_movement(output.movement.movement_type.as_str(), 1);
    Ok((StatusCode::CREATED, Json(ApiResponse::new(output))))
}
