use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;
use yeelo_server_common::ServiceError;

use super::error::invalid_parameter;
use super::AppState;
use crate::adapter::middleware::auth::Actor;
use crate::adapter::presenter::{ApiResponse, PaginatedResponse};
use crate::domain::entity::goods_receipt::{GoodsReceipt, GrnStatus};
use crate::domain::entity::stock_movement::MovementType;
use crate::usecase::receive_goods::{CreateGrnInput, GrnListParams};

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListGrnsQuery {
    /// PENDING | APPROVED | REJECTED
    pub status: Option<String>,
    pub supplier_id: Option<Uuid>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RejectGrnRequest {
    pub reason: String,
}

#[utoipa::path(
    get,
    path = "/api/v1/purchases/grns",
    params(ListGrnsQuery),
    responses((status = 200, description = "Paginated goods receipts")),
    security(("bearer_auth" = []))
)]
pub async fn list_grns(
    State(state): State<AppState>,
    Query(query): Query<ListGrnsQuery>,
) -> Result<Json<PaginatedResponse<GoodsReceipt>>, ServiceError> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<GrnStatus>)
        .transpose()
        .map_err(|e| invalid_parameter("purchases", "status", e))?;
    let params = GrnListParams {
        status,
        supplier_id: query.supplier_id,
        page: query.page,
        page_size: query.page_size,
    };
    let (grns, total, page, page_size) = state.purchases_uc.list_grns(&params).await?;
    Ok(Json(PaginatedResponse::new(grns, page, page_size, total)))
}

#[utoipa::path(
    get,
    path = "/api/v1/purchases/grns/{id}",
    params(("id" = Uuid, Path, description = "GRN ID")),
    responses(
        (status = 200, description = "Goods receipt", body = ApiResponse<GoodsReceipt>),
        (status = 404, description = "GRN not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_grn(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<GoodsReceipt>>, ServiceError> {
    let grn = state.purchases_uc.get_grn(id).await?;
    Ok(Json(ApiResponse::new(grn)))
}

#[utoipa::path(
    post,
    path = "/api/v1/purchases/grns",
    request_body = CreateGrnInput,
    responses(
        (status = 201, description = "GRN created in PENDING status", body = ApiResponse<GoodsReceipt>),
        (status = 400, description = "Validation failed"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_grn(
    State(state): State<AppState>,
    actor: Actor,
    Json(input): Json<CreateGrnInput>,
) -> Result<(StatusCode, Json<ApiResponse<GoodsReceipt>>), ServiceError> {
    let grn = state
        .purchases_uc
        .create_grn(&input, actor.as_str())
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::new(grn))))
}

#[utoipa::path(
    post,
    path = "/api/v1/purchases/grns/{id}/approve",
    params(("id" = Uuid, Path, description = "GRN ID")),
    responses(
        (status = 200, description = "GRN approved and stock received", body = ApiResponse<GoodsReceipt>),
        (status = 404, description = "GRN not found"),
        (status = 409, description = "GRN is not pending"),
        (status = 422, description = "No accepted quantity"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn approve_grn(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<GoodsReceipt>>, ServiceError> {
    let grn = state.purchases_uc.approve_grn(id, actor.as_str()).await?;
    let received = grn
        .items
        .iter()
        .filter(|item| item.accepted_quantity > 0)
        .count();
    state
        .metrics
        .record_stock_movement(MovementType::PurchaseIn.as_str(), received as u64);
    Ok(Json(ApiResponse::new(grn)))
}

#[utoipa::path(
    post,
    path = "/api/v1/purchases/grns/{id}/reject",
    params(("id" = Uuid, Path, description = "GRN ID")),
    request_body = RejectGrnRequest,
    responses(
        (status = 200, description = "GRN rejected", body = ApiResponse<GoodsReceipt>),
        (status = 404, description = "GRN not found"),
        (status = 409, description = "GRN is not pending"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn reject_grn(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(req): Json<RejectGrnRequest>,
) -> Result<Json<ApiResponse<GoodsReceipt>>, ServiceError> {
    let grn = state
        .purchases_uc
        .reject_grn(id, &req.reason, actor.as_str())
        .await?;
    Ok(Json(ApiResponse::new(grn)))
}
