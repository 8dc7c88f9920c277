use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;
use yeelo_server_common::ServiceError;

use super::error::invalid_parameter;
use super::AppState;
use crate::adapter::middleware::auth::Actor;
use crate::adapter::presenter::{ApiResponse, PaginatedResponse};
use crate::domain::entity::sales_invoice::{InvoiceStatus, SalesInvoice};
use crate::domain::entity::stock_movement::MovementType;
use crate::usecase::sales_invoices::{CreateInvoiceInput, InvoiceListParams};

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListInvoicesQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// COMPLETED | CANCELLED
    pub status: Option<String>,
    pub customer_id: Option<Uuid>,
    /// 請求書番号・顧客名の部分一致
    pub search: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CancelInvoiceRequest {
    pub reason: String,
}

#[utoipa::path(
    get,
    path = "/api/v1/sales/invoices",
    params(ListInvoicesQuery),
    responses((status = 200, description = "Paginated invoices")),
    security(("bearer_auth" = []))
)]
pub async fn list_invoices(
    State(state): State<AppState>,
    Query(query): Query<ListInvoicesQuery>,
) -> Result<Json<PaginatedResponse<SalesInvoice>>, ServiceError> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<InvoiceStatus>)
        .transpose()
        .map_err(|e| invalid_parameter("sales", "status", e))?;
    let params = InvoiceListParams {
        from: query.from,
        to: query.to,
        status,
        customer_id: query.customer_id,
        search: query.search,
        page: query.page,
        page_size: query.page_size,
    };
    let (invoices, total, page, page_size) = state.sales_uc.list_invoices(&params).await?;
    Ok(Json(PaginatedResponse::new(invoices, page, page_size, total)))
}

#[utoipa::path(
    get,
    path = "/api/v1/sales/invoices/{id}",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice with lines", body = ApiResponse<SalesInvoice>),
        (status = 404, description = "Invoice not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<SalesInvoice>>, ServiceError> {
    let invoice = state.sales_uc.get_invoice(id).await?;
    Ok(Json(ApiResponse::new(invoice)))
}

#[utoipa::path(
    post,
    path = "/api/v1/sales/invoices",
    request_body = CreateInvoiceInput,
    responses(
        (status = 201, description = "Invoice posted", body = ApiResponse<SalesInvoice>),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Stock changed concurrently"),
        (status = 422, description = "Insufficient stock"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_invoice(
    State(state): State<AppState>,
    actor: Actor,
    Json(input): Json<CreateInvoiceInput>,
) -> Result<(StatusCode, Json<ApiResponse<SalesInvoice>>), ServiceError> {
    let invoice = state
        .sales_uc
        .create_invoice(&input, actor.as_str())
        .await?;
    state.metrics.record_sales_invoice(invoice.status.as_str());
    state
        .metrics
        .record_stock_movement(MovementType::SaleOut.as_str(), invoice.items.len() as u64);
    Ok((StatusCode::CREATED, Json(ApiResponse::new(invoice))))
}

#[utoipa::path(
    post,
    path = "/api/v1/sales/invoices/{id}/cancel",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    request_body = CancelInvoiceRequest,
    responses(
        (status = 200, description = "Invoice cancelled and stock restored", body = ApiResponse<SalesInvoice>),
        (status = 404, description = "Invoice not found"),
        (status = 409, description = "Invoice is already cancelled"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn cancel_invoice(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(req): Json<CancelInvoiceRequest>,
) -> Result<Json<ApiResponse<SalesInvoice>>, ServiceError> {
    let invoice = state
        .sales_uc
        .cancel_invoice(id, &req.reason, actor.as_str())
        .await?;
    state.metrics.record_sales_invoice(invoice.status.as_str());
    state.metrics.record_stock_movement(
        MovementType::SaleCancelIn.as_str(),
        invoice.items.len() as u64,
    );
    Ok(Json(ApiResponse::new(invoice)))
}
