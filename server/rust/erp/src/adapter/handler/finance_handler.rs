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
use crate::domain::entity::financial_report::{
    BalanceSheet, GstSummary, Gstr1Report, LedgerStatement, ProfitAndLoss, TrialBalance,
};
use crate::domain::entity::journal_entry::{JournalEntry, SourceType};
use crate::domain::entity::ledger_account::LedgerAccount;
use crate::usecase::manage_ledger::{CreateAccountInput, EntryListParams, PostJournalInput};

// --- Query DTOs ---

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct PeriodQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct AsOfQuery {
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListEntriesQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// MANUAL | SALES_INVOICE | INVOICE_CANCELLATION | GOODS_RECEIPT | STOCK_ADJUSTMENT
    pub source_type: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

// --- Accounts ---

#[utoipa::path(
    get,
    path = "/api/v1/finance/accounts",
    responses((status = 200, description = "Chart of accounts", body = ApiResponse<Vec<LedgerAccount>>)),
    security(("bearer_auth" = []))
)]
pub async fn list_accounts(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<LedgerAccount>>>, ServiceError> {
    let accounts = state.ledger_uc.list_accounts().await?;
    Ok(Json(ApiResponse::new(accounts)))
}

#[utoipa::path(
    post,
    path = "/api/v1/finance/accounts",
    request_body = CreateAccountInput,
    responses(
        (status = 201, description = "Account created", body = ApiResponse<LedgerAccount>),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Account code already exists"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_account(
    State(state): State<AppState>,
    Json(input): Json<CreateAccountInput>,
) -> Result<(StatusCode, Json<ApiResponse<LedgerAccount>>), ServiceError> {
    let account = state.ledger_uc.create_account(&input).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::new(account))))
}

#[utoipa::path(
    get,
    path = "/api/v1/finance/accounts/{id}/ledger",
    params(("id" = Uuid, Path, description = "Account ID"), PeriodQuery),
    responses(
        (status = 200, description = "Account statement with running balance", body = ApiResponse<LedgerStatement>),
        (status = 404, description = "Account not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn account_ledger(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<ApiResponse<LedgerStatement>>, ServiceError> {
    let statement = state
        .reports_uc
        .account_ledger(id, query.from, query.to)
        .await?;
    Ok(Json(ApiResponse::new(statement)))
}

// --- Journal ---

#[utoipa::path(
    get,
    path = "/api/v1/finance/journal-entries",
    params(ListEntriesQuery),
    responses((status = 200, description = "Paginated journal entries")),
    security(("bearer_auth" = []))
)]
pub async fn list_entries(
    State(state): State<AppState>,
    Query(query): Query<ListEntriesQuery>,
) -> Result<Json<PaginatedResponse<JournalEntry>>, ServiceError> {
    let source_type = query
        .source_type
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<SourceType>)
        .transpose()
        .map_err(|e| invalid_parameter("finance", "source_type", e))?;
    let params = EntryListParams {
        from: query.from,
        to: query.to,
        source_type,
        page: query.page,
        page_size: query.page_size,
    };
    let (entries, total, page, page_size) = state.ledger_uc.list_entries(&params).await?;
    Ok(Json(PaginatedResponse::new(entries, page, page_size, total)))
}

#[utoipa::path(
    get,
    path = "/api/v1/finance/journal-entries/{id}",
    params(("id" = Uuid, Path, description = "Journal entry ID")),
    responses(
        (status = 200, description = "Journal entry with lines", body = ApiResponse<JournalEntry>),
        (status = 404, description = "Entry not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_entry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<JournalEntry>>, ServiceError> {
    let entry = state.ledger_uc.get_entry(id).await?;
    Ok(Json(ApiResponse::new(entry)))
}

#[utoipa::path(
    post,
    path = "/api/v1/finance/journal-entries",
    request_body = PostJournalInput,
    responses(
        (status = 201, description = "Entry posted", body = ApiResponse<JournalEntry>),
        (status = 400, description = "Validation failed"),
        (status = 422, description = "Debits and credits do not balance"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn post_entry(
    State(state): State<AppState>,
    actor: Actor,
    Json(input): Json<PostJournalInput>,
) -> Result<(StatusCode, Json<ApiResponse<JournalEntry>>), ServiceError> {
    let entry = state
        .ledger_uc
        .post_manual_entry(&input, actor.as_str())
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::new(entry))))
}

// --- Reports ---

#[utoipa::path(
    get,
    path = "/api/v1/finance/reports/trial-balance",
    params(AsOfQuery),
    responses((status = 200, description = "Trial balance", body = ApiResponse<TrialBalance>)),
    security(("bearer_auth" = []))
)]
pub async fn trial_balance(
    State(state): State<AppState>,
    Query(query): Query<AsOfQuery>,
) -> Result<Json<ApiResponse<TrialBalance>>, ServiceError> {
    let report = state.reports_uc.trial_balance(query.as_of).await?;
    Ok(Json(ApiResponse::new(report)))
}

#[utoipa::path(
    get,
    path = "/api/v1/finance/reports/profit-loss",
    params(PeriodQuery),
    responses((status = 200, description = "Profit and loss", body = ApiResponse<ProfitAndLoss>)),
    security(("bearer_auth" = []))
)]
pub async fn profit_and_loss(
    State(state): State<AppState>,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<ApiResponse<ProfitAndLoss>>, ServiceError> {
    let report = state
        .reports_uc
        .profit_and_loss(query.from, query.to)
        .await?;
    Ok(Json(ApiResponse::new(report)))
}

#[utoipa::path(
    get,
    path = "/api/v1/finance/reports/balance-sheet",
    params(AsOfQuery),
    responses((status = 200, description = "Balance sheet", body = ApiResponse<BalanceSheet>)),
    security(("bearer_auth" = []))
)]
pub async fn balance_sheet(
    State(state): State<AppState>,
    Query(query): Query<AsOfQuery>,
) -> Result<Json<ApiResponse<BalanceSheet>>, ServiceError> {
    let report = state.reports_uc.balance_sheet(query.as_of).await?;
    Ok(Json(ApiResponse::new(report)))
}

#[utoipa::path(
    get,
    path = "/api/v1/finance/gst/summary",
    params(PeriodQuery),
    responses((status = 200, description = "Output and input GST for the period", body = ApiResponse<GstSummary>)),
    security(("bearer_auth" = []))
)]
pub async fn gst_summary(
    State(state): State<AppState>,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<ApiResponse<GstSummary>>, ServiceError> {
    let report = state.reports_uc.gst_summary(query.from, query.to).await?;
    Ok(Json(ApiResponse::new(report)))
}

#[utoipa::path(
    get,
    path = "/api/v1/finance/gst/gstr1",
    params(PeriodQuery),
    responses((status = 200, description = "GSTR-1 sections", body = ApiResponse<Gstr1Report>)),
    security(("bearer_auth" = []))
)]
pub async fn gstr1(
    State(state): State<AppState>,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<ApiResponse<Gstr1Report>>, ServiceError> {
    let report = state.reports_uc.gstr1(query.from, query.to).await?;
    Ok(Json(ApiResponse::new(report)))
}
