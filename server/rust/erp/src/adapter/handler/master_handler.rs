use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;
use yeelo_server_common::ServiceError;

use super::AppState;
use crate::adapter::middleware::auth::Actor;
use crate::adapter::presenter::{ApiResponse, PaginatedResponse};
use crate::domain::entity::change_log::ChangeLog;
use crate::domain::repository::master_record_repository::MasterOption;
use crate::usecase::manage_master_records::{CatalogGroup, MasterListParams, MasterSchemaView};

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListRecordsQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    /// `name,-created_at`
    pub sort: Option<String>,
    pub search: Option<String>,
    /// `column:value,column2:value2`
    pub filter: Option<String>,
    pub is_active: Option<bool>,
}

impl From<ListRecordsQuery> for MasterListParams {
    fn from(q: ListRecordsQuery) -> Self {
        MasterListParams {
            page: q.page,
            page_size: q.page_size,
            sort: q.sort,
            search: q.search,
            filter: q.filter,
            is_active: q.is_active,
        }
    }
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct OptionsQuery {
    pub search: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/masters",
    responses((status = 200, description = "Master catalog grouped by category", body = ApiResponse<Vec<CatalogGroup>>)),
    security(("bearer_auth" = []))
)]
pub async fn list_masters(State(state): State<AppState>) -> Json<ApiResponse<Vec<CatalogGroup>>> {
    Json(ApiResponse::new(state.masters_uc.catalog()))
}

#[utoipa::path(
    get,
    path = "/api/v1/masters/{master}/schema",
    params(("master" = String, Path, description = "Master name")),
    responses(
        (status = 200, description = "Field definitions and JSON Schema"),
        (status = 404, description = "Unknown master"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_schema(
    State(state): State<AppState>,
    Path(master): Path<String>,
) -> Result<Json<ApiResponse<MasterSchemaView>>, ServiceError> {
    let view = state.masters_uc.schema_view(&master)?;
    Ok(Json(ApiResponse::new(view)))
}

#[utoipa::path(
    get,
    path = "/api/v1/masters/{master}",
    params(("master" = String, Path, description = "Master name"), ListRecordsQuery),
    responses(
        (status = 200, description = "Paginated records"),
        (status = 400, description = "Invalid sort or filter"),
        (status = 404, description = "Unknown master"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_records(
    State(state): State<AppState>,
    Path(master): Path<String>,
    Query(query): Query<ListRecordsQuery>,
) -> Result<Json<PaginatedResponse<Value>>, ServiceError> {
    let (records, total, query) = state.masters_uc.list(&master, &query.into()).await?;
    Ok(Json(PaginatedResponse::new(
        records,
        query.page,
        query.page_size,
        total,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/masters/{master}/options",
    params(("master" = String, Path, description = "Master name"), OptionsQuery),
    responses((status = 200, description = "Select options", body = ApiResponse<Vec<MasterOption>>)),
    security(("bearer_auth" = []))
)]
pub async fn list_options(
    State(state): State<AppState>,
    Path(master): Path<String>,
    Query(query): Query<OptionsQuery>,
) -> Result<Json<ApiResponse<Vec<MasterOption>>>, ServiceError> {
    let options = state.masters_uc.options(&master, query.search).await?;
    Ok(Json(ApiResponse::new(options)))
}

#[utoipa::path(
    get,
    path = "/api/v1/masters/{master}/{id}",
    params(
        ("master" = String, Path, description = "Master name"),
        ("id" = Uuid, Path, description = "Record ID"),
    ),
    responses(
        (status = 200, description = "Record found"),
        (status = 404, description = "Record not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_record(
    State(state): State<AppState>,
    Path((master, id)): Path<(String, Uuid)>,
) -> Result<Json<ApiResponse<Value>>, ServiceError> {
    let record = state.masters_uc.get(&master, id).await?;
    Ok(Json(ApiResponse::new(record)))
}

#[utoipa::path(
    get,
    path = "/api/v1/masters/{master}/{id}/history",
    params(
        ("master" = String, Path, description = "Master name"),
        ("id" = Uuid, Path, description = "Record ID"),
    ),
    responses((status = 200, description = "Change history, newest first")),
    security(("bearer_auth" = []))
)]
pub async fn get_history(
    State(state): State<AppState>,
    Path((master, id)): Path<(String, Uuid)>,
) -> Result<Json<ApiResponse<Vec<ChangeLog>>>, ServiceError> {
    let history = state.masters_uc.history(&master, id).await?;
    Ok(Json(ApiResponse::new(history)))
}

#[utoipa::path(
    post,
    path = "/api/v1/masters/{master}",
    params(("master" = String, Path, description = "Master name")),
    request_body = Object,
    responses(
        (status = 201, description = "Record created"),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Duplicate value"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_record(
    State(state): State<AppState>,
    actor: Actor,
    Path(master): Path<String>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<ApiResponse<Value>>), ServiceError> {
    let created = state
        .masters_uc
        .create(&master, &payload, actor.as_str())
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::new(created))))
}

#[utoipa::path(
    put,
    path = "/api/v1/masters/{master}/{id}",
    params(
        ("master" = String, Path, description = "Master name"),
        ("id" = Uuid, Path, description = "Record ID"),
    ),
    request_body = Object,
    responses(
        (status = 200, description = "Record updated"),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Record not found"),
        (status = 409, description = "Duplicate value"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_record(
    State(state): State<AppState>,
    actor: Actor,
    Path((master, id)): Path<(String, Uuid)>,
    Json(payload): Json<Value>,
) -> Result<Json<ApiResponse<Value>>, ServiceError> {
    let updated = state
        .masters_uc
        .update(&master, id, &payload, actor.as_str())
        .await?;
    Ok(Json(ApiResponse::new(updated)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/masters/{master}/{id}",
    params(
        ("master" = String, Path, description = "Master name"),
        ("id" = Uuid, Path, description = "Record ID"),
    ),
    responses(
        (status = 200, description = "Record deleted"),
        (status = 404, description = "Record not found"),
        (status = 409, description = "Record is referenced"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_record(
    State(state): State<AppState>,
    actor: Actor,
    Path((master, id)): Path<(String, Uuid)>,
) -> Result<Json<ApiResponse<Value>>, ServiceError> {
    let deleted = state.masters_uc.delete(&master, id, actor.as_str()).await?;
    Ok(Json(ApiResponse::new(deleted)))
}
