//! API レスポンスの封筒型。

use serde::Serialize;

/// 単一リソース: `{"data": ...}`
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ApiResponse<T> {
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(page: u32, page_size: u32, total: i64) -> Self {
        let size = i64::from(page_size.max(1));
        Self {
            page,
            page_size,
            total,
            total_pages: (total + size - 1) / size,
        }
    }
}

/// 一覧: `{"data": [...], "pagination": {...}}`
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, page: u32, page_size: u32, total: i64) -> Self {
        Self {
            data,
            pagination: Pagination::new(page, page_size, total),
        }
    }
}

/// アラート・帳票の一覧: `{"data": [...], "summary": {...}}`
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ReportResponse<T, S> {
    pub data: Vec<T>,
    pub summary: S,
}
