pub mod response;

pub use response::{ApiResponse, PaginatedResponse, Pagination, ReportResponse};
