//! Yeelo ERP サーバーの構造化エラーコード。
//!
//! エラーコードは `ERP_{MODULE}_{ERROR}` 形式に従う。
//!
//! 例:
//! - `ERP_MASTERS_NOT_FOUND`
//! - `ERP_SALES_INSUFFICIENT_STOCK`
//! - `ERP_AUTH_PERMISSION_DENIED`
//!
//! 各エラーは機械可読なコード、人間向けメッセージ、追跡用のリクエスト ID、
//! 任意のフィールド単位の詳細を持つ。

use serde::Serialize;

/// ErrorCode は構造化エラーコードを表す。
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[cfg_attr(feature = "utoipa", schema(value_type = String, example = "ERP_SALES_INSUFFICIENT_STOCK"))]
pub struct ErrorCode(String);

impl ErrorCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn not_found(module: &str) -> Self {
        Self(format!("ERP_{}_NOT_FOUND", module.to_uppercase()))
    }

    pub fn validation(module: &str) -> Self {
        Self(format!("ERP_{}_VALIDATION_FAILED", module.to_uppercase()))
    }

    pub fn internal(module: &str) -> Self {
        Self(format!("ERP_{}_INTERNAL_ERROR", module.to_uppercase()))
    }

    pub fn unauthorized(module: &str) -> Self {
        Self(format!("ERP_{}_UNAUTHORIZED", module.to_uppercase()))
    }

    pub fn forbidden(module: &str) -> Self {
        Self(format!("ERP_{}_PERMISSION_DENIED", module.to_uppercase()))
    }

    pub fn conflict(module: &str) -> Self {
        Self(format!("ERP_{}_CONFLICT", module.to_uppercase()))
    }

    pub fn unprocessable(module: &str) -> Self {
        Self(format!(
            "ERP_{}_BUSINESS_RULE_VIOLATION",
            module.to_uppercase()
        ))
    }

    pub fn service_unavailable(module: &str) -> Self {
        Self(format!(
            "ERP_{}_SERVICE_UNAVAILABLE",
            module.to_uppercase()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for ErrorCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl From<&str> for ErrorCode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ErrorCode {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// ErrorDetail はフィールド単位のエラー情報。
///
/// `{ "field": "quantity", "reason": "out_of_range", "message": "..." }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct ErrorDetail {
    pub field: String,
    pub reason: String,
    pub message: String,
}

impl ErrorDetail {
    pub fn new(
        field: impl Into<String>,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ErrorDetail>,
}

/// ErrorResponse は ErrorBody を `{ "error": ... }` で包む。
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

impl ErrorResponse {
    pub fn new(code: impl Into<ErrorCode>, message: impl Into<String>) -> Self {
        Self::with_details(code, message, vec![])
    }

    pub fn with_details(
        code: impl Into<ErrorCode>,
        message: impl Into<String>,
        details: Vec<ErrorDetail>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
                request_id: uuid::Uuid::new_v4().to_string(),
                details,
            },
        }
    }
}

/// ServiceError は HTTP ステータスコードに対応付けられる上位エラー型。
///
/// `axum` feature 有効時は `IntoResponse` を実装する。
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// 404 Not Found
    #[error("{message}")]
    NotFound { code: ErrorCode, message: String },

    /// 400 Bad Request
    #[error("{message}")]
    BadRequest {
        code: ErrorCode,
        message: String,
        details: Vec<ErrorDetail>,
    },

    /// 401 Unauthorized
    #[error("{message}")]
    Unauthorized { code: ErrorCode, message: String },

    /// 403 Forbidden
    #[error("{message}")]
    Forbidden { code: ErrorCode, message: String },

    /// 409 Conflict
    #[error("{message}")]
    Conflict {
        code: ErrorCode,
        message: String,
        details: Vec<ErrorDetail>,
    },

    /// 422 Unprocessable Entity（業務ルール違反）
    #[error("{message}")]
    UnprocessableEntity {
        code: ErrorCode,
        message: String,
        details: Vec<ErrorDetail>,
    },

    /// 500 Internal Server Error
    #[error("{message}")]
    Internal { code: ErrorCode, message: String },

    /// 503 Service Unavailable
    #[error("{message}")]
    ServiceUnavailable { code: ErrorCode, message: String },
}

/// 内部エラー時にクライアントへ返す固定メッセージ。
pub const INTERNAL_ERROR_MESSAGE: &str = "internal server error";

impl ServiceError {
    pub fn not_found(module: &str, message: impl Into<String>) -> Self {
        Self::NotFound {
            code: ErrorCode::not_found(module),
            message: message.into(),
        }
    }

    pub fn bad_request(module: &str, message: impl Into<String>) -> Self {
        Self::bad_request_with_details(module, message, vec![])
    }

    pub fn bad_request_with_details(
        module: &str,
        message: impl Into<String>,
        details: Vec<ErrorDetail>,
    ) -> Self {
        Self::BadRequest {
            code: ErrorCode::validation(module),
            message: message.into(),
            details,
        }
    }

    pub fn unauthorized(module: &str, message: impl Into<String>) -> Self {
        Self::Unauthorized {
            code: ErrorCode::unauthorized(module),
            message: message.into(),
        }
    }

    pub fn forbidden(module: &str, message: impl Into<String>) -> Self {
        Self::Forbidden {
            code: ErrorCode::forbidden(module),
            message: message.into(),
        }
    }

    pub fn conflict(module: &str, message: impl Into<String>) -> Self {
        Self::Conflict {
            code: ErrorCode::conflict(module),
            message: message.into(),
            details: vec![],
        }
    }

    pub fn unprocessable_entity(module: &str, message: impl Into<String>) -> Self {
        Self::UnprocessableEntity {
            code: ErrorCode::unprocessable(module),
            message: message.into(),
            details: vec![],
        }
    }

    /// internal は内部エラーを生成する。詳細はログにのみ出力し、レスポンスには固定メッセージを返す。
    pub fn internal(module: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::error!(module = module, error = %message, "internal error");
        Self::Internal {
            code: ErrorCode::internal(module),
            message: INTERNAL_ERROR_MESSAGE.to_string(),
        }
    }

    pub fn service_unavailable(module: &str, message: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            code: ErrorCode::service_unavailable(module),
            message: message.into(),
        }
    }

    pub fn code(&self) -> &ErrorCode {
        match self {
            ServiceError::NotFound { code, .. }
            | ServiceError::BadRequest { code, .. }
            | ServiceError::Unauthorized { code, .. }
            | ServiceError::Forbidden { code, .. }
            | ServiceError::Conflict { code, .. }
            | ServiceError::UnprocessableEntity { code, .. }
            | ServiceError::Internal { code, .. }
            | ServiceError::ServiceUnavailable { code, .. } => code,
        }
    }

    pub fn to_error_response(&self) -> ErrorResponse {
        match self {
            ServiceError::NotFound { code, message }
            | ServiceError::Unauthorized { code, message }
            | ServiceError::Forbidden { code, message }
            | ServiceError::Internal { code, message }
            | ServiceError::ServiceUnavailable { code, message } => {
                ErrorResponse::new(code.clone(), message.clone())
            }
            ServiceError::BadRequest {
                code,
                message,
                details,
            }
            | ServiceError::Conflict {
                code,
                message,
                details,
            }
            | ServiceError::UnprocessableEntity {
                code,
                message,
                details,
            } => ErrorResponse::with_details(code.clone(), message.clone(), details.clone()),
        }
    }
}

// --- axum integration ---

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for ServiceError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            ServiceError::NotFound { .. } => axum::http::StatusCode::NOT_FOUND,
            ServiceError::BadRequest { .. } => axum::http::StatusCode::BAD_REQUEST,
            ServiceError::Unauthorized { .. } => axum::http::StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden { .. } => axum::http::StatusCode::FORBIDDEN,
            ServiceError::Conflict { .. } => axum::http::StatusCode::CONFLICT,
            ServiceError::UnprocessableEntity { .. } => {
                axum::http::StatusCode::UNPROCESSABLE_ENTITY
            }
            ServiceError::Internal { .. } => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::ServiceUnavailable { .. } => {
                axum::http::StatusCode::SERVICE_UNAVAILABLE
            }
        };

        let body = self.to_error_response();
        (status, axum::Json(body)).into_response()
    }
}

// --- Well-known error codes ---

/// 認証・認可のエラーコード。
pub mod auth {
    use super::ErrorCode;

    pub fn unauthorized() -> ErrorCode {
        ErrorCode::new("ERP_AUTH_UNAUTHORIZED")
    }

    pub fn token_expired() -> ErrorCode {
        ErrorCode::new("ERP_AUTH_TOKEN_EXPIRED")
    }

    pub fn invalid_token() -> ErrorCode {
        ErrorCode::new("ERP_AUTH_INVALID_TOKEN")
    }

    pub fn missing_claims() -> ErrorCode {
        ErrorCode::new("ERP_AUTH_MISSING_CLAIMS")
    }

    pub fn permission_denied() -> ErrorCode {
        ErrorCode::new("ERP_AUTH_PERMISSION_DENIED")
    }
}

/// マスタデータのエラーコード。
pub mod masters {
    use super::ErrorCode;

    pub fn unknown_master() -> ErrorCode {
        ErrorCode::new("ERP_MASTERS_UNKNOWN_MASTER")
    }

    pub fn not_found() -> ErrorCode {
        ErrorCode::new("ERP_MASTERS_NOT_FOUND")
    }

    pub fn validation_failed() -> ErrorCode {
        ErrorCode::new("ERP_MASTERS_VALIDATION_FAILED")
    }

    pub fn invalid_query() -> ErrorCode {
        ErrorCode::new("ERP_MASTERS_INVALID_QUERY")
    }

    pub fn duplicate_value() -> ErrorCode {
        ErrorCode::new("ERP_MASTERS_DUPLICATE_VALUE")
    }

    pub fn in_use() -> ErrorCode {
        ErrorCode::new("ERP_MASTERS_IN_USE")
    }

    pub fn operation_not_allowed() -> ErrorCode {
        ErrorCode::new("ERP_MASTERS_OPERATION_NOT_ALLOWED")
    }

    pub fn internal_error() -> ErrorCode {
        ErrorCode::new("ERP_MASTERS_INTERNAL_ERROR")
    }
}

/// 在庫のエラーコード。
pub mod inventory {
    use super::ErrorCode;

    pub fn batch_not_found() -> ErrorCode {
        ErrorCode::new("ERP_INVENTORY_BATCH_NOT_FOUND")
    }

    pub fn validation_failed() -> ErrorCode {
        ErrorCode::new("ERP_INVENTORY_VALIDATION_FAILED")
    }

    pub fn negative_stock() -> ErrorCode {
        ErrorCode::new("ERP_INVENTORY_NEGATIVE_STOCK")
    }

    pub fn stock_changed() -> ErrorCode {
        ErrorCode::new("ERP_INVENTORY_STOCK_CHANGED")
    }

    pub fn internal_error() -> ErrorCode {
        ErrorCode::new("ERP_INVENTORY_INTERNAL_ERROR")
    }
}

/// 仕入（GRN）のエラーコード。
pub mod purchases {
    use super::ErrorCode;

    pub fn grn_not_found() -> ErrorCode {
        ErrorCode::new("ERP_PURCHASES_GRN_NOT_FOUND")
    }

    pub fn validation_failed() -> ErrorCode {
        ErrorCode::new("ERP_PURCHASES_VALIDATION_FAILED")
    }

    pub fn invalid_status() -> ErrorCode {
        ErrorCode::new("ERP_PURCHASES_INVALID_STATUS")
    }

    pub fn nothing_accepted() -> ErrorCode {
        ErrorCode::new("ERP_PURCHASES_NOTHING_ACCEPTED")
    }

    pub fn internal_error() -> ErrorCode {
        ErrorCode::new("ERP_PURCHASES_INTERNAL_ERROR")
    }
}

/// 販売のエラーコード。
pub mod sales {
    use super::ErrorCode;

    pub fn invoice_not_found() -> ErrorCode {
        ErrorCode::new("ERP_SALES_INVOICE_NOT_FOUND")
    }

    pub fn validation_failed() -> ErrorCode {
        ErrorCode::new("ERP_SALES_VALIDATION_FAILED")
    }

    pub fn insufficient_stock() -> ErrorCode {
        ErrorCode::new("ERP_SALES_INSUFFICIENT_STOCK")
    }

    pub fn stock_changed() -> ErrorCode {
        ErrorCode::new("ERP_SALES_STOCK_CHANGED")
    }

    pub fn invalid_status() -> ErrorCode {
        ErrorCode::new("ERP_SALES_INVALID_STATUS")
    }

    pub fn internal_error() -> ErrorCode {
        ErrorCode::new("ERP_SALES_INTERNAL_ERROR")
    }
}

/// 会計のエラーコード。
pub mod finance {
    use super::ErrorCode;

    pub fn account_not_found() -> ErrorCode {
        ErrorCode::new("ERP_FINANCE_ACCOUNT_NOT_FOUND")
    }

    pub fn entry_not_found() -> ErrorCode {
        ErrorCode::new("ERP_FINANCE_ENTRY_NOT_FOUND")
    }

    pub fn validation_failed() -> ErrorCode {
        ErrorCode::new("ERP_FINANCE_VALIDATION_FAILED")
    }

    pub fn unbalanced_entry() -> ErrorCode {
        ErrorCode::new("ERP_FINANCE_UNBALANCED_ENTRY")
    }

    pub fn account_code_conflict() -> ErrorCode {
        ErrorCode::new("ERP_FINANCE_ACCOUNT_CODE_CONFLICT")
    }

    pub fn internal_error() -> ErrorCode {
        ErrorCode::new("ERP_FINANCE_INTERNAL_ERROR")
    }
}
