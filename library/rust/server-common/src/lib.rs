//! yeelo-server-common: Yeelo ERP サーバー共通基盤。
//!
//! `ERP_{MODULE}_{ERROR}` 形式の構造化エラーコード、統一エラーレスポンス型、
//! axum 連携（`IntoResponse`）とグレースフルシャットダウン用シグナル待機を提供する。

pub mod error;

#[cfg(feature = "shutdown")]
pub mod shutdown;

pub use error::{ErrorBody, ErrorCode, ErrorDetail, ErrorResponse, ServiceError};
