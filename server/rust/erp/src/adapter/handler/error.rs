//! ユースケースのエラーを HTTP エラーレスポンスへ変換する。

use yeelo_server_common::error::{finance, inventory, masters, purchases, sales};
use yeelo_server_common::{ErrorCode, ErrorDetail, ServiceError};

use crate::domain::service::record_validator::FieldViolation;
use crate::usecase::manage_inventory::InventoryError;
use crate::usecase::manage_ledger::FinanceError;
use crate::usecase::manage_master_records::MasterDataError;
use crate::usecase::receive_goods::PurchaseError;
use crate::usecase::sales_invoices::SalesError;

fn details(violations: Vec<FieldViolation>) -> Vec<ErrorDetail> {
    violations
        .into_iter()
        .map(|v| ErrorDetail::new(v.field, v.reason, v.message))
        .collect()
}

fn bad_request(code: ErrorCode, violations: Vec<FieldViolation>) -> ServiceError {
    ServiceError::BadRequest {
        code,
        message: "request validation failed".to_string(),
        details: details(violations),
    }
}

fn conflict(code: ErrorCode, message: impl Into<String>) -> ServiceError {
    ServiceError::Conflict {
        code,
        message: message.into(),
        details: vec![],
    }
}

fn unprocessable(code: ErrorCode, message: impl Into<String>) -> ServiceError {
    ServiceError::UnprocessableEntity {
        code,
        message: message.into(),
        details: vec![],
    }
}

impl From<MasterDataError> for ServiceError {
    fn from(err: MasterDataError) -> Self {
        let message = err.to_string();
        match err {
            MasterDataError::UnknownMaster(_) => ServiceError::NotFound {
                code: masters::unknown_master(),
                message,
            },
            MasterDataError::NotFound { .. } => ServiceError::NotFound {
                code: masters::not_found(),
                message,
            },
            MasterDataError::Validation(v) => bad_request(masters::validation_failed(), v),
            MasterDataError::InvalidQuery(reason) => ServiceError::BadRequest {
                code: masters::invalid_query(),
                message: reason,
                details: vec![],
            },
            MasterDataError::Duplicate(v) => ServiceError::Conflict {
                code: masters::duplicate_value(),
                message: "a record with the same value already exists".to_string(),
                details: details(v),
            },
            MasterDataError::InUse(_) => conflict(masters::in_use(), message),
            MasterDataError::NotAllowed(_) => {
                unprocessable(masters::operation_not_allowed(), message)
            }
            MasterDataError::Internal(msg) => ServiceError::internal("masters", msg),
        }
    }
}

impl From<InventoryError> for ServiceError {
    fn from(err: InventoryError) -> Self {
        let message = err.to_string();
        match err {
            InventoryError::BatchNotFound(_) => ServiceError::NotFound {
                code: inventory::batch_not_found(),
                message,
            },
            InventoryError::Validation(v) => bad_request(inventory::validation_failed(), v),
            InventoryError::NegativeStock { .. } => {
                unprocessable(inventory::negative_stock(), message)
            }
            InventoryError::StockChanged => conflict(inventory::stock_changed(), message),
            InventoryError::Internal(msg) => ServiceError::internal("inventory", msg),
        }
    }
}

impl From<PurchaseError> for ServiceError {
    fn from(err: PurchaseError) -> Self {
        let message = err.to_string();
        match err {
            PurchaseError::GrnNotFound(_) => ServiceError::NotFound {
                code: purchases::grn_not_found(),
                message,
            },
            PurchaseError::Validation(v) => bad_request(purchases::validation_failed(), v),
            PurchaseError::InvalidStatus(_) => conflict(purchases::invalid_status(), message),
            PurchaseError::NothingAccepted => {
                unprocessable(purchases::nothing_accepted(), message)
            }
            PurchaseError::Internal(msg) => ServiceError::internal("purchases", msg),
        }
    }
}

impl From<SalesError> for ServiceError {
    fn from(err: SalesError) -> Self {
        let message = err.to_string();
        match err {
            SalesError::InvoiceNotFound(_) => ServiceError::NotFound {
                code: sales::invoice_not_found(),
                message,
            },
            SalesError::Validation(v) => bad_request(sales::validation_failed(), v),
            SalesError::InsufficientStock(shortfalls) => ServiceError::UnprocessableEntity {
                code: sales::insufficient_stock(),
                message,
                details: shortfalls
                    .into_iter()
                    .map(|s| {
                        ErrorDetail::new(
                            s.product_id.to_string(),
                            "insufficient_stock",
                            format!(
                                "{}: requested {}, available {}",
                                s.product_name, s.requested, s.available
                            ),
                        )
                    })
                    .collect(),
            },
            SalesError::StockChanged => conflict(sales::stock_changed(), message),
            SalesError::InvalidStatus(_) => conflict(sales::invalid_status(), message),
            SalesError::Internal(msg) => ServiceError::internal("sales", msg),
        }
    }
}

impl From<FinanceError> for ServiceError {
    fn from(err: FinanceError) -> Self {
        let message = err.to_string();
        match err {
            FinanceError::AccountNotFound(_) => ServiceError::NotFound {
                code: finance::account_not_found(),
                message,
            },
            FinanceError::EntryNotFound(_) => ServiceError::NotFound {
                code: finance::entry_not_found(),
                message,
            },
            FinanceError::Validation(v) => bad_request(finance::validation_failed(), v),
            FinanceError::Unbalanced(_) => unprocessable(finance::unbalanced_entry(), message),
            FinanceError::AccountCodeConflict(_) => {
                conflict(finance::account_code_conflict(), message)
            }
            FinanceError::Internal(msg) => ServiceError::internal("finance", msg),
        }
    }
}

/// パス・クエリの値が解釈できない場合の 400。
pub fn invalid_parameter(module: &str, field: &str, message: impl Into<String>) -> ServiceError {
    let message = message.into();
    ServiceError::bad_request_with_details(
        module,
        message.clone(),
        vec![ErrorDetail::new(field, "invalid_format", message)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::goods_receipt::GrnStatus;
    use crate::usecase::sales_invoices::StockShortfall;
    use uuid::Uuid;

    #[test]
    fn test_duplicate_maps_to_conflict_with_details() {
        let err: ServiceError = MasterDataError::Duplicate(vec![FieldViolation::new(
            "name",
            "duplicate_value",
            "name already exists",
        )])
        .into();
        match err {
            ServiceError::Conflict { code, details, .. } => {
                assert_eq!(code.as_str(), "ERP_MASTERS_DUPLICATE_VALUE");
                assert_eq!(details[0].field, "name");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_insufficient_stock_is_unprocessable() {
        let err: ServiceError = SalesError::InsufficientStock(vec![StockShortfall {
            product_id: Uuid::nil(),
            product_name: "Arnica".to_string(),
            requested: 5,
            available: 2,
        }])
        .into();
        assert!(matches!(
            err,
            ServiceError::UnprocessableEntity { ref code, ref details, .. }
                if code.as_str() == "ERP_SALES_INSUFFICIENT_STOCK" && details.len() == 1
        ));
    }

    #[test]
    fn test_invalid_grn_status_is_conflict() {
        let err: ServiceError = PurchaseError::InvalidStatus(GrnStatus::Approved).into();
        assert_eq!(err.code().as_str(), "ERP_PURCHASES_INVALID_STATUS");
    }

    #[test]
    fn test_internal_error_hides_message() {
        let err: ServiceError = FinanceError::Internal("connection refused".to_string()).into();
        assert_eq!(err.to_string(), "internal server error");
    }
}
