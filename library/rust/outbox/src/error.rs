use uuid::Uuid;

/// OutboxError はアウトボックス操作に関するエラーを表す。
#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error("store error: {0}")]
    StoreError(String),

    #[cfg(feature = "postgres")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("publish error: {0}")]
    PublishError(String),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("outbox message {0} not found")]
    NotFound(Uuid),

    /// リース期間が chrono の表現範囲を超えている。
    #[error("invalid lease duration: {0}")]
    InvalidLease(#[from] chrono::OutOfRangeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error() {
        let err = OutboxError::StoreError("connection refused".to_string());
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_serialization_error_from_serde() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = OutboxError::from(source);
        assert!(matches!(err, OutboxError::SerializationError(_)));
    }

    #[test]
    fn test_not_found_names_message() {
        let id = Uuid::nil();
        assert_eq!(
            OutboxError::NotFound(id).to_string(),
            format!("outbox message {id} not found")
        );
    }
}
