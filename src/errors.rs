use serde::Serialize;

/// Error type shared by every command, query and service in the engine.
///
/// The first four variants are the recoverable kinds callers are expected to
/// handle; `ConsistencyViolation` signals a broken ledger invariant (a logic
/// or concurrency-control defect, not bad input) and always aborts the
/// enclosing transaction.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Consistency violation: {0}")]
    ConsistencyViolation(String),

    #[error("Event error: {0}")]
    EventError(String),
}

impl ServiceError {
    /// Label used by the failure counters in the command metrics.
    pub fn metric_label(&self) -> &'static str {
        match self {
            ServiceError::DatabaseError(_) => "database_error",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::ValidationError(_) => "validation_error",
            ServiceError::InsufficientStock(_) => "insufficient_stock",
            ServiceError::InvalidOperation(_) => "invalid_operation",
            ServiceError::ConsistencyViolation(_) => "consistency_violation",
            ServiceError::EventError(_) => "event_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_detail() {
        let err = ServiceError::InsufficientStock("requested 10, remaining 4".to_string());
        assert_eq!(
            err.to_string(),
            "Insufficient stock: requested 10, remaining 4"
        );
    }

    #[test]
    fn db_error_converts() {
        let err: ServiceError = sea_orm::DbErr::Custom("boom".to_string()).into();
        assert!(matches!(err, ServiceError::DatabaseError(_)));
    }
}
