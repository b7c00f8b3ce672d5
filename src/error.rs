use crate::engine::LedgerError;
use crate::import::ImportError;
use crate::service::ServiceError;
use crate::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Unprocessable: {0}")]
    Unprocessable(String),
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientBasis { .. } => AppError::Unprocessable(err.to_string()),
            LedgerError::DuplicateLot(_) => AppError::Conflict(err.to_string()),
            LedgerError::InsufficientLotQuantity { .. } | LedgerError::UnknownLot(_) => {
                error!(error = %err, "ledger invariant violated");
                AppError::Internal(err.to_string())
            }
            LedgerError::InvalidLot { .. }
            | LedgerError::InvalidDisposal { .. }
            | LedgerError::InvalidQuantity(_)
            | LedgerError::InvalidRate(_)
            | LedgerError::Overflow(_) => AppError::BadRequest(err.to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) | StoreError::Duplicate(_) => {
                AppError::Conflict(err.to_string())
            }
            StoreError::NotFound(_) => AppError::NotFound(err.to_string()),
            StoreError::Db(_) | StoreError::Corrupt(_) => {
                error!(error = %err, "store failure");
                AppError::Internal(err.to_string())
            }
        }
    }
}

impl From<ImportError> for AppError {
    fn from(err: ImportError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Ledger(e) => e.into(),
            ServiceError::Store(e) => e.into(),
            ServiceError::Import(e) => e.into(),
            ServiceError::ImportRow { line, source } => {
                AppError::from(*source).map_message(|msg| format!("line {}: {}", line, msg))
            }
        }
    }
}

impl AppError {
    fn map_message(self, f: impl FnOnce(String) -> String) -> Self {
        match self {
            AppError::Config(msg) => AppError::Config(f(msg)),
            AppError::Internal(msg) => AppError::Internal(f(msg)),
            AppError::NotFound(msg) => AppError::NotFound(f(msg)),
            AppError::BadRequest(msg) => AppError::BadRequest(f(msg)),
            AppError::Conflict(msg) => AppError::Conflict(f(msg)),
            AppError::Unprocessable(msg) => AppError::Unprocessable(f(msg)),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Decimal, DisposalId, LotId};

    fn status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_ledger_error_statuses() {
        let basis = LedgerError::InsufficientBasis {
            disposal_id: DisposalId::new("d"),
            requested: Decimal::from(2),
            available: Decimal::from(1),
        };
        assert_eq!(status(basis.into()), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            status(LedgerError::DuplicateLot(LotId::new("a")).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(LedgerError::InvalidRate("x".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(LedgerError::Overflow("x".into()).into()),
            StatusCode::BAD_REQUEST
        );
        let defect = LedgerError::InsufficientLotQuantity {
            lot_id: LotId::new("a"),
            requested: Decimal::from(2),
            remaining: Decimal::from(1),
        };
        assert_eq!(status(defect.into()), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_store_conflict_is_409() {
        let err = ServiceError::Store(StoreError::Conflict(LotId::new("a")));
        assert_eq!(status(err.into()), StatusCode::CONFLICT);
    }

    #[test]
    fn test_import_row_keeps_status_and_line() {
        let err = ServiceError::ImportRow {
            line: 7,
            source: Box::new(ServiceError::Ledger(LedgerError::InsufficientBasis {
                disposal_id: DisposalId::new("d"),
                requested: Decimal::from(2),
                available: Decimal::zero(),
            })),
        };
        match AppError::from(err) {
            AppError::Unprocessable(msg) => assert!(msg.starts_with("line 7:")),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
