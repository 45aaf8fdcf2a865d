// src/error.rs
use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use rust_decimal::Decimal;
use serde_json::json;
use thiserror::Error;

/// Every failure a reconciliation call can end with. Exactly one is surfaced per call and
/// the whole batch transaction is rolled back.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error(
        "Delivery {billing_doc_no}, product {material_code} with batch {batch}: delivery + return quantity ({submitted}) does not match sales quantity ({expected})"
    )]
    QuantityMismatch {
        billing_doc_no: String,
        material_code: String,
        batch: String,
        submitted: Decimal,
        expected: Decimal,
    },

    #[error("Duplicate entry in request: {0}")]
    DuplicateRequest(String),

    #[error("storage failure: {0}")]
    StorageFailure(#[from] sqlx::Error),
}

impl AppError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        AppError::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "invalid_input",
            AppError::NotFound(_) => "not_found",
            AppError::QuantityMismatch { .. } => "quantity_mismatch",
            AppError::DuplicateRequest(_) => "duplicate_request",
            AppError::StorageFailure(_) => "storage_failure",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::QuantityMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::DuplicateRequest(_) => StatusCode::CONFLICT,
            AppError::StorageFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match &self {
            AppError::StorageFailure(e) => {
                tracing::error!(error = %e, "Storage failure");
                "Database error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": error_message,
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn quantity_mismatch_names_delivery_and_line_item() {
        let err = AppError::QuantityMismatch {
            billing_doc_no: "9000000001".into(),
            material_code: "MAT-1".into(),
            batch: "B1".into(),
            submitted: dec!(9),
            expected: dec!(10),
        };
        let msg = err.to_string();
        assert!(msg.contains("9000000001"));
        assert!(msg.contains("MAT-1"));
        assert!(msg.contains("(9)"));
        assert!(msg.contains("(10)"));
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn storage_failure_hides_driver_message() {
        let resp = AppError::StorageFailure(sqlx::Error::PoolTimedOut).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Database error occurred");
        assert_eq!(body["code"], "storage_failure");
    }

    #[test]
    fn codes_map_to_statuses() {
        assert_eq!(AppError::invalid_input("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::DuplicateRequest("1".into()).status(), StatusCode::CONFLICT);
        assert_eq!(AppError::DuplicateRequest("1".into()).code(), "duplicate_request");
    }
}
