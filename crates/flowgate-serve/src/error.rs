//! API error types and response formatting.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use flowgate_core::{DateRange, RejectionBreakdown};
use flowgate_ingest::{BatchRejection, Error as IngestError};
use serde::Serialize;

/// API error type that converts to appropriate HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Structurally invalid request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The batch schema lacks required columns.
    #[error("missing required columns")]
    MissingColumns(Vec<&'static str>),

    /// The pipeline rejected the batch before persistence.
    #[error(transparent)]
    Rejected(#[from] BatchRejection),

    /// Duplicate idempotency key.
    #[error("already ingested")]
    Duplicate,

    /// Internal failure. Always opaque to the caller.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::MissingRequiredColumn(missing) => Self::MissingColumns(missing),
            IngestError::Rejected(rejection) => Self::Rejected(rejection),
            IngestError::AlreadyIngested => Self::Duplicate,
            IngestError::BadRequest(msg) => Self::BadRequest(msg),
            IngestError::Storage(msg) => Self::Internal(anyhow::anyhow!(msg)),
        }
    }
}

/// JSON error response body: a reason code plus derived counts only.
#[derive(Debug, Clone, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    missing: Option<Vec<&'static str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rows_accepted: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rows_rejected: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rejection_breakdown: Option<RejectionBreakdown>,
    #[serde(skip_serializing_if = "Option::is_none")]
    accepted_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    min_accept_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    declared_range: Option<DateRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inferred_range: Option<DateRange>,
}

impl ErrorResponse {
    fn code(error: &str) -> Self {
        Self {
            error: error.to_string(),
            message: None,
            missing: None,
            rows_accepted: None,
            rows_rejected: None,
            rejection_breakdown: None,
            accepted_ratio: None,
            min_accept_ratio: None,
            declared_range: None,
            inferred_range: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::BadRequest(msg) => {
                let mut body = ErrorResponse::code("BAD_REQUEST");
                body.message = Some(msg);
                (StatusCode::BAD_REQUEST, body)
            }
            Self::MissingColumns(missing) => {
                let mut body = ErrorResponse::code("MISSING_REQUIRED_COLUMN");
                body.missing = Some(missing);
                (StatusCode::BAD_REQUEST, body)
            }
            Self::Rejected(rejection) => {
                let mut body = ErrorResponse::code(rejection.reason.as_str());
                body.rows_accepted = Some(rejection.rows_accepted);
                body.rows_rejected = Some(rejection.rows_rejected);
                body.rejection_breakdown = Some(rejection.rejection_breakdown);
                body.accepted_ratio = rejection.accepted_ratio;
                body.min_accept_ratio = rejection.min_accept_ratio;
                body.declared_range = rejection.declared_range;
                body.inferred_range = rejection.inferred_range;
                (StatusCode::BAD_REQUEST, body)
            }
            Self::Duplicate => (StatusCode::CONFLICT, ErrorResponse::code("ALREADY_INGESTED")),
            Self::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                let mut body = ErrorResponse::code("INTERNAL_ERROR");
                body.message = Some("An internal error occurred".to_string());
                (StatusCode::INTERNAL_SERVER_ERROR, body)
            }
        };

        (status, Json(body)).into_response()
    }
}
