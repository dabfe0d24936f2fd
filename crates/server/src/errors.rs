use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use service::MarketError;
use thiserror::Error;
use tracing::error;

/// Error body shared by every handler: `{"success": false, "message", "code"}`.
#[derive(Debug)]
pub struct JsonApiError {
    pub status: StatusCode,
    pub message: String,
    pub code: Option<u16>,
}

impl JsonApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into(), code: None }
    }
}

impl From<MarketError> for JsonApiError {
    fn from(e: MarketError) -> Self {
        let status = match &e {
            MarketError::Validation(_)
            | MarketError::InvalidDate
            | MarketError::DuplicateBid
            | MarketError::OutOfRange { .. }
            | MarketError::AlreadyReviewed => StatusCode::BAD_REQUEST,
            // non-owners cannot tell a foreign request from a missing one
            MarketError::NotFound(_) | MarketError::BidNotFound | MarketError::Authorization => StatusCode::NOT_FOUND,
            MarketError::StateConflict(_) | MarketError::RequestNotActive => StatusCode::CONFLICT,
            MarketError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            MarketError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match &e {
            MarketError::Authorization => "service request not found".to_string(),
            MarketError::Repository(detail) => {
                error!(code = e.code(), error = %detail, "storage failure");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        Self { status, message, code: Some(e.code()) }
    }
}

// Malformed input is a validation failure whatever part of the request it came from.
fn rejected(detail: String) -> JsonApiError {
    tracing::debug!(error = %detail, "request rejected by extractor");
    JsonApiError::from(MarketError::validation(detail))
}

impl From<JsonRejection> for JsonApiError {
    fn from(r: JsonRejection) -> Self { rejected(r.body_text()) }
}

impl From<PathRejection> for JsonApiError {
    fn from(r: PathRejection) -> Self { rejected(r.body_text()) }
}

impl From<QueryRejection> for JsonApiError {
    fn from(r: QueryRejection) -> Self { rejected(r.body_text()) }
}

impl IntoResponse for JsonApiError {
    fn into_response(self) -> Response {
        let body = match self.code {
            Some(code) => json!({ "success": false, "message": self.message, "code": code }),
            None => json!({ "success": false, "message": self.message }),
        };
        (self.status, Json(body)).into_response()
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Any(#[from] anyhow::Error),
}
