use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Analysis error with rich context and automatic error trait implementations
///
/// Only structural faults live here. A nested statistics field that fails to
/// decode is treated as absent by the parsers and never becomes an `ApiError`.
#[derive(Error, Debug)]
pub enum ApiError {
    // Validation errors 4xxx
    #[error("Invalid Query ID format: '{query_id}'. Expected a UUID such as 01b2c3d4-0000-1111-2222-333344445555")]
    InvalidQueryId { query_id: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Resource errors 3xxx
    #[error("No operator statistics found for query {query_id}. The query may still be running, may have failed before execution, or the ID may belong to another account")]
    OperatorStatsNotFound { query_id: String },

    // System errors 5xxx
    #[error("Internal error: {message}")]
    InternalError { message: String, details: Option<String> },

    // Generic wrapper for other errors - auto-convert from anyhow::Error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Error taxonomy exposed to callers so they can branch without text matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Internal,
}

impl ApiError {
    /// Helper to create invalid query id error
    pub fn invalid_query_id(query_id: impl Into<String>) -> Self {
        Self::InvalidQueryId { query_id: query_id.into() }
    }

    /// Helper to create not found error
    pub fn not_found(query_id: impl Into<String>) -> Self {
        Self::OperatorStatsNotFound { query_id: query_id.into() }
    }

    /// Helper to create invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Helper to create internal error
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError { message: message.into(), details: None }
    }

    /// Helper to create internal error carrying a diagnostic trace
    pub fn internal_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self::InternalError { message: message.into(), details: Some(details.into()) }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidQueryId { .. } | Self::InvalidInput(_) => ErrorKind::Validation,
            Self::OperatorStatsNotFound { .. } => ErrorKind::NotFound,
            Self::InternalError { .. } | Self::Other(_) => ErrorKind::Internal,
        }
    }

    /// Get numeric error code, grouped by kind
    pub fn error_code(&self) -> i32 {
        match self {
            // Resource errors 3xxx
            Self::OperatorStatsNotFound { .. } => 3001,

            // Validation errors 4xxx
            Self::InvalidQueryId { .. } => 4001,
            Self::InvalidInput(_) => 4002,

            // System errors 5xxx
            Self::InternalError { .. } => 5001,
            Self::Other(_) => 5002,
        }
    }

    /// Flattened diagnostic trace for internal faults
    ///
    /// The source chain is joined into one line so the payload stays
    /// self-contained for consumers that read it line by line.
    pub fn details(&self) -> Option<String> {
        match self {
            Self::InternalError { details, .. } => details.clone(),
            Self::Other(err) => Some(
                err.chain()
                    .map(|cause| cause.to_string())
                    .collect::<Vec<_>>()
                    .join(" <- "),
            ),
            _ => None,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.error_code() {
            3000..=3999 => StatusCode::NOT_FOUND,
            4001..=4999 => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Machine-parseable error payload
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub status: &'static str,
    pub kind: ErrorKind,
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_id: Option<String>,
    pub timestamp: String,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiErrorResponse {
    pub fn from_error(err: &ApiError, query_id: Option<&str>) -> Self {
        Self {
            status: "error",
            kind: err.kind(),
            code: err.error_code(),
            query_id: query_id.map(str::to_string),
            timestamp: chrono::Utc::now().to_rfc3339(),
            error: err.to_string(),
            details: err.details(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ApiErrorResponse::from_error(&self, None);
        let body = serde_json::to_string(&body).unwrap_or_else(|_| {
            r#"{"status":"error","error":"failed to serialize error payload"}"#.to_string()
        });

        (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
    }
}

/// Implement From for serde_json::Error
impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::internal_with_details("JSON serialization error", err.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_and_codes() {
        assert_eq!(ApiError::invalid_query_id("abc").kind(), ErrorKind::Validation);
        assert_eq!(ApiError::not_found("abc").kind(), ErrorKind::NotFound);
        assert_eq!(ApiError::internal_error("boom").kind(), ErrorKind::Internal);

        assert_eq!(ApiError::not_found("abc").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::invalid_query_id("abc").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::internal_error("boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_messages_keep_stable_prefixes() {
        assert!(ApiError::invalid_query_id("abc").to_string().starts_with("Invalid Query ID format"));
        assert!(ApiError::not_found("abc").to_string().starts_with("No operator statistics found"));
    }

    #[test]
    fn test_anyhow_chain_is_flattened() {
        let err: ApiError = anyhow::anyhow!("root cause").context("while condensing").into();
        assert_eq!(err.details().as_deref(), Some("while condensing <- root cause"));
    }

    #[test]
    fn test_error_payload_shape() {
        let err = ApiError::internal_with_details("boom", "trace");
        let payload = ApiErrorResponse::from_error(&err, Some("q"));
        let value = serde_json::to_value(&payload).unwrap();

        assert_eq!(value["status"], "error");
        assert_eq!(value["kind"], "internal");
        assert_eq!(value["details"], "trace");
        assert_eq!(value["query_id"], "q");
    }
}
