//! Error envelope for the read API
//!
//! Every failure renders as
//! `{"error": {"code": "...", "message": "...", "details": [...]}}` with the
//! status of its error kind. Malformed query parameters are
//! `INVALID_REQUEST` / 400.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

use crate::search::SearchError;

pub const INVALID_REQUEST: &str = "INVALID_REQUEST";

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, INVALID_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &str {
        &self.body.code
    }
}

impl From<SearchError> for ApiError {
    fn from(err: SearchError) -> Self {
        let kind = err.kind();
        let status =
            StatusCode::from_u16(kind.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if kind.is_fatal() {
            tracing::error!(error = %err, "read API storage failure");
        }
        let details = err
            .details()
            .and_then(|d| serde_json::to_value(d).ok());
        let mut api = ApiError::new(status, kind.code(), err.to_string());
        api.body.details = details;
        api
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorEnvelope { error: self.body })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_error_mapping() {
        let err: ApiError = SearchError::NotFound {
            kind: "Entity",
            id: "entity:person/x".into(),
        }
        .into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn test_invalid_request() {
        let err = ApiError::invalid_request("limit must be a number");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), INVALID_REQUEST);
    }
}
