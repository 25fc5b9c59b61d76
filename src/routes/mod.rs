pub mod health;
pub mod jobs;
pub mod metrics;
pub mod scans;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::db::store::StoreError;
use crate::services::jobs::SubmitError;

/// Header carrying the caller's owner id.
pub const OWNER_HEADER: &str = "x-owner-id";
const DEFAULT_OWNER_ID: i64 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("internal error")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "Request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<SubmitError> for ApiError {
    fn from(e: SubmitError) -> Self {
        match e {
            SubmitError::Invalid(_) | SubmitError::Intent(_) => ApiError::BadRequest(e.to_string()),
            SubmitError::ScanNotFound(_) => ApiError::NotFound("scan"),
            SubmitError::Store(e @ StoreError::ScanExists(_)) => ApiError::Conflict(e.to_string()),
            SubmitError::Store(e) => e.into(),
        }
    }
}

/// Owner id from the request headers. Absent means the default owner.
pub fn owner_id(headers: &HeaderMap) -> Result<i64, ApiError> {
    match headers.get(OWNER_HEADER) {
        None => Ok(DEFAULT_OWNER_ID),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|id| *id > 0)
            .ok_or_else(|| ApiError::BadRequest(format!("invalid {OWNER_HEADER} header"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_owner_id_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(owner_id(&headers).unwrap(), 1);

        headers.insert(OWNER_HEADER, HeaderValue::from_static("42"));
        assert_eq!(owner_id(&headers).unwrap(), 42);

        headers.insert(OWNER_HEADER, HeaderValue::from_static("abc"));
        assert!(matches!(owner_id(&headers), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_submit_error_status() {
        let resp = ApiError::from(SubmitError::Invalid("limit".to_string())).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let resp = ApiError::from(SubmitError::ScanNotFound(uuid::Uuid::nil())).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = ApiError::from(SubmitError::Store(StoreError::ScanExists(uuid::Uuid::nil())))
            .into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }
}
