use axum::extract::rejection::JsonRejection;
use axum::extract::FromRequest;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::cache::CacheError;

/// Canonical error taxonomy. Every failure in the gateway crosses the HTTP
/// boundary as exactly one of these kinds, serialized in the Mastodon
/// envelope `{"error": code, "error_description": text}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("request cancelled")]
    Cancelled,

    #[error("upstream error: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        ApiError::NotFound(resource.into())
    }

    /// HTTP status and Mastodon error code for this kind.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Validation { .. } => (StatusCode::BAD_REQUEST, "invalid_request"),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Unprocessable(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "unprocessable_entity")
            }
            ApiError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limit_exceeded"),
            // An upstream 401 means the custodied session is no longer
            // honored; the client must re-authenticate.
            ApiError::Upstream(e) if e.status() == Some(reqwest::StatusCode::UNAUTHORIZED) => {
                (StatusCode::UNAUTHORIZED, "unauthorized")
            }
            ApiError::Upstream(e) if e.status() == Some(reqwest::StatusCode::BAD_REQUEST) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "unprocessable_entity")
            }
            ApiError::Upstream(e) if e.status() == Some(reqwest::StatusCode::NOT_FOUND) => {
                (StatusCode::NOT_FOUND, "not_found")
            }
            ApiError::Cancelled
            | ApiError::Upstream(_)
            | ApiError::Cache(_)
            | ApiError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_server_error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let description = match &self {
            ApiError::Upstream(e) => {
                tracing::error!(error = %e, "upstream request failed");
                "The request to the upstream service failed".to_string()
            }
            ApiError::Cache(e) => {
                tracing::error!(error = %e, "cache error");
                "internal server error".to_string()
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({ "error": code, "error_description": description });
        (status, axum::Json(body)).into_response()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Internal(format!("serialization error: {e}"))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// JSON extractor that reports malformed payloads in the Mastodon envelope.
/// Drop-in replacement for `axum::Json<T>`.
pub struct LoggedJson<T>(pub T);

impl<S, T> FromRequest<S> for LoggedJson<T>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(
        req: axum::extract::Request,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let path = req.uri().path().to_string();
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(LoggedJson(value)),
            Err(rejection) => {
                tracing::warn!(
                    path = %path,
                    error = %rejection,
                    "JSON parse error (client sent malformed payload)"
                );
                Err(ApiError::validation("body", rejection.body_text()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_the_taxonomy() {
        let cases: Vec<(ApiError, StatusCode, &str)> = vec![
            (
                ApiError::validation("redirect_uri", "mismatch"),
                StatusCode::BAD_REQUEST,
                "invalid_request",
            ),
            (ApiError::Unauthorized, StatusCode::UNAUTHORIZED, "unauthorized"),
            (ApiError::Forbidden, StatusCode::FORBIDDEN, "forbidden"),
            (
                ApiError::not_found("status"),
                StatusCode::NOT_FOUND,
                "not_found",
            ),
            (
                ApiError::Unprocessable("polls are not supported".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
                "unprocessable_entity",
            ),
            (
                ApiError::RateLimited,
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limit_exceeded",
            ),
            (
                ApiError::Cancelled,
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_server_error",
            ),
            (
                ApiError::Internal("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_server_error",
            ),
        ];

        for (err, status, code) in cases {
            let (s, c) = err.status_and_code();
            assert_eq!(s, status);
            assert_eq!(c, code);
        }
    }

    #[test]
    fn cache_errors_are_internal() {
        let err = ApiError::from(CacheError::NotConnected);
        let (status, code) = err.status_and_code();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(code, "internal_server_error");
    }
}
