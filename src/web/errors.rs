// HTTP error mapping.
//
// Every failure leaves as `{ "error": <code>, "message": <text> }` with the
// status its kind calls for. Storage details are logged, never returned.

use crate::core::comments::CommentError;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Comment(#[from] CommentError),

    #[error("Human verification failed")]
    CaptchaFailed,

    #[error("Human verification is temporarily unavailable")]
    CaptchaUnavailable,

    #[error("Missing or invalid admin token")]
    Unauthorized,

    /// Body, path or query could not be parsed.
    #[error("{0}")]
    BadRequest(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Comment(err) => match err {
                CommentError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                CommentError::InvalidInput(_)
                | CommentError::TooLong { .. }
                | CommentError::SuspiciousContent
                | CommentError::CrossItemReply => StatusCode::BAD_REQUEST,
                CommentError::NotFound(_) => StatusCode::NOT_FOUND,
                CommentError::StorageError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::CaptchaFailed | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::CaptchaUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Comment(err) => match err {
                CommentError::RateLimited { .. } => "rate_limited",
                CommentError::InvalidInput(_) => "invalid_input",
                CommentError::TooLong { .. } => "too_long",
                CommentError::SuspiciousContent => "suspicious_content",
                CommentError::NotFound(_) => "not_found",
                CommentError::CrossItemReply => "cross_item_reply",
                CommentError::StorageError(_) => "storage_failure",
            },
            ApiError::CaptchaFailed => "captcha_failed",
            ApiError::CaptchaUnavailable => "captcha_unavailable",
            ApiError::Unauthorized => "unauthorized",
            ApiError::BadRequest(_) => "bad_request",
        }
    }

    /// Text safe to show the caller.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Comment(CommentError::SuspiciousContent) => {
                "Your comment could not be posted.".to_string()
            }
            ApiError::Comment(CommentError::StorageError(_)) => {
                "Something went wrong, please try again later.".to_string()
            }
            ApiError::Comment(CommentError::RateLimited { retry_after }) => format!(
                "Too many comments. Please try again in {} seconds.",
                ceil_secs(*retry_after)
            ),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Comment(CommentError::StorageError(detail)) = &self {
            tracing::error!(error = %detail, "Request failed on storage");
        }

        let body = ErrorBody {
            error: self.code(),
            message: self.public_message(),
        };
        let mut response = (self.status(), Json(body)).into_response();

        if let ApiError::Comment(CommentError::RateLimited { retry_after }) = &self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(ceil_secs(*retry_after)));
        }

        response
    }
}

/// Whole seconds, rounded up so clients never retry too early.
pub fn ceil_secs(duration: Duration) -> u64 {
    duration
        .as_secs()
        .saturating_add(u64::from(duration.subsec_nanos() > 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceil_secs() {
        assert_eq!(ceil_secs(Duration::ZERO), 0);
        assert_eq!(ceil_secs(Duration::from_secs(60)), 60);
        assert_eq!(ceil_secs(Duration::from_millis(59_001)), 60);
        assert_eq!(ceil_secs(Duration::from_millis(1)), 1);
        assert_eq!(ceil_secs(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_storage_detail_is_not_exposed() {
        let err = ApiError::from(CommentError::StorageError("disk I/O error at page 7".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), "storage_failure");
        assert!(!err.public_message().contains("disk"));
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = ApiError::from(CommentError::RateLimited {
            retry_after: Duration::from_millis(599_500),
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "600");
    }
}
