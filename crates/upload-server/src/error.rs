//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use orderdesk_protocol::ErrorBody;
use orderdesk_transfer::TransferError;

use crate::targets::TargetError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Target(#[from] TargetError),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::PayloadTooLarge(_) => "payload_too_large",
            Self::Internal(_) => "internal_error",
            Self::Transfer(e) => match e {
                TransferError::SessionNotFound(_) => "not_found",
                TransferError::InvalidChunkIndex { .. } => "invalid_chunk_index",
                TransferError::ChunkTooLarge { .. } => "payload_too_large",
                TransferError::Validation(_) => "validation_error",
                TransferError::UploadIncomplete { .. } => "upload_incomplete",
                TransferError::MissingChunk(_) => "missing_chunk",
                TransferError::SizeMismatch { .. } => "size_mismatch",
                TransferError::CompletionInProgress(_) => "completion_in_progress",
                TransferError::CorruptMetadata { .. }
                | TransferError::Storage(_)
                | TransferError::Io(_)
                | TransferError::Json(_) => "storage_error",
            },
            Self::Target(e) => match e {
                TargetError::NotFound { .. } => "not_found",
                TargetError::Storage(_) => "storage_error",
            },
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Transfer(e) => match e {
                TransferError::SessionNotFound(_) => StatusCode::NOT_FOUND,
                TransferError::InvalidChunkIndex { .. }
                | TransferError::Validation(_)
                | TransferError::UploadIncomplete { .. } => StatusCode::BAD_REQUEST,
                TransferError::ChunkTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                TransferError::MissingChunk(_)
                | TransferError::SizeMismatch { .. }
                | TransferError::CompletionInProgress(_) => StatusCode::CONFLICT,
                TransferError::CorruptMetadata { .. }
                | TransferError::Storage(_)
                | TransferError::Io(_)
                | TransferError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Target(e) => match e {
                TargetError::NotFound { .. } => StatusCode::NOT_FOUND,
                TargetError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(code = self.code(), "request failed: {self}");
        }
        let body = ErrorBody::new(self.code(), self.to_string());
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_errors_map_to_statuses() {
        let cases: Vec<(ApiError, StatusCode, &str)> = vec![
            (
                TransferError::SessionNotFound("u".into()).into(),
                StatusCode::NOT_FOUND,
                "not_found",
            ),
            (
                TransferError::InvalidChunkIndex {
                    index: 3,
                    total_chunks: 3,
                }
                .into(),
                StatusCode::BAD_REQUEST,
                "invalid_chunk_index",
            ),
            (
                TransferError::UploadIncomplete {
                    received: 2,
                    total_chunks: 3,
                }
                .into(),
                StatusCode::BAD_REQUEST,
                "upload_incomplete",
            ),
            (
                TransferError::ChunkTooLarge { size: 10, max: 5 }.into(),
                StatusCode::PAYLOAD_TOO_LARGE,
                "payload_too_large",
            ),
            (
                TransferError::SizeMismatch {
                    expected: 10,
                    actual: 9,
                }
                .into(),
                StatusCode::CONFLICT,
                "size_mismatch",
            ),
            (
                TransferError::CompletionInProgress("u".into()).into(),
                StatusCode::CONFLICT,
                "completion_in_progress",
            ),
            (
                TargetError::NotFound {
                    entity: "order",
                    id: 42,
                }
                .into(),
                StatusCode::NOT_FOUND,
                "not_found",
            ),
        ];

        for (err, status, code) in cases {
            assert_eq!(err.status_code(), status, "{err}");
            assert_eq!(err.code(), code, "{err}");
        }
    }

    #[test]
    fn message_carries_detail() {
        let err: ApiError = TransferError::SizeMismatch {
            expected: 3_145_728,
            actual: 3_145_000,
        }
        .into();
        let msg = err.to_string();
        assert!(msg.contains("3145728"));
        assert!(msg.contains("3145000"));

        let err: ApiError = TransferError::InvalidChunkIndex {
            index: -1,
            total_chunks: 3,
        }
        .into();
        assert!(err.to_string().contains("-1"));
    }
}
