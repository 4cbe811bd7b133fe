//! Unified error type for the HTTP surface.
//!
//! Anything internal propagates as [`anyhow::Error`] via `?`; at the edge
//! of a handler it is folded into [`AppError`], which knows how to render
//! itself as the response the spec's error table demands.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

/// Errors surfaced by the core components, mapped to specific HTTP
/// outcomes per the error handling table.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Unknown root, path escape, or malformed virtual path. 404.
    #[error("invalid path")]
    InvalidPath,

    /// The resolved source does not exist as a regular file. 404.
    #[error("source missing")]
    SourceMissing,

    /// A failure sentinel applies to this thumbnail. 410.
    #[error("thumbnail generation failed previously")]
    CachedThumbFailure,

    /// `list-batch` request body could not be processed. 400.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Anything else: internal server error.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::InvalidPath | AppError::SourceMissing => {
                StatusCode::NOT_FOUND.into_response()
            }
            AppError::CachedThumbFailure => StatusCode::GONE.into_response(),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, msg).into_response()
            }
            AppError::Internal(e) => {
                tracing::error!("internal error: {e:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": "internal server error"})),
                )
                    .into_response()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
