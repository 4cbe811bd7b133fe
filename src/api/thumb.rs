use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use crate::error::AppError;
use crate::state::AppState;
use crate::thumbnail::{ensure_thumb, ThumbOutcome};

#[derive(Deserialize)]
pub struct ThumbQuery {
    path: String,
}

pub async fn thumb(
    State(state): State<AppState>,
    Query(query): Query<ThumbQuery>,
) -> Result<Response, AppError> {
    let src = state.roots.resolve(&query.path)?;

    match ensure_thumb(&src, &state.thumb_cache).await? {
        ThumbOutcome::Ready(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .map_err(|e| AppError::Internal(e.into()))?;
            let stream = ReaderStream::new(file);
            Ok((
                [(header::CONTENT_TYPE, "image/jpeg")],
                Body::from_stream(stream),
            )
                .into_response())
        }
        ThumbOutcome::SrcMissing => Err(AppError::SourceMissing),
        ThumbOutcome::CachedFailure => Err(AppError::CachedThumbFailure),
    }
}
