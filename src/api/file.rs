use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct FileQuery {
    path: String,
}

pub async fn file(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
) -> Result<Response, AppError> {
    let src = state.roots.resolve(&query.path)?;

    let metadata = tokio::fs::metadata(&src).await.map_err(|_| AppError::SourceMissing)?;
    if !metadata.is_file() {
        return Err(AppError::SourceMissing);
    }

    let mime = mime_guess::from_path(&src).first_or_octet_stream();
    let handle = tokio::fs::File::open(&src)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;
    let stream = ReaderStream::new(handle);

    Ok((
        [(header::CONTENT_TYPE, mime.as_ref().to_string())],
        Body::from_stream(stream),
    )
        .into_response())
}
