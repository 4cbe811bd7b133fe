use std::path::Path;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

use crate::addressing::cache_key;
use crate::error::AppError;
use crate::media;
use crate::state::AppState;
use crate::waiter::wait_ready;

const PLAYLIST_READY_TIMEOUT: Duration = Duration::from_secs(10);
const PLAYLIST_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Deserialize)]
pub struct StartHlsQuery {
    path: String,
}

#[derive(Serialize)]
#[serde(untagged)]
enum StartHlsResponse {
    Playlist { playlist: String },
    Error { error: String },
}

pub async fn start_hls(
    State(state): State<AppState>,
    Query(query): Query<StartHlsQuery>,
) -> Result<Json<StartHlsResponse>, AppError> {
    let src = state.roots.resolve(&query.path)?;

    if tokio::fs::metadata(&src).await.is_err() {
        return Err(AppError::SourceMissing);
    }

    if !media::is_video(&src) {
        return Ok(Json(StartHlsResponse::Error {
            error: "not a media file ffmpeg can stream".into(),
        }));
    }

    let key = cache_key(&src);
    let out_dir = state.transcodes.out_dir(&key);

    if out_dir.join("complete").exists() {
        return Ok(Json(playlist_response(&key)));
    }
    if out_dir.join("error").exists() {
        return Ok(Json(StartHlsResponse::Error {
            error: "a previous transcode attempt for this file failed".into(),
        }));
    }

    let info = match media::ffmpeg::probe(&src).await {
        Some(info) => info,
        None => {
            return Ok(Json(StartHlsResponse::Error {
                error: "could not probe media streams".into(),
            }))
        }
    };

    let out_dir = match state
        .transcodes
        .start_or_reuse(key.clone(), src.clone(), info)
        .await
    {
        Ok(dir) => dir,
        Err(e) => {
            tracing::error!("failed to start transcode for {src:?}: {e:#}");
            return Ok(Json(StartHlsResponse::Error {
                error: "failed to start the transcoder".into(),
            }));
        }
    };

    let playlist = out_dir.join("index.m3u8");
    if wait_ready(&playlist, PLAYLIST_READY_TIMEOUT, PLAYLIST_POLL_INTERVAL).await {
        Ok(Json(playlist_response(&key)))
    } else {
        Ok(Json(StartHlsResponse::Error {
            error: "timed out waiting for the stream to become ready".into(),
        }))
    }
}

fn playlist_response(key: &str) -> StartHlsResponse {
    StartHlsResponse::Playlist {
        playlist: format!("/hls/{key}/index.m3u8"),
    }
}

pub async fn playlist(
    State(state): State<AppState>,
    AxumPath(key): AxumPath<String>,
) -> Result<Response, AppError> {
    state.transcodes.bump(&key);
    serve_artifact(
        &state.transcodes.out_dir(&key).join("index.m3u8"),
        "application/vnd.apple.mpegurl",
    )
    .await
}

pub async fn segment(
    State(state): State<AppState>,
    AxumPath((key, segment)): AxumPath<(String, String)>,
) -> Result<Response, AppError> {
    state.transcodes.bump(&key);
    let path = state.transcodes.out_dir(&key).join(&segment);
    serve_artifact(&path, "video/MP2T").await
}

async fn serve_artifact(path: &Path, content_type: &'static str) -> Result<Response, AppError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|_| AppError::SourceMissing)?;
    let stream = ReaderStream::new(file);
    Ok((
        [(header::CONTENT_TYPE, content_type)],
        Body::from_stream(stream),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::cache_key;
    use crate::jobs::TranscodeRegistry;
    use crate::roots::RootRegistry;
    use tempfile::tempdir;

    fn build_state(media_dir: &Path, cache_dir: &Path) -> AppState {
        let roots = RootRegistry::build(&[media_dir.to_path_buf()]).unwrap();
        AppState {
            roots: std::sync::Arc::new(roots),
            thumb_cache: cache_dir.join("thumbs"),
            transcodes: TranscodeRegistry::new(cache_dir.join("hls")),
        }
    }

    // Scenario 6: a prior `complete` marker short-circuits straight to the
    // playlist response without probing or touching the job registry.
    #[tokio::test]
    async fn complete_marker_short_circuits_before_probing() {
        let dir = tempdir().unwrap();
        let media_dir = dir.path().join("clips");
        std::fs::create_dir_all(&media_dir).unwrap();
        let src = media_dir.join("movie.mp4");
        std::fs::write(&src, b"not a real video").unwrap();

        let state = build_state(&media_dir, &dir.path().join("cache"));

        let key = cache_key(&src);
        let out_dir = state.transcodes.out_dir(&key);
        std::fs::create_dir_all(&out_dir).unwrap();
        std::fs::write(out_dir.join("complete"), []).unwrap();

        let result = start_hls(
            State(state),
            Query(StartHlsQuery {
                path: "clips/movie.mp4".to_string(),
            }),
        )
        .await
        .unwrap();

        match result.0 {
            StartHlsResponse::Playlist { playlist } => {
                assert_eq!(playlist, format!("/hls/{key}/index.m3u8"));
            }
            StartHlsResponse::Error { error } => panic!("expected playlist, got error: {error}"),
        }
    }

    // A prior `error` marker short-circuits to an error response the same
    // way, also without reaching the registry.
    #[tokio::test]
    async fn error_marker_short_circuits_before_probing() {
        let dir = tempdir().unwrap();
        let media_dir = dir.path().join("clips");
        std::fs::create_dir_all(&media_dir).unwrap();
        let src = media_dir.join("movie.mp4");
        std::fs::write(&src, b"not a real video").unwrap();

        let state = build_state(&media_dir, &dir.path().join("cache"));

        let key = cache_key(&src);
        let out_dir = state.transcodes.out_dir(&key);
        std::fs::create_dir_all(&out_dir).unwrap();
        std::fs::write(out_dir.join("error"), []).unwrap();

        let result = start_hls(
            State(state),
            Query(StartHlsQuery {
                path: "clips/movie.mp4".to_string(),
            }),
        )
        .await
        .unwrap();

        match result.0 {
            StartHlsResponse::Error { .. } => {}
            StartHlsResponse::Playlist { .. } => panic!("expected an error response"),
        }
    }

    #[tokio::test]
    async fn non_media_extension_reports_error_without_touching_disk_markers() {
        let dir = tempdir().unwrap();
        let media_dir = dir.path().join("clips");
        std::fs::create_dir_all(&media_dir).unwrap();
        let src = media_dir.join("notes.txt");
        std::fs::write(&src, b"hello").unwrap();

        let state = build_state(&media_dir, &dir.path().join("cache"));

        let result = start_hls(
            State(state),
            Query(StartHlsQuery {
                path: "clips/notes.txt".to_string(),
            }),
        )
        .await
        .unwrap();

        match result.0 {
            StartHlsResponse::Error { .. } => {}
            StartHlsResponse::Playlist { .. } => panic!("expected an error response"),
        }
    }
}
