use std::collections::HashMap;
use std::time::UNIX_EPOCH;

use axum::extract::State;
use axum::response::Json;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::media;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ListRequestItem {
    path: String,
    since: Option<f64>,
}

#[derive(Serialize)]
struct FileEntry {
    name: String,
    #[serde(rename = "type")]
    kind: &'static str,
    mtime: f64,
    size: u64,
}

#[derive(Serialize)]
#[serde(untagged)]
enum ListResult {
    NotModified {
        not_modified: bool,
    },
    Listing {
        not_modified: bool,
        mtime: Option<f64>,
        files: Vec<FileEntry>,
    },
}

/// A single outer exception aborts the whole batch with 400, matching the
/// original's one `try`/`except` wrapping the full loop — a malformed path
/// in entry 3 invalidates entries 1 and 2 too, rather than reporting a
/// partial result.
pub async fn list_batch(
    State(state): State<AppState>,
    Json(items): Json<Vec<ListRequestItem>>,
) -> Result<Json<HashMap<String, ListResult>>, AppError> {
    let mut result = HashMap::with_capacity(items.len());

    for item in items {
        let base = state
            .roots
            .resolve(&item.path)
            .map_err(|_| AppError::BadRequest(format!("invalid path: {}", item.path)))?;

        let dir_mtime = match tokio::fs::metadata(&base).await {
            Ok(meta) => meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs_f64()),
            Err(_) => {
                result.insert(
                    item.path,
                    ListResult::Listing {
                        not_modified: false,
                        mtime: None,
                        files: Vec::new(),
                    },
                );
                continue;
            }
        };
        let dir_mtime = dir_mtime.ok_or_else(|| AppError::BadRequest("unreadable mtime".into()))?;

        if let Some(since) = item.since {
            if since > 0.0 && dir_mtime <= since {
                result.insert(item.path, ListResult::NotModified { not_modified: true });
                continue;
            }
        }

        let files = list_media_entries(&base)
            .await
            .map_err(|_| AppError::BadRequest(format!("failed to list {}", item.path)))?;

        result.insert(
            item.path,
            ListResult::Listing {
                not_modified: false,
                mtime: Some(dir_mtime),
                files,
            },
        );
    }

    Ok(Json(result))
}

async fn list_media_entries(dir: &std::path::Path) -> anyhow::Result<Vec<FileEntry>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut out = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_dotted = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|s| s.starts_with('.'))
            .unwrap_or(true);
        if is_dotted {
            continue;
        }
        let is_image = media::is_image(&path);
        let is_video = media::is_video(&path);
        if !is_image && !is_video {
            continue;
        }
        let meta = entry.metadata().await?;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        out.push(FileEntry {
            name: crate::path_encoding::encode_osstr(
                path.file_name().unwrap_or_default(),
            ),
            kind: if is_video { "video" } else { "image" },
            mtime,
            size: meta.len(),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roots::RootRegistry;
    use tempfile::tempdir;

    #[tokio::test]
    async fn listing_skips_dotfiles_and_non_media() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"x").unwrap();
        std::fs::write(dir.path().join(".hidden.jpg"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let files = list_media_entries(dir.path()).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "a.jpg");
        assert_eq!(files[0].kind, "image");
    }

    #[tokio::test]
    async fn missing_root_still_builds_registry() {
        let dir = tempdir().unwrap();
        let _registry = RootRegistry::build(&[dir.path().to_path_buf()]).unwrap();
    }
}
