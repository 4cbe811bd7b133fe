//! The thumbnail cache: `ensure_thumb` and its image/video generation
//! paths.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

use crate::addressing::thumb_file;
use crate::error::AppError;
use crate::media;

const THUMB_BOUND: u32 = 320;
const JPEG_QUALITY: u8 = 85;
const FONT_NAME: &str = "DejaVuSans.ttf";
const FONT_SEARCH_DIRS: &[&str] = &[
    "/usr/share/fonts",
    "/usr/local/share/fonts",
];

/// Memoized result of searching for the overlay font. `None` inside the
/// `Some` means "searched, not found" so we don't re-walk the filesystem
/// on every video thumbnail.
static FONT_FILE: OnceLock<Option<PathBuf>> = OnceLock::new();

pub enum ThumbOutcome {
    Ready(PathBuf),
    SrcMissing,
    CachedFailure,
}

/// Ensure a fresh thumbnail exists for `src`, generating one if absent or
/// stale. `cache_root` is the thumbnail shard root (not the HLS root).
pub async fn ensure_thumb(src: &Path, cache_root: &Path) -> Result<ThumbOutcome, AppError> {
    let metadata = match tokio::fs::metadata(src).await {
        Ok(m) if m.is_file() => m,
        _ => return Ok(ThumbOutcome::SrcMissing),
    };
    let src_mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

    let key = crate::addressing::cache_key(src);
    let dst = thumb_file(cache_root, &key);

    if let Ok(dst_meta) = tokio::fs::metadata(&dst).await {
        let dst_mtime = dst_meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if dst_mtime >= src_mtime {
            return Ok(if dst_meta.len() > 0 {
                ThumbOutcome::Ready(dst)
            } else {
                ThumbOutcome::CachedFailure
            });
        }
    }

    let src = src.to_path_buf();
    let generated = if media::is_image(&src) {
        generate_image_thumb(&src, &dst).await
    } else if media::is_video(&src) {
        generate_video_thumb(&src, &dst).await
    } else {
        false
    };

    if generated {
        Ok(ThumbOutcome::Ready(dst))
    } else {
        write_sentinel(&dst).await;
        Ok(ThumbOutcome::CachedFailure)
    }
}

async fn write_sentinel(dst: &Path) {
    if let Some(parent) = dst.parent() {
        let _ = tokio::fs::create_dir_all(parent).await;
    }
    let _ = tokio::fs::write(dst, []).await;
}

async fn generate_image_thumb(src: &Path, dst: &Path) -> bool {
    let src = src.to_path_buf();
    let dst = dst.to_path_buf();
    tokio::task::spawn_blocking(move || generate_image_thumb_blocking(&src, &dst))
        .await
        .unwrap_or(false)
}

fn generate_image_thumb_blocking(src: &Path, dst: &Path) -> bool {
    let result: anyhow::Result<()> = (|| {
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = std::fs::read(src)?;
        let orientation = read_exif_orientation(&bytes);

        let reader = image::io::Reader::new(Cursor::new(&bytes)).with_guessed_format()?;
        let img = reader.decode()?;
        let img = apply_orientation(img, orientation);
        let (w, h) = img.dimensions();
        let img = if w > THUMB_BOUND || h > THUMB_BOUND {
            img.resize(THUMB_BOUND, THUMB_BOUND, FilterType::Lanczos3)
        } else {
            img
        };
        let rgb = DynamicImage::ImageRgb8(img.to_rgb8());

        let mut out = Vec::new();
        let mut cursor = Cursor::new(&mut out);
        rgb.write_to(&mut cursor, image::ImageOutputFormat::Jpeg(JPEG_QUALITY))?;
        std::fs::write(dst, out)?;
        Ok(())
    })();

    if let Err(e) = &result {
        tracing::warn!("image thumbnail generation failed for {src:?}: {e:#}");
    }
    result.is_ok()
}

/// Read the EXIF orientation tag (1-8), if present. Unreadable or missing
/// EXIF data is treated as "no rotation needed" (orientation 1).
fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let exif = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(e) => e,
        Err(_) => return 1,
    };
    exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

async fn generate_video_thumb(src: &Path, dst: &Path) -> bool {
    let duration_label = media::ffmpeg::probe_duration_seconds(src)
        .await
        .map(media::ffmpeg::format_duration_label);

    let font = if duration_label.is_some() {
        find_font().await
    } else {
        None
    };

    match media::ffmpeg::generate_thumbnail_frame(
        src,
        dst,
        THUMB_BOUND,
        duration_label.as_deref(),
        font.as_deref(),
    )
    .await
    {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("video thumbnail generation failed for {src:?}: {e:#}");
            false
        }
    }
}

async fn find_font() -> Option<PathBuf> {
    if let Some(cached) = FONT_FILE.get() {
        return cached.clone();
    }
    let found = tokio::task::spawn_blocking(find_font_blocking)
        .await
        .unwrap_or(None);
    FONT_FILE.get_or_init(|| found.clone());
    found
}

fn find_font_blocking() -> Option<PathBuf> {
    for base in font_search_dirs() {
        if let Some(found) = search_dir(&base, FONT_NAME) {
            return Some(found);
        }
    }
    None
}

/// System font directories plus the per-user one
/// (`~/.local/share/fonts`), since `DejaVuSans.ttf` is as likely to live
/// there as under a system font package on a desktop without one
/// installed.
fn font_search_dirs() -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = FONT_SEARCH_DIRS.iter().map(PathBuf::from).collect();
    if let Some(base_dirs) = directories::BaseDirs::new() {
        dirs.push(base_dirs.home_dir().join(".local/share/fonts"));
    }
    dirs
}

fn search_dir(dir: &Path, name: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if let Some(found) = search_dir(&path, name) {
                return Some(found);
            }
        } else if path.file_name().and_then(|n| n.to_str()) == Some(name) {
            return Some(path);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_source_is_reported() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join("cache");
        let outcome = ensure_thumb(&dir.path().join("nope.jpg"), &cache)
            .await
            .unwrap();
        assert!(matches!(outcome, ThumbOutcome::SrcMissing));
    }

    #[tokio::test]
    async fn undecodable_image_yields_cached_failure_sentinel() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join("cache");
        let src = dir.path().join("broken.png");
        std::fs::write(&src, b"not actually a png").unwrap();

        let outcome = ensure_thumb(&src, &cache).await.unwrap();
        assert!(matches!(outcome, ThumbOutcome::CachedFailure));

        let key = crate::addressing::cache_key(&src);
        let dst = thumb_file(&cache, &key);
        assert_eq!(std::fs::metadata(&dst).unwrap().len(), 0);

        // Second request hits the fresh sentinel without re-decoding.
        let outcome = ensure_thumb(&src, &cache).await.unwrap();
        assert!(matches!(outcome, ThumbOutcome::CachedFailure));
    }

    #[tokio::test]
    async fn valid_image_produces_nonempty_jpeg() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join("cache");
        let src = dir.path().join("photo.png");
        let img = DynamicImage::new_rgb8(64, 48);
        img.save(&src).unwrap();

        let outcome = ensure_thumb(&src, &cache).await.unwrap();
        match outcome {
            ThumbOutcome::Ready(path) => {
                assert!(std::fs::metadata(&path).unwrap().len() > 0);
            }
            _ => panic!("expected a ready thumbnail"),
        }
    }
}
