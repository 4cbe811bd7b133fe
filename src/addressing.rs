//! Content addressing: mapping a resolved source path to a stable cache
//! key and to the on-disk locations of its derived artifacts.
//!
//! Pure and I/O-free so callers can reason about it without touching the
//! filesystem.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

#[cfg(unix)]
fn path_bytes(path: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

#[cfg(not(unix))]
fn path_bytes(path: &Path) -> Vec<u8> {
    path.to_string_lossy().into_owned().into_bytes()
}

/// Hex-encoded SHA-256 over the raw byte representation of `src`. Stable
/// across process restarts; depends only on the path's bytes, not its
/// string form, so it tolerates non-UTF-8 paths.
pub fn cache_key(src: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path_bytes(src));
    hex::encode(hasher.finalize())
}

/// Location of the thumbnail JPEG (or failure sentinel) for `src`.
pub fn thumb_file(cache_root: &Path, key: &str) -> PathBuf {
    cache_root.join(&key[0..2]).join(format!("{}.jpg", &key[2..]))
}

/// Location of the per-key transcode artifact directory.
pub fn job_dir(hls_root: &Path, key: &str) -> PathBuf {
    hls_root.join(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_stable_and_deterministic() {
        let p = Path::new("/srv/media/vid.mp4");
        assert_eq!(cache_key(p), cache_key(p));
        assert_ne!(cache_key(p), cache_key(Path::new("/srv/media/vid2.mp4")));
    }

    #[test]
    fn thumb_file_shards_by_first_two_hex_chars() {
        let key = cache_key(Path::new("/a/b.jpg"));
        let file = thumb_file(Path::new("/cache"), &key);
        assert_eq!(
            file,
            Path::new("/cache").join(&key[0..2]).join(format!("{}.jpg", &key[2..]))
        );
    }
}
