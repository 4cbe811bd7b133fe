pub mod ffmpeg;

use std::ffi::OsStr;

const IMAGE_EXTS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "avif", "bmp", "ico"];
const VIDEO_EXTS: &[&str] = &[
    "mp4", "m4v", "mov", "webm", "ogv", "ogg", "mkv", "flv", "avi", "wmv", "mpeg", "mpg", "ts",
    "m2ts", "m2v", "vob", "3gp", "swf", "asf", "ra", "ram", "rm",
];

fn ext_matches(path: &std::path::Path, set: &[&str]) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|e| set.iter().any(|candidate| candidate.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

pub fn is_image(path: &std::path::Path) -> bool {
    ext_matches(path, IMAGE_EXTS)
}

pub fn is_video(path: &std::path::Path) -> bool {
    ext_matches(path, VIDEO_EXTS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn classifies_known_extensions_case_insensitively() {
        assert!(is_image(Path::new("photo.JPG")));
        assert!(is_video(Path::new("clip.MKV")));
        assert!(!is_image(Path::new("clip.mkv")));
        assert!(!is_video(Path::new("readme.txt")));
    }
}
