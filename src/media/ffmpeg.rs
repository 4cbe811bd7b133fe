//! Thin wrapper around the `ffprobe`/`ffmpeg` binaries: the external
//! transcoder this service drives. Probing returns a parsed stream list;
//! thumbnailing shells out and waits for completion; HLS production hands
//! back a live [`Child`], since it's long-running and owned by the job
//! registry rather than by the request that started it.

use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::process::{Child, Command};

/// Codecs ffmpeg can pass through into an HLS container without
/// re-encoding.
const HLS_VIDEO_COPY_CODECS: &[&str] = &["h264", "avc1"];
const HLS_AUDIO_COPY_CODECS: &[&str] = &["aac", "mp3"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub codec: String,
    /// ffmpeg stream index, as reported by ffprobe.
    pub index: u32,
}

#[derive(Debug, Clone)]
pub struct VideoInfo {
    pub video: Vec<StreamInfo>,
    pub audio: Vec<StreamInfo>,
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeStream {
    index: Option<u32>,
    codec_type: Option<String>,
    codec_name: Option<String>,
}

/// Probe `src` for its video/audio streams. Returns `None` if ffprobe
/// fails or the source has no stream with both a codec name and an index.
pub async fn probe(src: &Path) -> Option<VideoInfo> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "stream=index,codec_type,codec_name",
            "-of",
            "json",
        ])
        .arg(src)
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let parsed: ProbeOutput = serde_json::from_slice(&output.stdout).ok()?;

    let mut video = Vec::new();
    let mut audio = Vec::new();
    for stream in parsed.streams {
        let (Some(index), Some(codec)) = (stream.index, stream.codec_name) else {
            continue;
        };
        let codec = codec.to_lowercase();
        match stream.codec_type.as_deref() {
            Some("video") => video.push(StreamInfo { codec, index }),
            Some("audio") => audio.push(StreamInfo { codec, index }),
            _ => {}
        }
    }

    if video.is_empty() && audio.is_empty() {
        None
    } else {
        Some(VideoInfo { video, audio })
    }
}

/// Probe `src` for its duration in seconds, for the thumbnail overlay.
/// Returns `None` on any probe failure; callers fall back to no overlay.
pub async fn probe_duration_seconds(src: &Path) -> Option<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(src)
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout).trim().parse().ok()
}

/// Choose the stream ffmpeg should use: the first whose codec is
/// copyable, else the first of that kind, else none. Probe order is
/// preserved and is stable for a given source.
pub fn choose_stream<'a>(streams: &'a [StreamInfo], copy_codecs: &[&str]) -> Option<&'a StreamInfo> {
    streams
        .iter()
        .find(|s| copy_codecs.contains(&s.codec.as_str()))
        .or_else(|| streams.first())
}

/// Generate a thumbnail frame at `dst`, scaled to `width` wide (aspect
/// preserved), with an optional duration string burned into the top-right
/// corner. `font_file`, if given, pins the overlay's font.
pub async fn generate_thumbnail_frame(
    src: &Path,
    dst: &Path,
    width: u32,
    duration_label: Option<&str>,
    font_file: Option<&Path>,
) -> Result<()> {
    if let Some(parent) = dst.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let mut filters = vec![format!("thumbnail,scale={width}:-1")];
    if let Some(label) = duration_label {
        let mut drawtext = format!("drawtext=text='{label}':x=w-tw-8:y=8");
        drawtext.push_str(":box=1:boxborderw=8:boxcolor=0x000000aa");
        drawtext.push_str(":fontsize=24:fontcolor=0xcccccc");
        if let Some(font) = font_file {
            drawtext.push_str(&format!(":fontfile='{}'", font.display()));
        }
        filters.push(drawtext);
    }
    let vf = filters.join(",");

    let status = Command::new("ffmpeg")
        .args(["-y", "-loglevel", "error", "-i"])
        .arg(src)
        .args(["-frames:v", "1", "-vf", &vf])
        .arg(dst)
        .stdin(Stdio::null())
        .status()
        .await
        .context("failed to execute ffmpeg; is it installed?")?;

    if !status.success() || !dst.exists() {
        anyhow::bail!("ffmpeg failed to produce a thumbnail frame for {src:?}");
    }
    Ok(())
}

/// Format a duration in seconds as `H:MM:SS`, or `MM:SS` under an hour.
/// Colons are escaped for ffmpeg's filtergraph syntax, matching the
/// drawtext overlay's expectations.
pub fn format_duration_label(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}\\:{m:02}\\:{s:02}")
    } else {
        format!("{m:02}\\:{s:02}")
    }
}

/// Spawn the long-running ffmpeg process that produces an HLS playlist and
/// segments into `out_dir`. The caller owns the returned [`Child`] and is
/// responsible for waiting on / killing it.
pub fn spawn_hls(src: &Path, out_dir: &Path, info: &VideoInfo) -> Result<Child> {
    let video = choose_stream(&info.video, HLS_VIDEO_COPY_CODECS);
    let audio = choose_stream(&info.audio, HLS_AUDIO_COPY_CODECS);

    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-loglevel", "error", "-y", "-i"]).arg(src);

    if let Some(v) = video {
        cmd.args(["-map", &format!("0:{}", v.index)]);
    }
    if let Some(a) = audio {
        cmd.args(["-map", &format!("0:{}", a.index)]);
    }

    let mut summary = String::from("ffmpeg: ");
    match video {
        Some(v) if HLS_VIDEO_COPY_CODECS.contains(&v.codec.as_str()) => {
            summary.push_str(&format!("copy video ({})", v.codec));
            cmd.args(["-c:v", "copy"]);
        }
        Some(v) => {
            summary.push_str(&format!("re-encode video ({})", v.codec));
            cmd.args([
                "-vf",
                "scale=trunc(iw/2)*2:trunc(ih/2)*2",
                "-c:v",
                "libx264",
                "-preset",
                "veryfast",
                "-g",
                "48",
                "-keyint_min",
                "48",
                "-sc_threshold",
                "0",
            ]);
        }
        None => summary.push_str("no video stream"),
    }

    match audio {
        Some(a) if HLS_AUDIO_COPY_CODECS.contains(&a.codec.as_str()) => {
            summary.push_str(&format!(", copy audio ({})", a.codec));
            cmd.args(["-c:a", "copy"]);
        }
        Some(a) => {
            summary.push_str(&format!(", re-encode audio ({})", a.codec));
            cmd.args(["-c:a", "aac", "-b:a", "128k"]);
        }
        None => summary.push_str(", no audio"),
    }

    tracing::info!("{summary}");

    cmd.args([
        "-f",
        "hls",
        "-hls_time",
        "5",
        "-hls_list_size",
        "0",
        "-hls_segment_filename",
    ])
    .arg(out_dir.join("seg%03d.ts"))
    .arg(out_dir.join("index.m3u8"))
    .stdin(Stdio::null())
    .stdout(Stdio::null())
    .stderr(Stdio::null());

    cmd.spawn().context("failed to spawn ffmpeg for HLS transcode")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choose_stream_prefers_copyable_codec() {
        let streams = vec![
            StreamInfo { codec: "hevc".into(), index: 0 },
            StreamInfo { codec: "h264".into(), index: 1 },
        ];
        let chosen = choose_stream(&streams, HLS_VIDEO_COPY_CODECS).unwrap();
        assert_eq!(chosen.index, 1);
    }

    #[test]
    fn choose_stream_falls_back_to_first() {
        let streams = vec![StreamInfo { codec: "hevc".into(), index: 3 }];
        let chosen = choose_stream(&streams, HLS_VIDEO_COPY_CODECS).unwrap();
        assert_eq!(chosen.index, 3);
    }

    #[test]
    fn choose_stream_none_when_empty() {
        assert!(choose_stream(&[], HLS_VIDEO_COPY_CODECS).is_none());
    }

    #[test]
    fn duration_label_under_an_hour() {
        assert_eq!(format_duration_label(75.0), "01\\:15");
    }

    #[test]
    fn duration_label_over_an_hour() {
        assert_eq!(format_duration_label(3661.0), "1\\:01\\:01");
    }
}
