//! Source media probing via ffprobe.

use std::path::Path;
use std::process::Command;

use serde::Deserialize;

use reframe_common::{ReframeError, ReframeResult};
use reframe_project_model::geometry::Size;

/// What the reframing pipeline needs to know about a source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    pub duration_secs: f64,
    pub has_audio: bool,
}

impl MediaInfo {
    pub fn size(&self) -> Size {
        Size::new(f64::from(self.width), f64::from(self.height))
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Parse `ffprobe -of json` output.
pub fn parse_probe_output(json: &str) -> ReframeResult<MediaInfo> {
    let probe: ProbeOutput = serde_json::from_str(json)?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| ReframeError::unsupported("source has no video stream"))?;
    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(ReframeError::render("video stream has no dimensions")),
    };

    let duration_secs = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(video.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| ReframeError::render("could not determine source duration"))?;

    let has_audio = probe
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    Ok(MediaInfo {
        width,
        height,
        duration_secs,
        has_audio,
    })
}

/// Probe dimensions, duration and audio presence of a media file.
pub fn probe_media(path: &Path) -> ReframeResult<MediaInfo> {
    if !path.exists() {
        return Err(ReframeError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "stream=codec_type,width,height,duration:format=duration",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| ReframeError::unsupported(format!("failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        return Err(ReframeError::render(format!(
            "ffprobe failed for {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let info = parse_probe_output(&String::from_utf8_lossy(&output.stdout))?;
    tracing::debug!(
        path = %path.display(),
        width = info.width,
        height = info.height,
        duration = info.duration_secs,
        has_audio = info.has_audio,
        "Probed media"
    );
    Ok(info)
}
