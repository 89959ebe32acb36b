//! Export jobs, progress reporting and the media engine seam.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use reframe_common::config::ExportDefaults;
use reframe_common::{ReframeError, ReframeResult};

use crate::ffmpeg::FfmpegEngine;
use crate::recipe::{plan_batch, ExportRecipe, TargetSize};

/// Container/codec combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ExportFormat {
    #[default]
    Mp4H264,
    Mp4H265,
    Webm,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mp4H264 => "mp4-h264",
            Self::Mp4H265 => "mp4-h265",
            Self::Webm => "webm",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4H264 | Self::Mp4H265 => "mp4",
            Self::Webm => "webm",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = ReframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp4-h264" | "mp4" | "h264" => Ok(Self::Mp4H264),
            "mp4-h265" | "h265" | "hevc" => Ok(Self::Mp4H265),
            "webm" | "vp9" => Ok(Self::Webm),
            other => Err(ReframeError::unsupported(format!(
                "unknown export format '{other}' (expected mp4-h264, mp4-h265 or webm)"
            ))),
        }
    }
}

/// Encoder settings shared by every target of an export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeSettings {
    pub format: ExportFormat,
    pub crf: u32,
    pub preset: String,
    pub audio_bitrate_kbps: u32,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            format: ExportFormat::Mp4H264,
            crf: 23,
            preset: "medium".to_string(),
            audio_bitrate_kbps: 192,
        }
    }
}

impl TryFrom<&ExportDefaults> for EncodeSettings {
    type Error = ReframeError;

    fn try_from(defaults: &ExportDefaults) -> Result<Self, Self::Error> {
        Ok(Self {
            format: defaults.format.parse()?,
            crf: defaults.crf,
            preset: defaults.preset.clone(),
            audio_bitrate_kbps: defaults.audio_bitrate_kbps,
        })
    }
}

/// A recipe ready to be rendered.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub recipe: ExportRecipe,
    pub target: TargetSize,
    pub encode: EncodeSettings,

    /// Source duration in seconds, used for progress.
    pub duration_secs: f64,

    /// Whether the source carries an audio stream.
    pub has_audio: bool,
}

impl ExportJob {
    /// Seconds of output the recipe produces.
    pub fn output_duration(&self) -> f64 {
        let trimmed: f64 = self
            .recipe
            .stages()
            .iter()
            .map(|stage| stage.trim.map_or(self.duration_secs, |t| t.duration()))
            .sum();
        trimmed.max(0.0)
    }
}

/// Progress callback for export rendering.
pub type ProgressCallback = Box<dyn Fn(ExportProgress) + Send>;

/// Export progress report.
#[derive(Debug, Clone)]
pub struct ExportProgress {
    /// Current progress [0.0, 1.0].
    pub progress: f64,

    /// Seconds of output encoded so far.
    pub out_time_secs: f64,

    /// Estimated time remaining in seconds.
    pub eta_secs: f64,

    pub stage: ExportStage,
}

/// Stages of the export process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    Preparing,
    Encoding,
    Finalizing,
    Complete,
}

/// Executes export jobs.
pub trait MediaEngine: Send {
    fn execute(&mut self, job: &ExportJob, progress: Option<&ProgressCallback>) -> ReframeResult<()>;

    /// Check if this engine can run on the system.
    fn is_available(&self) -> bool;

    fn name(&self) -> &str;
}

fn prepare_output(job: &ExportJob) -> ReframeResult<()> {
    if !job.input.exists() {
        return Err(ReframeError::FileNotFound {
            path: job.input.clone(),
        });
    }
    if let Some(parent) = job.output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Render one job with the given engine.
pub fn run_export(
    engine: &mut dyn MediaEngine,
    job: &ExportJob,
    progress: Option<&ProgressCallback>,
) -> ReframeResult<PathBuf> {
    if !engine.is_available() {
        return Err(ReframeError::unsupported(format!(
            "media engine '{}' is not available",
            engine.name()
        )));
    }
    prepare_output(job)?;

    tracing::info!(
        engine = engine.name(),
        input = %job.input.display(),
        output = %job.output.display(),
        format = %job.encode.format,
        width = job.target.width,
        height = job.target.height,
        stages = job.recipe.stages().len(),
        "Starting export"
    );

    if let Some(cb) = progress {
        cb(ExportProgress {
            progress: 0.0,
            out_time_secs: 0.0,
            eta_secs: 0.0,
            stage: ExportStage::Preparing,
        });
    }

    engine.execute(job, progress)?;
    Ok(job.output.clone())
}

/// Render one job with ffmpeg on the blocking pool.
pub async fn export_video(job: ExportJob, progress: Option<ProgressCallback>) -> ReframeResult<PathBuf> {
    tokio::task::spawn_blocking(move || {
        let mut engine = FfmpegEngine::new();
        run_export(&mut engine, &job, progress.as_ref())
    })
    .await
    .map_err(|e| ReframeError::render(format!("export task failed: {e}")))?
}

/// Render several jobs, transcoding once per distinct output size.
///
/// Jobs sharing a size must come from the same analysis; the first one in
/// each group is rendered and its file copied to the others.
pub fn export_batch(
    engine: &mut dyn MediaEngine,
    jobs: &[ExportJob],
    progress: Option<&ProgressCallback>,
) -> ReframeResult<Vec<PathBuf>> {
    let sizes: Vec<TargetSize> = jobs.iter().map(|job| job.target).collect();
    let groups = plan_batch(&sizes);
    tracing::info!(
        targets = jobs.len(),
        transcodes = groups.len(),
        "Planned batch export"
    );

    for group in &groups {
        let primary = &jobs[group.primary()];
        let rendered = run_export(engine, primary, progress)?;
        for &member in &group.members[1..] {
            let copy = &jobs[member].output;
            prepare_output(&jobs[member])?;
            std::fs::copy(&rendered, copy).map_err(|e| {
                ReframeError::render(format!(
                    "failed to copy {} to {}: {e}",
                    rendered.display(),
                    copy.display()
                ))
            })?;
            tracing::debug!(from = %rendered.display(), to = %copy.display(), "Reused batch output");
        }
    }

    Ok(jobs.iter().map(|job| job.output.clone()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::{RecipeStage, Trim, VideoOp};

    #[test]
    fn test_format_parse_and_display() {
        assert_eq!("mp4-h264".parse::<ExportFormat>().unwrap(), ExportFormat::Mp4H264);
        assert_eq!("HEVC".parse::<ExportFormat>().unwrap(), ExportFormat::Mp4H265);
        assert_eq!(ExportFormat::Webm.to_string(), "webm");
        assert_eq!(ExportFormat::Webm.extension(), "webm");
        assert!("gif".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_encode_settings_from_defaults() {
        let settings = EncodeSettings::try_from(&ExportDefaults::default()).unwrap();
        assert_eq!(settings, EncodeSettings::default());

        let bad = ExportDefaults {
            format: "avi".to_string(),
            ..ExportDefaults::default()
        };
        assert!(EncodeSettings::try_from(&bad).is_err());
    }

    #[test]
    fn test_output_duration_sums_trims() {
        let stage = |start: f64, end: f64| RecipeStage {
            trim: Some(Trim { start, end }),
            ops: vec![VideoOp::Pad {
                width: 2,
                height: 2,
            }],
        };
        let job = ExportJob {
            input: PathBuf::from("in.mp4"),
            output: PathBuf::from("out.mp4"),
            recipe: ExportRecipe::Concat {
                stages: vec![stage(0.0, 2.5), stage(2.5, 4.0)],
            },
            target: TargetSize::new(2, 2),
            encode: EncodeSettings::default(),
            duration_secs: 10.0,
            has_audio: false,
        };
        assert!((job.output_duration() - 4.0).abs() < 1e-9);
    }
}
