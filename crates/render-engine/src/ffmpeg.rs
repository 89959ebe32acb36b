//! ffmpeg translation of export recipes.

use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::time::Instant;

use reframe_common::{ReframeError, ReframeResult};

use crate::export::{
    EncodeSettings, ExportFormat, ExportJob, ExportProgress, ExportStage, MediaEngine,
    ProgressCallback,
};
use crate::recipe::{ExportRecipe, RecipeStage, VideoOp};

/// Filters for one job: a simple `-vf` chain or a `-filter_complex` graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterGraph {
    Simple(String),
    Complex {
        graph: String,
        video_label: String,
        audio_label: Option<String>,
    },
}

fn op_filter(op: &VideoOp) -> String {
    match *op {
        VideoOp::Crop {
            x,
            y,
            width,
            height,
        } => format!("crop={width}:{height}:{x}:{y}"),
        VideoOp::Scale { width, height } => format!("scale={width}:{height}"),
        VideoOp::ScaleToFit { width, height } => {
            format!("scale={width}:{height}:force_original_aspect_ratio=decrease")
        }
        VideoOp::Pad { width, height } => {
            format!("pad={width}:{height}:(ow-iw)/2:(oh-ih)/2:color=black")
        }
    }
}

fn stage_chain(stage: &RecipeStage) -> String {
    let mut filters: Vec<String> = stage.ops.iter().map(op_filter).collect();
    filters.push("setsar=1".to_string());
    filters.join(",")
}

/// Translate a recipe into ffmpeg filters.
pub fn filter_graph(recipe: &ExportRecipe, has_audio: bool) -> FilterGraph {
    match recipe {
        ExportRecipe::Single { stage } => FilterGraph::Simple(stage_chain(stage)),
        ExportRecipe::Concat { stages } => {
            let mut parts = Vec::with_capacity(stages.len() * 2 + 2);
            let mut video_inputs = String::new();
            let mut audio_inputs = String::new();

            for (i, stage) in stages.iter().enumerate() {
                let trim = stage.trim.map_or_else(String::new, |t| {
                    format!("trim=start={:.6}:end={:.6},", t.start, t.end)
                });
                parts.push(format!(
                    "[0:v]{trim}setpts=PTS-STARTPTS,{}[v{i}]",
                    stage_chain(stage)
                ));
                video_inputs.push_str(&format!("[v{i}]"));

                if has_audio {
                    let atrim = stage.trim.map_or_else(String::new, |t| {
                        format!("atrim=start={:.6}:end={:.6},", t.start, t.end)
                    });
                    parts.push(format!("[0:a]{atrim}asetpts=PTS-STARTPTS[a{i}]"));
                    audio_inputs.push_str(&format!("[a{i}]"));
                }
            }

            let n = stages.len();
            parts.push(format!("{video_inputs}concat=n={n}:v=1:a=0[vout]"));
            if has_audio {
                parts.push(format!("{audio_inputs}concat=n={n}:v=0:a=1[aout]"));
            }

            FilterGraph::Complex {
                graph: parts.join(";"),
                video_label: "[vout]".to_string(),
                audio_label: has_audio.then(|| "[aout]".to_string()),
            }
        }
    }
}

/// Encoder arguments for the output format.
pub fn codec_args(settings: &EncodeSettings) -> Vec<String> {
    let crf = settings.crf.to_string();
    let audio_bitrate = format!("{}k", settings.audio_bitrate_kbps.max(64));

    let args: Vec<&str> = match settings.format {
        ExportFormat::Mp4H264 => vec![
            "-c:v",
            "libx264",
            "-preset",
            settings.preset.as_str(),
            "-crf",
            crf.as_str(),
            "-profile:v",
            "high",
            "-pix_fmt",
            "yuv420p",
            "-c:a",
            "aac",
            "-b:a",
            audio_bitrate.as_str(),
            "-movflags",
            "+faststart",
        ],
        ExportFormat::Mp4H265 => vec![
            "-c:v",
            "libx265",
            "-preset",
            settings.preset.as_str(),
            "-crf",
            crf.as_str(),
            "-pix_fmt",
            "yuv420p",
            "-tag:v",
            "hvc1",
            "-c:a",
            "aac",
            "-b:a",
            audio_bitrate.as_str(),
            "-movflags",
            "+faststart",
        ],
        ExportFormat::Webm => vec![
            "-c:v",
            "libvpx-vp9",
            "-crf",
            crf.as_str(),
            "-b:v",
            "0",
            "-pix_fmt",
            "yuv420p",
            "-c:a",
            "libopus",
            "-b:a",
            audio_bitrate.as_str(),
        ],
    };
    args.into_iter().map(str::to_string).collect()
}

/// Full ffmpeg argument list for a job.
pub fn ffmpeg_args(job: &ExportJob) -> Vec<String> {
    let mut args: Vec<String> = [
        "-y",
        "-hide_banner",
        "-loglevel",
        "error",
        "-nostats",
        "-progress",
        "pipe:1",
    ]
    .into_iter()
    .map(str::to_string)
    .collect();

    let filters = filter_graph(&job.recipe, job.has_audio);

    // A single trimmed stage seeks on the input instead of filtering.
    if let ExportRecipe::Single {
        stage: RecipeStage {
            trim: Some(trim), ..
        },
    } = &job.recipe
    {
        args.push("-ss".to_string());
        args.push(format!("{:.6}", trim.start));
        args.push("-t".to_string());
        args.push(format!("{:.6}", trim.duration()));
    }

    args.push("-i".to_string());
    args.push(job.input.display().to_string());

    match filters {
        FilterGraph::Simple(chain) => {
            args.push("-vf".to_string());
            args.push(chain);
            args.push("-map".to_string());
            args.push("0:v:0".to_string());
            if job.has_audio {
                args.push("-map".to_string());
                args.push("0:a:0?".to_string());
            }
        }
        FilterGraph::Complex {
            graph,
            video_label,
            audio_label,
        } => {
            args.push("-filter_complex".to_string());
            args.push(graph);
            args.push("-map".to_string());
            args.push(video_label);
            if let Some(audio) = audio_label {
                args.push("-map".to_string());
                args.push(audio);
            }
        }
    }

    args.extend(codec_args(&job.encode));
    if !job.has_audio {
        args.push("-an".to_string());
    }
    args.push(job.output.display().to_string());
    args
}

/// Media engine backed by the ffmpeg CLI.
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    binary: String,
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegEngine {
    pub fn new() -> Self {
        Self::with_binary("ffmpeg")
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn run(
        &self,
        args: &[String],
        expected_duration_secs: f64,
        progress: Option<&ProgressCallback>,
    ) -> ReframeResult<()> {
        tracing::debug!(args = ?args, "Running ffmpeg");
        let mut child = Command::new(&self.binary)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ReframeError::render(format!("Failed to start {}: {e}", self.binary)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ReframeError::render("Failed to capture ffmpeg stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ReframeError::render("Failed to capture ffmpeg stderr"))?;

        // ffmpeg blocks once the stderr pipe fills.
        let stderr_task = std::thread::spawn(move || -> String {
            let mut output = String::new();
            match BufReader::new(stderr).read_to_string(&mut output) {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        let started = Instant::now();
        let mut state = ProgressState::default();
        let mut reader = BufReader::new(stdout);
        let mut line = String::new();
        loop {
            line.clear();
            let bytes = reader
                .read_line(&mut line)
                .map_err(|e| ReframeError::render(format!("Failed reading ffmpeg progress: {e}")))?;
            if bytes == 0 {
                break;
            }
            let Some((key, value)) = line.trim().split_once('=') else {
                continue;
            };
            state.update(key, value);
            if key == "progress" {
                if let Some(cb) = progress {
                    cb(progress_report(
                        &state,
                        expected_duration_secs,
                        started.elapsed().as_secs_f64(),
                    ));
                }
            }
        }

        let status = child
            .wait()
            .map_err(|e| ReframeError::render(format!("Failed to wait on ffmpeg: {e}")))?;
        let stderr_output = stderr_task
            .join()
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

        if !status.success() {
            return Err(ReframeError::render(format!(
                "ffmpeg export failed ({status}): {}",
                stderr_output.trim()
            )));
        }

        if let Some(cb) = progress {
            cb(ExportProgress {
                progress: 1.0,
                out_time_secs: expected_duration_secs,
                eta_secs: 0.0,
                stage: ExportStage::Complete,
            });
        }
        tracing::info!(
            elapsed_secs = started.elapsed().as_secs_f64(),
            "ffmpeg finished"
        );
        Ok(())
    }
}

impl MediaEngine for FfmpegEngine {
    fn execute(&mut self, job: &ExportJob, progress: Option<&ProgressCallback>) -> ReframeResult<()> {
        let args = ffmpeg_args(job);
        self.run(&args, job.output_duration(), progress)
    }

    fn is_available(&self) -> bool {
        command_exists(&self.binary)
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

/// Whether `binary` resolves on `PATH`.
pub fn command_exists(binary: &str) -> bool {
    Command::new(binary)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[derive(Debug, Default)]
struct ProgressState {
    out_time_secs: f64,
    complete: bool,
}

impl ProgressState {
    fn update(&mut self, key: &str, value: &str) {
        match key {
            // Despite the name, ffmpeg reports out_time_ms in microseconds.
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
            }
            "progress" => self.complete = value == "end",
            _ => {}
        }
    }
}

fn progress_report(state: &ProgressState, expected_duration_secs: f64, elapsed_secs: f64) -> ExportProgress {
    let progress = if expected_duration_secs <= 0.0 {
        0.0
    } else {
        (state.out_time_secs / expected_duration_secs).clamp(0.0, 1.0)
    };
    let eta_secs = if progress > 0.0 {
        (elapsed_secs / progress - elapsed_secs).max(0.0)
    } else {
        0.0
    };

    ExportProgress {
        progress: if state.complete { 1.0 } else { progress },
        out_time_secs: state.out_time_secs,
        eta_secs,
        stage: if state.complete {
            ExportStage::Finalizing
        } else {
            ExportStage::Encoding
        },
    }
}
