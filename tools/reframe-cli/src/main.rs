//! Reframe CLI: command-line interface for analysis, editing, and export.
//!
//! Usage:
//!   reframe analyze <VIDEO>     Detect subjects and segment into clips
//!   reframe export <PROJECT>    Render one aspect ratio
//!   reframe batch <PROJECT>     Render several targets, one transcode per size
//!   reframe edit <PROJECT>      Adjust an analysis by hand
//!   reframe info <PROJECT>      Show project information
//!   reframe check               Check media tool availability

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use reframe_common::config::{config_file_path, AppConfig};
use reframe_project_model::framing::{AspectRatio, CropStrategy};

mod commands;

#[derive(Parser)]
#[command(
    name = "reframe",
    about = "Subject-aware reframing of videos to new aspect ratios",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to $XDG_CONFIG_HOME/reframe/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a video for one or more target aspect ratios
    Analyze {
        /// Source video
        video: PathBuf,

        /// Recorded subject detections (JSONL, one sample per line)
        #[arg(short, long)]
        detections: PathBuf,

        /// Target aspect ratio, repeatable
        #[arg(short, long = "ratio", default_value = "9:16")]
        ratios: Vec<AspectRatio>,

        /// Crop strategy: smart-crop or center-crop
        #[arg(short, long, default_value = "smart-crop")]
        strategy: CropStrategy,

        /// Project file to create or update
        #[arg(short, long)]
        project: Option<PathBuf>,

        /// Content rectangle inside black bars, as X,Y,W,H
        #[arg(long)]
        safe_area: Option<String>,

        /// Source width/height/duration, skipping ffprobe (W,H,SECS)
        #[arg(long)]
        source_info: Option<String>,

        /// Seconds between detection samples
        #[arg(long)]
        interval: Option<f64>,

        /// Minimum clip duration in seconds
        #[arg(long)]
        min_clip: Option<f64>,

        /// Crop movement in pixels that opens a new clip
        #[arg(long)]
        cut_threshold: Option<f64>,

        /// Scale pixel thresholds with source height
        #[arg(long)]
        relative_thresholds: bool,

        /// Re-run even when a stored result exists
        #[arg(long)]
        force: bool,
    },

    /// Export one analysed aspect ratio
    Export {
        /// Project file
        project: PathBuf,

        #[arg(short, long, default_value = "9:16")]
        ratio: AspectRatio,

        #[arg(short, long, default_value = "smart-crop")]
        strategy: CropStrategy,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format: mp4-h264, mp4-h265, webm
        #[arg(long)]
        format: Option<String>,

        /// Length of the longer output edge in pixels
        #[arg(long, default_value = "1920")]
        long_edge: u32,
    },

    /// Export several targets, transcoding once per distinct output size
    Batch {
        /// Project file
        project: PathBuf,

        /// Target as NAME=RATIO[@LONG_EDGE], repeatable (e.g. tiktok=9:16)
        #[arg(short, long = "target", required = true)]
        targets: Vec<String>,

        #[arg(short, long, default_value = "smart-crop")]
        strategy: CropStrategy,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Output format: mp4-h264, mp4-h265, webm
        #[arg(long)]
        format: Option<String>,
    },

    /// Edit an analysis by hand
    Edit {
        /// Project file
        project: PathBuf,

        #[arg(short, long, default_value = "9:16")]
        ratio: AspectRatio,

        #[arg(short, long, default_value = "smart-crop")]
        strategy: CropStrategy,

        #[command(subcommand)]
        op: commands::edit::EditOp,
    },

    /// Show project information
    Info {
        /// Project file
        project: PathBuf,
    },

    /// Check media tool availability
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(config_file_path);
    let (config, config_error) = match AppConfig::try_load_from(&config_path) {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };
    reframe_common::logging::init_logging(&config.logging.with_verbosity(cli.verbose));
    if let Some(e) = config_error {
        tracing::warn!(error = %e, "Using default configuration");
    }

    match cli.command {
        Commands::Analyze {
            video,
            detections,
            ratios,
            strategy,
            project,
            safe_area,
            source_info,
            interval,
            min_clip,
            cut_threshold,
            relative_thresholds,
            force,
        } => {
            let mut analysis = config.analysis.clone();
            if let Some(v) = interval {
                analysis.sample_interval_secs = v;
            }
            if let Some(v) = min_clip {
                analysis.min_clip_duration_secs = v;
            }
            if let Some(v) = cut_threshold {
                analysis.cut_threshold_px = v;
            }
            analysis.resolution_relative |= relative_thresholds;

            commands::analyze::run(commands::analyze::AnalyzeArgs {
                video,
                detections,
                ratios,
                strategy,
                project,
                safe_area,
                source_info,
                force,
                analysis,
                cache_dir: config.cache_dir.clone(),
            })
            .await
        }
        Commands::Export {
            project,
            ratio,
            strategy,
            output,
            format,
            long_edge,
        } => {
            commands::export::run(project, ratio, strategy, output, format, long_edge, &config.export)
                .await
        }
        Commands::Batch {
            project,
            targets,
            strategy,
            output_dir,
            format,
        } => commands::batch::run(project, targets, strategy, output_dir, format, &config.export).await,
        Commands::Edit {
            project,
            ratio,
            strategy,
            op,
        } => commands::edit::run(project, ratio, strategy, op),
        Commands::Info { project } => commands::info::run(project),
        Commands::Check => commands::check::run(),
    }
}
