//! Export one analysed aspect ratio to a video file.

use std::path::PathBuf;

use reframe_common::config::ExportDefaults;
use reframe_project_model::framing::{AspectRatio, CropStrategy};
use reframe_render_engine::{
    export_video, EncodeSettings, ExportJob, ExportProgress, TargetSize,
};

use super::{find_result, load_project, recipe_for};

pub fn encode_settings(
    defaults: &ExportDefaults,
    format: Option<String>,
) -> anyhow::Result<EncodeSettings> {
    let mut settings = EncodeSettings::try_from(defaults)?;
    if let Some(format) = format {
        settings.format = format.parse()?;
    }
    Ok(settings)
}

pub async fn run(
    project_path: PathBuf,
    ratio: AspectRatio,
    strategy: CropStrategy,
    output: Option<PathBuf>,
    format: Option<String>,
    long_edge: u32,
    defaults: &ExportDefaults,
) -> anyhow::Result<()> {
    let project = load_project(&project_path)?;
    let result = find_result(&project, ratio, strategy)?;
    let encode = encode_settings(defaults, format)?;

    let target = TargetSize::for_ratio(ratio, long_edge);
    let recipe = recipe_for(&project, result, target)?;

    let output_path = output.unwrap_or_else(|| {
        let stem = project
            .source
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| project.name.clone());
        PathBuf::from(format!(
            "{stem}-{}x{}.{}",
            ratio.width,
            ratio.height,
            encode.format.extension()
        ))
    });

    println!("Exporting: {}", project.source.path.display());
    println!("  Output: {}", output_path.display());
    println!("  Format: {}", encode.format);
    println!("  Resolution: {}x{}", target.width, target.height);
    println!("  Clips: {}", result.clips.len());

    let job = ExportJob {
        input: project.source.path.clone(),
        output: output_path.clone(),
        recipe,
        target,
        encode,
        duration_secs: result.duration_secs,
        has_audio: project.source.has_audio,
    };

    let progress_cb: Box<dyn Fn(ExportProgress) + Send> = Box::new(|p| {
        eprint!(
            "\r  Progress: {:.1}% ({:.1}s encoded, ETA: {:.0}s)  ",
            p.progress * 100.0,
            p.out_time_secs,
            p.eta_secs,
        );
    });

    let written = export_video(job, Some(progress_cb)).await?;
    eprintln!();
    println!("Export complete: {}", written.display());
    Ok(())
}
