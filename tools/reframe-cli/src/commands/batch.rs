//! Export several targets from one project.

use std::path::PathBuf;

use reframe_common::config::ExportDefaults;
use reframe_project_model::framing::{AspectRatio, CropStrategy};
use reframe_render_engine::ffmpeg::FfmpegEngine;
use reframe_render_engine::{export_batch, plan_batch, ExportJob, ExportProgress, TargetSize};

use super::export::encode_settings;
use super::{find_result, load_project, recipe_for};

const DEFAULT_LONG_EDGE: u32 = 1920;

/// A parsed `NAME=RATIO[@LONG_EDGE]` target.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSpec {
    pub name: String,
    pub ratio: AspectRatio,
    pub long_edge: u32,
}

pub fn parse_target(raw: &str) -> anyhow::Result<TargetSpec> {
    let (name, rest) = raw
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("Target '{raw}' must look like NAME=RATIO[@LONG_EDGE]"))?;
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Target '{raw}' has an empty name");
    }
    let (ratio, long_edge) = match rest.split_once('@') {
        Some((ratio, edge)) => (ratio, edge.trim().parse::<u32>()?),
        None => (rest, DEFAULT_LONG_EDGE),
    };
    Ok(TargetSpec {
        name: name.to_string(),
        ratio: ratio.parse()?,
        long_edge,
    })
}

pub async fn run(
    project_path: PathBuf,
    targets: Vec<String>,
    strategy: CropStrategy,
    output_dir: PathBuf,
    format: Option<String>,
    defaults: &ExportDefaults,
) -> anyhow::Result<()> {
    let project = load_project(&project_path)?;
    let encode = encode_settings(defaults, format)?;
    let specs = targets
        .iter()
        .map(|raw| parse_target(raw))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut jobs = Vec::with_capacity(specs.len());
    for spec in &specs {
        let result = find_result(&project, spec.ratio, strategy)?;
        let target = TargetSize::for_ratio(spec.ratio, spec.long_edge);
        let recipe = recipe_for(&project, result, target)?;
        jobs.push(ExportJob {
            input: project.source.path.clone(),
            output: output_dir.join(format!("{}.{}", spec.name, encode.format.extension())),
            recipe,
            target,
            encode: encode.clone(),
            duration_secs: result.duration_secs,
            has_audio: project.source.has_audio,
        });
    }

    let sizes: Vec<TargetSize> = jobs.iter().map(|job| job.target).collect();
    println!(
        "Batch export: {} target(s), {} transcode(s)",
        jobs.len(),
        plan_batch(&sizes).len()
    );

    let outputs = tokio::task::spawn_blocking(move || {
        let mut engine = FfmpegEngine::new();
        let progress: Box<dyn Fn(ExportProgress) + Send> = Box::new(|p| {
            eprint!("\r  Progress: {:.1}%  ", p.progress * 100.0);
        });
        export_batch(&mut engine, &jobs, Some(&progress))
    })
    .await??;

    eprintln!();
    for (spec, path) in specs.iter().zip(&outputs) {
        println!("  {:<12} {} -> {}", spec.name, spec.ratio, path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target_with_and_without_edge() {
        let spec = parse_target("tiktok=9:16").unwrap();
        assert_eq!(spec.name, "tiktok");
        assert_eq!(spec.ratio, AspectRatio::VERTICAL);
        assert_eq!(spec.long_edge, 1920);

        let spec = parse_target("feed=1:1@1080").unwrap();
        assert_eq!(spec.ratio, AspectRatio::SQUARE);
        assert_eq!(spec.long_edge, 1080);
    }

    #[test]
    fn test_parse_target_rejects_malformed() {
        assert!(parse_target("9:16").is_err());
        assert!(parse_target("=9:16").is_err());
        assert!(parse_target("x=9-16").is_err());
        assert!(parse_target("x=9:16@big").is_err());
    }
}
