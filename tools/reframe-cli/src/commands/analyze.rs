//! Run subject detection and segmentation for one or more aspect ratios.

use std::path::PathBuf;
use std::sync::Arc;

use reframe_common::config::AnalysisDefaults;
use reframe_processing_core::detector::{
    FixedSafeArea, RecordedDetections, SafeAreaDetector, SubjectDetector,
};
use reframe_processing_core::pipeline::{
    AnalysisOutcome, AnalysisPipeline, AnalysisProgress, AnalysisRequest, PipelineConfig,
};
use reframe_processing_core::registry::AnalysisRegistry;
use reframe_project_model::analysis::AnalysisKey;
use reframe_project_model::framing::{AspectRatio, CropStrategy};
use reframe_project_model::geometry::Rect;
use reframe_project_model::{ProjectFile, SourceMedia};
use reframe_render_engine::probe_media;

use super::{parse_numbers, print_clips};

pub struct AnalyzeArgs {
    pub video: PathBuf,
    pub detections: PathBuf,
    pub ratios: Vec<AspectRatio>,
    pub strategy: CropStrategy,
    pub project: Option<PathBuf>,
    pub safe_area: Option<String>,
    pub source_info: Option<String>,
    pub force: bool,
    pub analysis: AnalysisDefaults,
    pub cache_dir: PathBuf,
}

fn source_media(args: &AnalyzeArgs) -> anyhow::Result<SourceMedia> {
    let source_id = SourceMedia::fingerprint(&args.video);
    let (width, height, duration_secs, has_audio) = match &args.source_info {
        Some(raw) => {
            let [w, h, secs] = parse_numbers::<3>(raw, "source info")?;
            (w, h, secs, true)
        }
        None => {
            let info = probe_media(&args.video)?;
            (
                f64::from(info.width),
                f64::from(info.height),
                info.duration_secs,
                info.has_audio,
            )
        }
    };
    Ok(SourceMedia {
        path: args.video.clone(),
        source_id,
        width,
        height,
        duration_secs,
        has_audio,
    })
}

pub async fn run(args: AnalyzeArgs) -> anyhow::Result<()> {
    println!("Analyzing: {}", args.video.display());
    args.analysis.validate()?;

    let source = source_media(&args)?;
    println!(
        "  Source: {}x{} ({:.1}s, audio: {})",
        source.width, source.height, source.duration_secs, source.has_audio
    );

    let stem = args
        .video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    let project_path = args
        .project
        .clone()
        .unwrap_or_else(|| args.cache_dir.join(format!("{stem}-{}.json", source.source_id)));

    let mut project = if project_path.exists() {
        let mut project = super::load_project(&project_path)?;
        if project.source.source_id != source.source_id {
            tracing::warn!(
                old = %project.source.source_id,
                new = %source.source_id,
                "Source changed since last analysis, dropping stored results"
            );
            project.invalidate_results();
            project.source = source.clone();
        }
        project
    } else {
        ProjectFile::new(stem, source.clone())
    };

    let safe_area_detector = match &args.safe_area {
        Some(raw) => {
            let [x, y, w, h] = parse_numbers::<4>(raw, "safe area")?;
            FixedSafeArea::new(Rect::new(x, y, w, h))
        }
        None => FixedSafeArea::full_frame(),
    };
    let report = safe_area_detector.detect(source.size(), source.duration_secs)?;
    if report.has_bars {
        let r = report.safe_area.rect();
        println!("  Safe area: {}x{} at ({}, {})", r.width, r.height, r.x, r.y);
    }

    let recorded = RecordedDetections::load(&args.detections)?
        .with_sample_interval(args.analysis.sample_interval_secs);
    println!("  Loaded {} detection samples", recorded.len());
    let detector: Arc<dyn SubjectDetector> = Arc::new(recorded);

    let registry = Arc::new(AnalysisRegistry::new());
    if !args.force {
        for result in &project.results {
            registry.insert_completed(result.clone())?;
        }
    }

    let keys: Vec<AnalysisKey> = args
        .ratios
        .iter()
        .map(|ratio| AnalysisKey::new(source.source_id.clone(), *ratio, args.strategy))
        .collect();

    let interrupt = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling analyses (press Ctrl-C again to abort)");
                registry.shutdown();
                if tokio::signal::ctrl_c().await.is_ok() {
                    std::process::exit(130);
                }
            }
        })
    };

    let pipeline = AnalysisPipeline::new(PipelineConfig::from(&args.analysis));
    for key in keys {
        if registry.is_shut_down() {
            println!("  {}: skipped after interrupt", key.aspect_ratio);
            continue;
        }
        let request = AnalysisRequest::new(key.clone(), source.size(), source.duration_secs)
            .with_safe_area(report.safe_area);
        let ratio = key.aspect_ratio;
        let progress = move |p: AnalysisProgress| {
            eprint!("\r  {ratio}: {}/{} frames  ", p.processed, p.total);
        };

        match registry
            .analyze(pipeline.clone(), request, Arc::clone(&detector), progress)
            .await?
        {
            AnalysisOutcome::Completed(result) => {
                eprintln!();
                print_clips(&result);
                if result.failed_detections > 0 {
                    println!(
                        "    ({} sample(s) reused the previous decision after detector errors)",
                        result.failed_detections
                    );
                }
                project.upsert_result(*result);
            }
            AnalysisOutcome::Cancelled => {
                eprintln!();
                println!("  {ratio}: cancelled");
            }
        }
    }
    interrupt.abort();

    project
        .save(&project_path)
        .map_err(|e| anyhow::anyhow!("Failed to save project: {e}"))?;
    println!("\nProject saved to: {}", project_path.display());

    Ok(())
}
