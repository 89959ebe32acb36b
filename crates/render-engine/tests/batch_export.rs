use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use reframe_common::ReframeResult;
use reframe_processing_core::detector::RecordedDetections;
use reframe_processing_core::pipeline::{AnalysisPipeline, AnalysisRequest};
use reframe_project_model::analysis::{AnalysisKey, AnalysisResult};
use reframe_project_model::framing::{AspectRatio, CropStrategy};
use reframe_project_model::geometry::Size;
use reframe_render_engine::ffmpeg::{filter_graph, FilterGraph};
use reframe_render_engine::{
    build_recipe, export_batch, EncodeSettings, ExportJob, MediaEngine, ProgressCallback,
    TargetSize,
};

/// Writes the recipe as JSON instead of transcoding.
struct RecordingEngine {
    rendered: Arc<Mutex<Vec<PathBuf>>>,
}

impl MediaEngine for RecordingEngine {
    fn execute(&mut self, job: &ExportJob, _progress: Option<&ProgressCallback>) -> ReframeResult<()> {
        std::fs::write(&job.output, serde_json::to_vec(&job.recipe)?)?;
        self.rendered.lock().unwrap().push(job.output.clone());
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "recording"
    }
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("reframe-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn analyze_interview(ratio: AspectRatio) -> AnalysisResult {
    let fixture = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("fixtures")
        .join("interview")
        .join("detections.jsonl");
    let detector = RecordedDetections::load(fixture).unwrap();
    let request = AnalysisRequest::new(
        AnalysisKey::new("interview", ratio, CropStrategy::SmartCrop),
        Size::new(1920.0, 1080.0),
        12.0,
    );
    AnalysisPipeline::with_defaults()
        .run(&detector, &request, &CancellationToken::new(), &|_| {})
        .unwrap()
        .into_result()
        .unwrap()
}

fn job_for(result: &AnalysisResult, input: &Path, output: PathBuf, long_edge: u32) -> ExportJob {
    let target = TargetSize::for_ratio(result.target_aspect_ratio, long_edge);
    let recipe = build_recipe(
        &result.clips,
        target,
        result.strategy(),
        Some(result.crop_region.size()),
        result.duration_secs,
    )
    .unwrap();
    ExportJob {
        input: input.to_path_buf(),
        output,
        recipe,
        target,
        encode: EncodeSettings::default(),
        duration_secs: result.duration_secs,
        has_audio: true,
    }
}

#[test]
fn analysed_interview_renders_as_three_stage_concat() {
    let result = analyze_interview(AspectRatio::VERTICAL);
    let job = job_for(&result, Path::new("interview.mp4"), PathBuf::from("out.mp4"), 1920);

    assert_eq!(job.recipe.stages().len(), 3);
    let FilterGraph::Complex { graph, .. } = filter_graph(&job.recipe, true) else {
        panic!("expected a concat graph");
    };
    assert!(graph.contains("crop=606:1080:297:0,scale=1080:1920"));
    assert!(graph.contains("concat=n=3:v=1:a=0[vout]"));
}

#[test]
fn batch_transcodes_once_per_output_size() {
    let dir = scratch_dir("batch");
    let input = dir.join("interview.mp4");
    std::fs::write(&input, b"not really a video").unwrap();

    let vertical = analyze_interview(AspectRatio::VERTICAL);
    let square = analyze_interview(AspectRatio::SQUARE);
    let jobs = vec![
        job_for(&vertical, &input, dir.join("tiktok.mp4"), 1920),
        job_for(&square, &input, dir.join("instagram.mp4"), 1080),
        job_for(&vertical, &input, dir.join("shorts.mp4"), 1920),
    ];

    let rendered = Arc::new(Mutex::new(Vec::new()));
    let mut engine = RecordingEngine {
        rendered: Arc::clone(&rendered),
    };
    let outputs = export_batch(&mut engine, &jobs, None).unwrap();

    assert_eq!(outputs.len(), 3);
    assert_eq!(
        *rendered.lock().unwrap(),
        vec![dir.join("tiktok.mp4"), dir.join("instagram.mp4")]
    );
    assert_eq!(
        std::fs::read(dir.join("tiktok.mp4")).unwrap(),
        std::fs::read(dir.join("shorts.mp4")).unwrap()
    );

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn batch_reports_missing_input() {
    let dir = scratch_dir("missing");
    let result = analyze_interview(AspectRatio::SQUARE);
    let jobs = vec![job_for(&result, &dir.join("absent.mp4"), dir.join("out.mp4"), 1080)];
    let mut engine = RecordingEngine {
        rendered: Arc::new(Mutex::new(Vec::new())),
    };
    assert!(export_batch(&mut engine, &jobs, None).is_err());
    let _ = std::fs::remove_dir_all(&dir);
}
