//! Sampling pipeline: detector samples -> frame decisions -> clips.

use tokio_util::sync::CancellationToken;

use reframe_common::config::AnalysisDefaults;
use reframe_common::{ReframeError, ReframeResult};
use reframe_project_model::analysis::{AnalysisKey, AnalysisResult};
use reframe_project_model::clip::VideoClip;
use reframe_project_model::detection::{DetectedRegion, FrameAnalysis, FramingStrategy};
use reframe_project_model::framing::{CropRegion, CropStrategy};
use reframe_project_model::geometry::{SafeArea, SafeRelative, Size};

use crate::detector::SubjectDetector;
use crate::post_process::merge_similar_position;
use crate::segmenter::{SegmenterConfig, TemporalSegmenter, REFERENCE_HEIGHT_PX};
use crate::strategy::{FrameStrategyAnalyzer, StrategyConfig};

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Seconds between sampled frames.
    pub sample_interval_secs: f64,
    pub strategy: StrategyConfig,
    pub segmenter: SegmenterConfig,
    /// Neighbouring clips closer than this are folded together.
    pub similar_position_threshold_px: f64,
    /// Scale pixel thresholds with the source height.
    pub resolution_relative: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_interval_secs: 0.5,
            strategy: StrategyConfig::default(),
            segmenter: SegmenterConfig::default(),
            similar_position_threshold_px: 100.0,
            resolution_relative: false,
        }
    }
}

impl From<&AnalysisDefaults> for PipelineConfig {
    fn from(defaults: &AnalysisDefaults) -> Self {
        Self {
            sample_interval_secs: defaults.sample_interval_secs,
            strategy: StrategyConfig::from(defaults),
            segmenter: SegmenterConfig::from(defaults),
            similar_position_threshold_px: defaults.similar_position_threshold_px,
            resolution_relative: defaults.resolution_relative,
        }
    }
}

/// What to analyze.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub key: AnalysisKey,
    pub source: Size,
    pub duration_secs: f64,
    pub safe_area: SafeArea,
}

impl AnalysisRequest {
    /// Request with the whole frame as safe area.
    pub fn new(key: AnalysisKey, source: Size, duration_secs: f64) -> Self {
        Self {
            key,
            source,
            duration_secs,
            safe_area: SafeArea::full_frame(source),
        }
    }

    pub fn with_safe_area(mut self, safe_area: SafeArea) -> Self {
        self.safe_area = safe_area;
        self
    }
}

/// Progress through the sampled frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisProgress {
    pub processed: usize,
    pub total: usize,
}

impl AnalysisProgress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.processed as f64 / self.total as f64
        }
    }
}

/// Result of a pipeline run. Cancellation is not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Completed(Box<AnalysisResult>),
    Cancelled,
}

impl AnalysisOutcome {
    pub fn into_result(self) -> Option<AnalysisResult> {
        match self {
            Self::Completed(result) => Some(*result),
            Self::Cancelled => None,
        }
    }
}

/// Sample timestamps `i * interval` for `i` in `0..=floor(duration / interval)`.
pub fn sample_timestamps(duration_secs: f64, interval_secs: f64) -> Vec<f64> {
    if duration_secs <= 0.0 {
        return vec![0.0];
    }
    // Absorb float error so 10.0 / 0.5 yields 20, not 19.
    let count = (duration_secs / interval_secs + 1e-9).floor() as usize;
    (0..=count).map(|i| i as f64 * interval_secs).collect()
}

/// Runs detection, strategy analysis and segmentation for one request.
#[derive(Debug, Clone, Default)]
pub struct AnalysisPipeline {
    config: PipelineConfig,
}

impl AnalysisPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(PipelineConfig::default())
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Analyze a source. Checks `cancel` before every sampled frame.
    pub fn run(
        &self,
        detector: &dyn SubjectDetector,
        request: &AnalysisRequest,
        cancel: &CancellationToken,
        progress: &dyn Fn(AnalysisProgress),
    ) -> ReframeResult<AnalysisOutcome> {
        let interval = self.config.sample_interval_secs;
        if !interval.is_finite() || interval <= 0.0 {
            return Err(ReframeError::analysis(format!(
                "sample interval must be positive, got {interval}"
            )));
        }
        if !request.duration_secs.is_finite() || request.duration_secs < 0.0 {
            return Err(ReframeError::analysis(format!(
                "invalid source duration {}",
                request.duration_secs
            )));
        }

        let key = &request.key;
        let crop_region = CropRegion::centered(&request.safe_area, key.aspect_ratio);
        let crop_size = crop_region.size();

        tracing::info!(
            key = %key.cache_id(),
            width = request.source.width,
            height = request.source.height,
            duration = request.duration_secs,
            crop_width = crop_size.width,
            crop_height = crop_size.height,
            "Starting analysis"
        );

        if key.strategy == CropStrategy::CenterCrop {
            let clip = VideoClip::new(
                0.0,
                request.duration_secs,
                FramingStrategy::Track,
                crop_region.origin(),
                crop_size,
            );
            progress(AnalysisProgress {
                processed: 0,
                total: 0,
            });
            return self.finish(request, crop_region, vec![clip], 0, 0);
        }

        let analyzer = FrameStrategyAnalyzer::new(self.config.strategy.clone());
        let safe_area = request.safe_area;
        let timestamps = sample_timestamps(request.duration_secs, interval);
        let total = timestamps.len();

        let mut frames: Vec<FrameAnalysis> = Vec::with_capacity(total);
        let mut failed = 0usize;

        for (idx, &t) in timestamps.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(key = %key.cache_id(), processed = idx, total, "Analysis cancelled");
                return Ok(AnalysisOutcome::Cancelled);
            }

            let timestamp_ms = (t * 1000.0).round() as u64;
            let frame = match detector.detect(timestamp_ms) {
                Ok(detection) => {
                    let relative: Vec<DetectedRegion<SafeRelative>> = detection
                        .regions
                        .iter()
                        .map(|r| r.relative_to(&safe_area))
                        .collect();
                    let decision = analyzer.analyze(
                        &relative,
                        detection.speaking_index,
                        safe_area.size(),
                        crop_size,
                    );
                    FrameAnalysis {
                        timestamp: t,
                        regions: detection.regions,
                        speaking_index: detection.speaking_index,
                        strategy: decision.strategy,
                        crop_position: safe_area.to_absolute_point(decision.crop_position),
                    }
                }
                Err(err) => {
                    failed += 1;
                    tracing::warn!(timestamp_ms, error = %err, "Detection failed, reusing previous decision");
                    match frames.last() {
                        Some(prev) => FrameAnalysis::decision(t, prev.strategy, prev.crop_position),
                        None => FrameAnalysis::decision(t, FramingStrategy::Track, crop_region.origin()),
                    }
                }
            };

            tracing::trace!(
                t,
                strategy = ?frame.strategy,
                x = frame.crop_position.x,
                y = frame.crop_position.y,
                "Frame decision"
            );
            frames.push(frame);
            progress(AnalysisProgress {
                processed: idx + 1,
                total,
            });
        }

        let (segmenter_config, similar_threshold) = if self.config.resolution_relative {
            let factor = if request.source.height > 0.0 {
                request.source.height / REFERENCE_HEIGHT_PX
            } else {
                1.0
            };
            (
                self.config.segmenter.scaled_for_height(request.source.height),
                self.config.similar_position_threshold_px * factor,
            )
        } else {
            (
                self.config.segmenter.clone(),
                self.config.similar_position_threshold_px,
            )
        };
        let clips = TemporalSegmenter::new(segmenter_config).segment(
            &frames,
            &crop_region,
            request.duration_secs,
        );
        let clips = merge_similar_position(clips, similar_threshold);

        self.finish(request, crop_region, clips, total, failed)
    }

    fn finish(
        &self,
        request: &AnalysisRequest,
        crop_region: CropRegion,
        clips: Vec<VideoClip>,
        sampled_frames: usize,
        failed_detections: usize,
    ) -> ReframeResult<AnalysisOutcome> {
        let result = AnalysisResult {
            key: request.key.clone(),
            clips,
            safe_area: request.safe_area,
            target_aspect_ratio: request.key.aspect_ratio,
            crop_region,
            source_width: request.source.width,
            source_height: request.source.height,
            duration_secs: request.duration_secs,
            sampled_frames,
            failed_detections,
        };
        result
            .validate()
            .map_err(|e| ReframeError::analysis(format!("segmentation broke clip invariant: {e}")))?;

        tracing::info!(
            key = %request.key.cache_id(),
            clips = result.clips.len(),
            sampled_frames,
            failed_detections,
            "Analysis complete"
        );
        Ok(AnalysisOutcome::Completed(Box::new(result)))
    }
}
