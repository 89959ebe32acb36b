//! Temporal segmentation: per-frame decisions into hard-cut clips.
//!
//! # Algorithm
//!
//! 1. **Seed** the running clip at t=0 with the first frame's decision.
//! 2. **Scan** later frames in timestamp order. A frame opens a new clip
//!    when its strategy differs from the running one, or when its crop
//!    moved more than `cut_threshold_px` *and* the running clip has lasted
//!    at least `min_clip_duration_secs`.
//! 3. **Close** the running clip at the total duration.
//! 4. **Merge** clips shorter than the minimum duration (see
//!    [`merge_short`](crate::post_process::merge_short)).

use reframe_common::config::AnalysisDefaults;
use reframe_project_model::clip::VideoClip;
use reframe_project_model::detection::{FrameAnalysis, FramingStrategy};
use reframe_project_model::framing::CropRegion;

use crate::post_process::merge_short;

/// Reference height the default pixel thresholds were tuned for.
pub const REFERENCE_HEIGHT_PX: f64 = 1080.0;

/// Configuration for the temporal segmenter.
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Crop movement (source pixels) that may open a new clip.
    pub cut_threshold_px: f64,

    /// Minimum clip duration for position-driven cuts and short-clip merging.
    pub min_clip_duration_secs: f64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            cut_threshold_px: 100.0,
            min_clip_duration_secs: 1.0,
        }
    }
}

impl From<&AnalysisDefaults> for SegmenterConfig {
    fn from(defaults: &AnalysisDefaults) -> Self {
        Self {
            cut_threshold_px: defaults.cut_threshold_px,
            min_clip_duration_secs: defaults.min_clip_duration_secs,
        }
    }
}

impl SegmenterConfig {
    /// Rescale the pixel threshold from 1080p to `source_height`.
    pub fn scaled_for_height(&self, source_height: f64) -> Self {
        let factor = if source_height > 0.0 {
            source_height / REFERENCE_HEIGHT_PX
        } else {
            1.0
        };
        Self {
            cut_threshold_px: self.cut_threshold_px * factor,
            ..self.clone()
        }
    }
}

/// The temporal segmenter.
#[derive(Debug, Clone, Default)]
pub struct TemporalSegmenter {
    config: SegmenterConfig,
}

impl TemporalSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(SegmenterConfig::default())
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Segment frames into clips spanning `[0, total_duration]`, with short
    /// clips merged away.
    pub fn segment(
        &self,
        frames: &[FrameAnalysis],
        crop_region: &CropRegion,
        total_duration: f64,
    ) -> Vec<VideoClip> {
        let raw = self.segment_raw(frames, crop_region, total_duration);
        let raw_count = raw.len();
        let clips = merge_short(raw, self.config.min_clip_duration_secs);
        tracing::debug!(
            frames = frames.len(),
            raw_clips = raw_count,
            clips = clips.len(),
            "Segmented frame decisions"
        );
        clips
    }

    /// Cut detection only, without the short-clip merge.
    pub fn segment_raw(
        &self,
        frames: &[FrameAnalysis],
        crop_region: &CropRegion,
        total_duration: f64,
    ) -> Vec<VideoClip> {
        let total_duration = total_duration.max(0.0);
        let crop_size = crop_region.size();

        let Some(first) = frames.first() else {
            return vec![VideoClip::new(
                0.0,
                total_duration,
                FramingStrategy::Track,
                crop_region.origin(),
                crop_size,
            )];
        };

        let mut clips = Vec::new();
        let mut current_start = 0.0;
        let mut current_strategy = first.strategy;
        let mut current_position = first.crop_position;

        for frame in &frames[1..] {
            let t = frame.timestamp;
            // A cut here would create an empty or inverted clip.
            if t <= current_start || t >= total_duration {
                continue;
            }

            let position_delta = frame.crop_position.distance_to(&current_position);
            let strategy_changed = frame.strategy != current_strategy;
            let elapsed = t - current_start;

            let position_cut = position_delta > self.config.cut_threshold_px
                && elapsed >= self.config.min_clip_duration_secs;

            if strategy_changed || position_cut {
                clips.push(VideoClip::new(
                    current_start,
                    t,
                    current_strategy,
                    current_position,
                    crop_size,
                ));
                current_start = t;
                current_strategy = frame.strategy;
                current_position = frame.crop_position;
            }
        }

        clips.push(VideoClip::new(
            current_start,
            total_duration,
            current_strategy,
            current_position,
            crop_size,
        ));

        clips
    }
}
