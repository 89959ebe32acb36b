//! Time-ranged clips with a fixed crop window.

use serde::{Deserialize, Serialize};

use crate::detection::FramingStrategy;
use crate::geometry::{Frame, Point, Size};

/// Tolerance used when comparing clip boundaries.
pub const TIME_EPSILON: f64 = 1e-9;

/// Where a clip's framing came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClipSource {
    /// Produced by automatic analysis.
    #[default]
    Analysis,
    /// Touched by a user edit.
    Manual,
}

/// A contiguous span of the source rendered with one crop window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoClip {
    pub id: String,

    /// Start time in seconds (inclusive).
    pub start_time: f64,

    /// End time in seconds (exclusive, except for the final clip).
    pub end_time: f64,

    /// Top-left of the crop window, absolute frame pixels.
    pub crop_position: Point<Frame>,

    /// Center of the crop window (diagnostics / UI).
    pub subject_center: Point<Frame>,

    /// Render the full source frame padded to the target ratio.
    pub use_full_frame: bool,

    /// Zoom applied around the crop window center; 1.0 means none.
    #[serde(default = "default_crop_scale")]
    pub crop_scale: f64,

    #[serde(default)]
    pub source: ClipSource,
}

fn default_crop_scale() -> f64 {
    1.0
}

impl VideoClip {
    /// Create an analysis clip for `[start, end]` using a framing decision.
    pub fn new(
        start_time: f64,
        end_time: f64,
        strategy: FramingStrategy,
        crop_position: Point<Frame>,
        crop_size: Size,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            start_time,
            end_time,
            crop_position,
            subject_center: crop_center(crop_position, crop_size),
            use_full_frame: strategy == FramingStrategy::Letterbox,
            crop_scale: 1.0,
            source: ClipSource::Analysis,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    pub fn strategy(&self) -> FramingStrategy {
        if self.use_full_frame {
            FramingStrategy::Letterbox
        } else {
            FramingStrategy::Track
        }
    }

    /// Move the crop window, keeping `subject_center` in sync.
    pub fn set_crop_position(&mut self, crop_position: Point<Frame>, crop_size: Size) {
        self.crop_position = crop_position;
        self.subject_center = crop_center(crop_position, crop_size);
    }

    /// Copy framing (not timing) from another clip.
    pub fn take_framing_from(&mut self, other: &VideoClip) {
        self.crop_position = other.crop_position;
        self.subject_center = other.subject_center;
        self.use_full_frame = other.use_full_frame;
        self.crop_scale = other.crop_scale;
    }

    pub fn contains_time(&self, t: f64) -> bool {
        t >= self.start_time && t < self.end_time
    }
}

fn crop_center(origin: Point<Frame>, size: Size) -> Point<Frame> {
    origin.offset(size.width / 2.0, size.height / 2.0)
}

/// A broken clip-list invariant. Always a defect in the producer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClipInvariantError {
    #[error("clip list is empty")]
    Empty,

    #[error("first clip starts at {start} instead of 0")]
    DoesNotStartAtZero { start: f64 },

    #[error("last clip ends at {end} instead of {duration}")]
    DoesNotReachEnd { end: f64, duration: f64 },

    #[error("gap or overlap between clip {index} (ends {end}) and the next (starts {next_start})")]
    NotContiguous {
        index: usize,
        end: f64,
        next_start: f64,
    },

    #[error("clip {index} has non-positive duration ({start}..{end})")]
    Degenerate { index: usize, start: f64, end: f64 },
}

/// Verify that `clips` are ordered, contiguous and span `[0, duration]`.
pub fn check_contiguous(clips: &[VideoClip], duration: f64) -> Result<(), ClipInvariantError> {
    let first = clips.first().ok_or(ClipInvariantError::Empty)?;
    if first.start_time.abs() > TIME_EPSILON {
        return Err(ClipInvariantError::DoesNotStartAtZero {
            start: first.start_time,
        });
    }

    for (index, clip) in clips.iter().enumerate() {
        // A zero-length run is tolerated only as the sole clip of an empty source.
        let sole_empty = clips.len() == 1 && duration <= TIME_EPSILON;
        if clip.end_time - clip.start_time <= 0.0 && !sole_empty {
            return Err(ClipInvariantError::Degenerate {
                index,
                start: clip.start_time,
                end: clip.end_time,
            });
        }
    }

    for (index, pair) in clips.windows(2).enumerate() {
        if (pair[0].end_time - pair[1].start_time).abs() > TIME_EPSILON {
            return Err(ClipInvariantError::NotContiguous {
                index,
                end: pair[0].end_time,
                next_start: pair[1].start_time,
            });
        }
    }

    if let Some(last) = clips.last() {
        if (last.end_time - duration).abs() > TIME_EPSILON {
            return Err(ClipInvariantError::DoesNotReachEnd {
                end: last.end_time,
                duration,
            });
        }
    }

    Ok(())
}

/// Index of the clip covering `t` (the last clip also owns its end time).
pub fn clip_index_at(clips: &[VideoClip], t: f64) -> Option<usize> {
    if let Some(idx) = clips.iter().position(|c| c.contains_time(t)) {
        return Some(idx);
    }
    match clips.last() {
        Some(last) if (t - last.end_time).abs() <= TIME_EPSILON => Some(clips.len() - 1),
        _ => None,
    }
}
