//! Detection contracts and per-frame framing decisions.
//!
//! Regions come from an external subject detector in absolute frame
//! pixels. The framing analyzer consumes them (after translation into the
//! safe area) and produces one [`FrameAnalysis`] per sampled timestamp.

use serde::{Deserialize, Serialize};

use crate::geometry::{CoordinateSpace, Frame, Point, Rect, SafeArea, SafeRelative};

/// A subject found by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct DetectedRegion<S: CoordinateSpace = Frame> {
    pub bounding_box: Rect<S>,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f64,
}

impl<S: CoordinateSpace> DetectedRegion<S> {
    pub fn new(bounding_box: Rect<S>, confidence: f64) -> Self {
        Self {
            bounding_box,
            confidence,
        }
    }
}

impl DetectedRegion<Frame> {
    /// Move into safe-area-relative coordinates.
    pub fn relative_to(&self, safe_area: &SafeArea) -> DetectedRegion<SafeRelative> {
        DetectedRegion {
            bounding_box: safe_area.to_relative_rect(self.bounding_box),
            confidence: self.confidence,
        }
    }
}

/// Raw detector output for one timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default)]
    pub regions: Vec<DetectedRegion>,

    /// Index into `regions` of the region most likely speaking.
    #[serde(default)]
    pub speaking_index: Option<usize>,
}

/// Per-frame framing strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramingStrategy {
    /// Crop window follows a single subject.
    Track,
    /// Show the full frame padded to the target ratio.
    Letterbox,
}

/// Framing decision for one sampled frame, in absolute coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameAnalysis {
    /// Seconds from the start of the source.
    pub timestamp: f64,

    pub regions: Vec<DetectedRegion>,

    pub speaking_index: Option<usize>,

    pub strategy: FramingStrategy,

    /// Top-left of the chosen crop window.
    pub crop_position: Point<Frame>,
}

impl FrameAnalysis {
    /// A decision with no detector evidence attached.
    pub fn decision(timestamp: f64, strategy: FramingStrategy, crop_position: Point<Frame>) -> Self {
        Self {
            timestamp,
            regions: Vec::new(),
            speaking_index: None,
            strategy,
            crop_position,
        }
    }
}
