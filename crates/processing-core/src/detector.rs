//! Detector contracts and replay adapters.
//!
//! Real subject and black-bar detectors live outside this workspace. The
//! pipeline only sees the two traits below; [`RecordedDetections`] replays a
//! JSONL detection log so analyses can be reproduced without a model.

use std::path::Path;

use serde::{Deserialize, Serialize};

use reframe_common::ReframeError;
use reframe_project_model::detection::{DetectedRegion, Detection};
use reframe_project_model::geometry::{Frame, Rect, SafeArea, Size};

/// Failure of an external detector.
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("detector failed at {timestamp_ms} ms: {message}")]
    Failed { timestamp_ms: u64, message: String },

    #[error("no recorded sample near {timestamp_ms} ms")]
    NoSample { timestamp_ms: u64 },

    #[error("invalid detection log line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read detection log: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DetectionError> for ReframeError {
    fn from(err: DetectionError) -> Self {
        ReframeError::detection(err.to_string())
    }
}

/// Finds subjects in the source frame at a timestamp.
pub trait SubjectDetector: Send + Sync {
    fn detect(&self, timestamp_ms: u64) -> Result<Detection, DetectionError>;
}

/// Black-bar detection result for a whole source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafeAreaReport {
    pub has_bars: bool,
    pub safe_area: SafeArea,
}

/// Finds the content rectangle inside letterboxed/pillarboxed sources.
pub trait SafeAreaDetector: Send + Sync {
    fn detect(&self, source: Size, duration_secs: f64) -> Result<SafeAreaReport, DetectionError>;
}

/// One line of a detection log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedSample {
    pub t_ms: u64,

    #[serde(default)]
    pub regions: Vec<DetectedRegion>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaking_index: Option<usize>,

    /// The detector failed on this sample.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Default match window: half of the default 0.5 s sample interval.
pub const DEFAULT_TOLERANCE_MS: u64 = 250;

/// Replays a recorded detection log.
#[derive(Debug, Clone)]
pub struct RecordedDetections {
    samples: Vec<RecordedSample>,
    tolerance_ms: u64,
}

impl RecordedDetections {
    pub fn from_samples(mut samples: Vec<RecordedSample>) -> Self {
        samples.sort_by_key(|s| s.t_ms);
        Self {
            samples,
            tolerance_ms: DEFAULT_TOLERANCE_MS,
        }
    }

    /// Parse a JSONL log. Blank lines and lines starting with `#` are skipped.
    pub fn parse(jsonl: &str) -> Result<Self, DetectionError> {
        let mut samples = Vec::new();
        for (idx, line) in jsonl.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let sample = serde_json::from_str(line).map_err(|source| DetectionError::Parse {
                line: idx + 1,
                source,
            })?;
            samples.push(sample);
        }
        Ok(Self::from_samples(samples))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DetectionError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let recorded = Self::parse(&content)?;
        tracing::debug!(
            path = %path.as_ref().display(),
            samples = recorded.samples.len(),
            "Loaded detection log"
        );
        Ok(recorded)
    }

    /// Match samples within `tolerance_ms` of the requested timestamp.
    pub fn with_tolerance_ms(mut self, tolerance_ms: u64) -> Self {
        self.tolerance_ms = tolerance_ms;
        self
    }

    /// Tolerance of half a sample interval.
    pub fn with_sample_interval(self, interval_secs: f64) -> Self {
        let tolerance = (interval_secs * 500.0).round().max(0.0) as u64;
        self.with_tolerance_ms(tolerance)
    }

    pub fn samples(&self) -> &[RecordedSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn nearest(&self, timestamp_ms: u64) -> Option<&RecordedSample> {
        let idx = self.samples.partition_point(|s| s.t_ms < timestamp_ms);
        let after = self.samples.get(idx);
        let before = idx.checked_sub(1).and_then(|i| self.samples.get(i));
        let candidate = match (before, after) {
            (Some(b), Some(a)) => {
                if timestamp_ms - b.t_ms <= a.t_ms - timestamp_ms {
                    b
                } else {
                    a
                }
            }
            (Some(b), None) => b,
            (None, Some(a)) => a,
            (None, None) => return None,
        };
        (candidate.t_ms.abs_diff(timestamp_ms) <= self.tolerance_ms).then_some(candidate)
    }
}

impl SubjectDetector for RecordedDetections {
    fn detect(&self, timestamp_ms: u64) -> Result<Detection, DetectionError> {
        let sample = self
            .nearest(timestamp_ms)
            .ok_or(DetectionError::NoSample { timestamp_ms })?;

        if let Some(message) = &sample.error {
            return Err(DetectionError::Failed {
                timestamp_ms,
                message: message.clone(),
            });
        }

        Ok(Detection {
            regions: sample.regions.clone(),
            speaking_index: sample.speaking_index,
        })
    }
}

/// Safe-area detector returning a known rectangle.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedSafeArea {
    rect: Option<Rect<Frame>>,
}

impl FixedSafeArea {
    /// The whole frame is content.
    pub fn full_frame() -> Self {
        Self { rect: None }
    }

    pub fn new(rect: Rect<Frame>) -> Self {
        Self { rect: Some(rect) }
    }
}

impl SafeAreaDetector for FixedSafeArea {
    fn detect(&self, source: Size, _duration_secs: f64) -> Result<SafeAreaReport, DetectionError> {
        let full = Rect::from_size(source);
        let rect = self.rect.unwrap_or(full);
        Ok(SafeAreaReport {
            has_bars: rect != full,
            safe_area: SafeArea::new(rect),
        })
    }
}
