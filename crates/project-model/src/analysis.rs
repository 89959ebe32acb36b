//! Analysis results and the keys they are cached under.

use serde::{Deserialize, Serialize};

use crate::clip::{check_contiguous, ClipInvariantError, VideoClip};
use crate::framing::{AspectRatio, CropRegion, CropStrategy};
use crate::geometry::{SafeArea, Size};

/// Identifies one analysis run: a source file, a target ratio and a
/// crop strategy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnalysisKey {
    /// Stable fingerprint of the source file.
    pub source_id: String,
    pub aspect_ratio: AspectRatio,
    pub strategy: CropStrategy,
}

impl AnalysisKey {
    pub fn new(source_id: impl Into<String>, aspect_ratio: AspectRatio, strategy: CropStrategy) -> Self {
        Self {
            source_id: source_id.into(),
            aspect_ratio,
            strategy,
        }
    }

    /// Stable string form used for persisted caches.
    pub fn cache_id(&self) -> String {
        format!(
            "{}:{}x{}:{}",
            self.source_id, self.aspect_ratio.width, self.aspect_ratio.height, self.strategy
        )
    }
}

/// Output of a completed analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub key: AnalysisKey,

    /// Ordered, contiguous clips spanning the whole source.
    pub clips: Vec<VideoClip>,

    /// Safe area every crop position was computed within.
    pub safe_area: SafeArea,

    pub target_aspect_ratio: AspectRatio,

    /// Crop window size (centered placement) for this ratio.
    pub crop_region: CropRegion,

    pub source_width: f64,
    pub source_height: f64,
    pub duration_secs: f64,

    /// Number of sampled frames that fed the segmenter.
    #[serde(default)]
    pub sampled_frames: usize,

    /// Number of samples whose detection failed and reused a prior decision.
    #[serde(default)]
    pub failed_detections: usize,
}

impl AnalysisResult {
    pub fn source_size(&self) -> Size {
        Size::new(self.source_width, self.source_height)
    }

    pub fn strategy(&self) -> CropStrategy {
        self.key.strategy
    }

    /// Check the clip-list invariant against this result's duration.
    pub fn validate(&self) -> Result<(), ClipInvariantError> {
        check_contiguous(&self.clips, self.duration_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_id_is_stable_and_distinct() {
        let a = AnalysisKey::new("abc123", AspectRatio::VERTICAL, CropStrategy::SmartCrop);
        let b = AnalysisKey::new("abc123", AspectRatio::VERTICAL, CropStrategy::CenterCrop);
        let c = AnalysisKey::new("abc123", AspectRatio::SQUARE, CropStrategy::SmartCrop);
        assert_eq!(a.cache_id(), "abc123:9x16:smart-crop");
        assert_eq!(a.cache_id(), a.clone().cache_id());
        assert_ne!(a.cache_id(), b.cache_id());
        assert_ne!(a.cache_id(), c.cache_id());
    }
}
