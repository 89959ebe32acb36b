//! Frame strategy analysis: TRACK one subject or LETTERBOX the frame.
//!
//! # Rules
//!
//! 1. **No regions:** TRACK with a geometrically centered crop.
//! 2. **One region:** TRACK centered on the region, biased upward by
//!    `vertical_bias_ratio * crop_h`.
//! 3. **Several regions:** if their bounding box is wider than
//!    `letterbox_spread_ratio * crop_w` the subjects cannot share one crop
//!    window and the frame is letterboxed. Otherwise TRACK the speaking
//!    region, or the most confident one when nobody is flagged speaking.
//!
//! All inputs and outputs are safe-area-relative; the caller translates.

use reframe_common::config::AnalysisDefaults;
use reframe_project_model::detection::{DetectedRegion, FramingStrategy};
use reframe_project_model::geometry::{clamp_crop_origin, Point, Rect, SafeRelative, Size};

/// Configuration for the strategy analyzer.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    /// Subjects spread wider than this fraction of the crop width letterbox.
    pub letterbox_spread_ratio: f64,

    /// Upward shift of the crop window as a fraction of its height.
    pub vertical_bias_ratio: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            letterbox_spread_ratio: 0.8,
            vertical_bias_ratio: 0.1,
        }
    }
}

impl From<&AnalysisDefaults> for StrategyConfig {
    fn from(defaults: &AnalysisDefaults) -> Self {
        Self {
            letterbox_spread_ratio: defaults.letterbox_spread_ratio,
            vertical_bias_ratio: defaults.vertical_bias_ratio,
        }
    }
}

/// One frame's framing decision in safe-area-relative coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameDecision {
    pub strategy: FramingStrategy,
    pub crop_position: Point<SafeRelative>,
}

/// The frame strategy analyzer.
#[derive(Debug, Clone, Default)]
pub struct FrameStrategyAnalyzer {
    config: StrategyConfig,
}

impl FrameStrategyAnalyzer {
    /// Create a new analyzer with the given configuration.
    pub fn new(config: StrategyConfig) -> Self {
        Self { config }
    }

    /// Create an analyzer with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(StrategyConfig::default())
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Decide the strategy and crop position for one frame.
    pub fn analyze(
        &self,
        regions: &[DetectedRegion<SafeRelative>],
        speaking_index: Option<usize>,
        source: Size,
        crop: Size,
    ) -> FrameDecision {
        match regions {
            [] => Self::centered(source, crop),
            [only] => FrameDecision {
                strategy: FramingStrategy::Track,
                crop_position: self.framed_on(&only.bounding_box, source, crop),
            },
            [first, rest @ ..] => {
                let boxes: Vec<Rect<SafeRelative>> =
                    regions.iter().map(|r| r.bounding_box).collect();
                let Some(bbox) = Rect::bounding(&boxes) else {
                    return Self::centered(source, crop);
                };

                if bbox.width > self.config.letterbox_spread_ratio * crop.width {
                    let center = bbox.center();
                    let desired = Point::new(
                        center.x - crop.width / 2.0,
                        center.y - crop.height / 2.0,
                    );
                    return FrameDecision {
                        strategy: FramingStrategy::Letterbox,
                        crop_position: clamp_crop_origin(desired, source, crop),
                    };
                }

                let target = speaking_index
                    .and_then(|i| regions.get(i))
                    .unwrap_or_else(|| Self::most_confident(first, rest));
                FrameDecision {
                    strategy: FramingStrategy::Track,
                    crop_position: self.framed_on(&target.bounding_box, source, crop),
                }
            }
        }
    }

    /// Geometric center crop, TRACK strategy.
    pub fn centered(source: Size, crop: Size) -> FrameDecision {
        FrameDecision {
            strategy: FramingStrategy::Track,
            crop_position: Point::new(
                ((source.width - crop.width) / 2.0).max(0.0),
                ((source.height - crop.height) / 2.0).max(0.0),
            ),
        }
    }

    /// Most confident region; the earliest wins ties.
    fn most_confident<'a>(
        first: &'a DetectedRegion<SafeRelative>,
        rest: &'a [DetectedRegion<SafeRelative>],
    ) -> &'a DetectedRegion<SafeRelative> {
        rest.iter()
            .fold(first, |best, r| if r.confidence > best.confidence { r } else { best })
    }

    /// Crop origin centering `region` with the upward bias, clamped.
    fn framed_on(&self, region: &Rect<SafeRelative>, source: Size, crop: Size) -> Point<SafeRelative> {
        let center = region.center();
        let bias = self.config.vertical_bias_ratio * crop.height;
        let desired = Point::new(
            center.x - crop.width / 2.0,
            center.y - bias - crop.height / 2.0,
        );
        clamp_crop_origin(desired, source, crop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(x: f64, y: f64, w: f64, h: f64, confidence: f64) -> DetectedRegion<SafeRelative> {
        DetectedRegion::new(Rect::new(x, y, w, h), confidence)
    }

    const SOURCE: Size = Size {
        width: 1000.0,
        height: 1000.0,
    };
    const CROP: Size = Size {
        width: 400.0,
        height: 400.0,
    };

    #[test]
    fn test_no_regions_centers_crop() {
        let analyzer = FrameStrategyAnalyzer::with_defaults();
        let decision = analyzer.analyze(&[], None, SOURCE, CROP);
        assert_eq!(decision.strategy, FramingStrategy::Track);
        assert_eq!(decision.crop_position, Point::new(300.0, 300.0));
    }

    #[test]
    fn test_centered_never_goes_negative() {
        let decision = FrameStrategyAnalyzer::centered(Size::new(300.0, 300.0), CROP);
        assert_eq!(decision.crop_position, Point::new(0.0, 0.0));
    }

    #[test]
    fn test_single_region_biases_upward() {
        let analyzer = FrameStrategyAnalyzer::with_defaults();
        // Region centered at (500, 500).
        let regions = [region(450.0, 450.0, 100.0, 100.0, 0.9)];
        let decision = analyzer.analyze(&regions, None, SOURCE, CROP);

        assert_eq!(decision.strategy, FramingStrategy::Track);
        // Crop center sits 40px above the region center: (500, 460).
        assert!((decision.crop_position.x - 300.0).abs() < 1e-9);
        assert!((decision.crop_position.y - 260.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_region_near_edge_is_clamped() {
        let analyzer = FrameStrategyAnalyzer::with_defaults();
        let regions = [region(950.0, 0.0, 50.0, 50.0, 0.9)];
        let decision = analyzer.analyze(&regions, None, SOURCE, CROP);
        assert_eq!(decision.crop_position, Point::new(600.0, 0.0));
    }

    #[test]
    fn test_spread_subjects_letterbox() {
        let analyzer = FrameStrategyAnalyzer::with_defaults();
        // Combined width 900px against a 400px crop (threshold 320px).
        let regions = [
            region(50.0, 400.0, 100.0, 100.0, 0.9),
            region(850.0, 420.0, 100.0, 100.0, 0.8),
        ];
        let decision = analyzer.analyze(&regions, None, SOURCE, CROP);
        assert_eq!(decision.strategy, FramingStrategy::Letterbox);
        // Centered on the bounding box center (500, 460), no bias.
        assert_eq!(decision.crop_position, Point::new(300.0, 260.0));
    }

    #[test]
    fn test_close_subjects_track_most_confident() {
        let analyzer = FrameStrategyAnalyzer::with_defaults();
        let regions = [
            region(300.0, 500.0, 100.0, 100.0, 0.6),
            region(500.0, 500.0, 100.0, 100.0, 0.95),
        ];
        let decision = analyzer.analyze(&regions, None, SOURCE, CROP);
        assert_eq!(decision.strategy, FramingStrategy::Track);
        // Target center (550, 550) -> origin (350, 310).
        assert_eq!(decision.crop_position, Point::new(350.0, 310.0));
    }

    #[test]
    fn test_speaking_region_wins_over_confidence() {
        let analyzer = FrameStrategyAnalyzer::with_defaults();
        let regions = [
            region(300.0, 500.0, 100.0, 100.0, 0.6),
            region(500.0, 500.0, 100.0, 100.0, 0.95),
        ];
        let decision = analyzer.analyze(&regions, Some(0), SOURCE, CROP);
        // Target center (350, 550) -> origin (150, 310).
        assert_eq!(decision.crop_position, Point::new(150.0, 310.0));
    }

    #[test]
    fn test_out_of_range_speaker_falls_back_to_confidence() {
        let analyzer = FrameStrategyAnalyzer::with_defaults();
        let regions = [
            region(300.0, 500.0, 100.0, 100.0, 0.6),
            region(500.0, 500.0, 100.0, 100.0, 0.95),
        ];
        let decision = analyzer.analyze(&regions, Some(7), SOURCE, CROP);
        assert_eq!(decision.crop_position, Point::new(350.0, 310.0));
    }

    #[test]
    fn test_confidence_tie_keeps_first_region() {
        let analyzer = FrameStrategyAnalyzer::with_defaults();
        let regions = [
            region(300.0, 500.0, 100.0, 100.0, 0.8),
            region(500.0, 500.0, 100.0, 100.0, 0.8),
        ];
        let decision = analyzer.analyze(&regions, None, SOURCE, CROP);
        assert_eq!(decision.crop_position, Point::new(150.0, 310.0));
    }

    #[test]
    fn test_tied_best_confidence_keeps_earliest_of_tied() {
        let analyzer = FrameStrategyAnalyzer::with_defaults();
        let regions = [
            region(250.0, 500.0, 50.0, 50.0, 0.5),
            region(350.0, 500.0, 50.0, 50.0, 0.9),
            region(450.0, 500.0, 50.0, 50.0, 0.9),
        ];
        let decision = analyzer.analyze(&regions, None, SOURCE, CROP);
        assert_eq!(decision.strategy, FramingStrategy::Track);
        // Middle region center (375, 525) -> origin (175, 285).
        assert_eq!(decision.crop_position, Point::new(175.0, 285.0));
    }

    #[test]
    fn test_spread_threshold_is_configurable() {
        let analyzer = FrameStrategyAnalyzer::new(StrategyConfig {
            letterbox_spread_ratio: 3.0,
            ..Default::default()
        });
        let regions = [
            region(50.0, 400.0, 100.0, 100.0, 0.9),
            region(850.0, 420.0, 100.0, 100.0, 0.8),
        ];
        let decision = analyzer.analyze(&regions, None, SOURCE, CROP);
        assert_eq!(decision.strategy, FramingStrategy::Track);
    }
}
