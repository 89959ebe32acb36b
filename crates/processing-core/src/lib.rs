//! Reframe Processing Core
//!
//! Turns per-frame subject detections into a small set of hard-cut clips:
//! - **Strategy:** TRACK one subject or LETTERBOX a spread-out frame
//! - **Segmentation:** cut only on strategy flips or large, settled moves
//! - **Post-processing:** absorb short clips and near-identical neighbours
//! - **Pipeline / registry:** sampling, cancellation and per-key caching
//!
//! Everything except the registry's task spawning is pure computation.

pub mod detector;
pub mod pipeline;
pub mod post_process;
pub mod registry;
pub mod segmenter;
pub mod strategy;

pub use detector::{
    DetectionError, FixedSafeArea, RecordedDetections, SafeAreaDetector, SafeAreaReport,
    SubjectDetector,
};
pub use pipeline::{AnalysisOutcome, AnalysisPipeline, AnalysisProgress, AnalysisRequest, PipelineConfig};
pub use registry::{AnalysisRegistry, AnalysisState, AnalysisTicket, Begin};
pub use segmenter::{SegmenterConfig, TemporalSegmenter};
pub use strategy::{FrameDecision, FrameStrategyAnalyzer, StrategyConfig};
