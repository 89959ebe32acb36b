//! Reframe Render Engine
//!
//! Turns analysed clips into export recipes and runs them through a media
//! engine.
//!
//! # Pipeline
//!
//! ```text
//! clips ──► build_recipe ──► ExportRecipe ──► FfmpegEngine ──► output.mp4
//!              │                                  ▲
//!        target size,                        source.mp4
//!        crop strategy
//! ```
//!
//! Batch exports group targets by output size so each distinct size is
//! transcoded once.

pub mod export;
pub mod ffmpeg;
pub mod probe;
pub mod recipe;

pub use export::*;
pub use probe::{probe_media, MediaInfo};
pub use recipe::{build_recipe, plan_batch, rescale_clips, BatchGroup, ExportRecipe, RecipeStage, TargetSize, Trim, VideoOp};
