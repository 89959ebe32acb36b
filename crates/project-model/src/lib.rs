//! Reframe Project Model
//!
//! Defines the core data contracts for reframing projects:
//! - **Geometry:** Pixel points/rects tagged with their coordinate space
//! - **Framing:** Aspect ratios, crop strategies, crop-window sizing
//! - **Detection:** Detector output and per-frame framing decisions
//! - **Clips:** Time-ranged crop windows and their contiguity invariant
//! - **History:** Snapshot-based clip editing with undo/redo
//! - **Project:** Persisted analyses keyed by (source, ratio, strategy)

pub mod analysis;
pub mod clip;
pub mod detection;
pub mod framing;
pub mod geometry;
pub mod history;
pub mod project;

pub use analysis::*;
pub use clip::*;
pub use detection::*;
pub use framing::*;
pub use geometry::*;
pub use history::*;
pub use project::*;
