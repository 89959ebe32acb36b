//! Clip editing with undo/redo.
//!
//! Every edit produces a new immutable snapshot of the clip list. The
//! snapshots are reference counted so undo/redo only moves a cursor.

use std::sync::Arc;

use crate::analysis::AnalysisResult;
use crate::clip::{check_contiguous, ClipInvariantError, ClipSource, VideoClip, TIME_EPSILON};
use crate::geometry::{clamp_crop_origin, Frame, Point};

/// Default number of snapshots kept.
pub const DEFAULT_HISTORY_DEPTH: usize = 100;

/// Linear snapshot history with a cursor.
#[derive(Debug, Clone)]
pub struct History {
    snapshots: Vec<Arc<Vec<VideoClip>>>,
    cursor: usize,
    max_depth: usize,
}

impl History {
    pub fn new(initial: Vec<VideoClip>) -> Self {
        Self::with_depth(initial, DEFAULT_HISTORY_DEPTH)
    }

    pub fn with_depth(initial: Vec<VideoClip>, max_depth: usize) -> Self {
        Self {
            snapshots: vec![Arc::new(initial)],
            cursor: 0,
            max_depth: max_depth.max(1),
        }
    }

    /// The snapshot under the cursor.
    pub fn current(&self) -> &Arc<Vec<VideoClip>> {
        &self.snapshots[self.cursor]
    }

    /// Record a new snapshot, dropping any redo branch.
    pub fn push(&mut self, clips: Vec<VideoClip>) {
        self.snapshots.truncate(self.cursor + 1);
        self.snapshots.push(Arc::new(clips));
        if self.snapshots.len() > self.max_depth {
            let excess = self.snapshots.len() - self.max_depth;
            self.snapshots.drain(..excess);
        }
        self.cursor = self.snapshots.len() - 1;
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.snapshots.len()
    }

    /// Step back one snapshot. Returns false at the oldest snapshot.
    pub fn undo(&mut self) -> bool {
        if !self.can_undo() {
            return false;
        }
        self.cursor -= 1;
        true
    }

    /// Step forward one snapshot. Returns false at the newest snapshot.
    pub fn redo(&mut self) -> bool {
        if !self.can_redo() {
            return false;
        }
        self.cursor += 1;
        true
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

/// Errors rejected by [`EditSession`] operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EditError {
    #[error("no clip with id {0}")]
    UnknownClip(String),

    #[error("split time {at} is not strictly inside clip {start}..{end}")]
    SplitOutOfRange { at: f64, start: f64, end: f64 },

    #[error("clip {0} is the last clip and has nothing to merge with")]
    NoNextClip(String),

    #[error("boundary index {0} does not separate two clips")]
    NoSuchBoundary(usize),

    #[error("boundary time {at} must lie strictly between {min} and {max}")]
    BoundaryOutOfRange { at: f64, min: f64, max: f64 },

    #[error("crop scale must be a finite value >= 1.0, got {0}")]
    InvalidScale(f64),

    #[error("analysis result violates the clip invariant: {0}")]
    Invariant(#[from] ClipInvariantError),
}

/// An editable view over a completed analysis.
#[derive(Debug, Clone)]
pub struct EditSession {
    base: AnalysisResult,
    history: History,
}

impl EditSession {
    /// Start editing a result. The result must satisfy the clip invariant.
    pub fn new(result: AnalysisResult) -> Result<Self, EditError> {
        result.validate()?;
        let history = History::new(result.clips.clone());
        Ok(Self {
            base: result,
            history,
        })
    }

    pub fn clips(&self) -> &[VideoClip] {
        self.history.current()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// The result with the current clip list applied.
    pub fn to_result(&self) -> AnalysisResult {
        let mut result = self.base.clone();
        result.clips = self.clips().to_vec();
        result
    }

    /// Move a clip's crop window, clamped to stay inside the safe area.
    pub fn move_crop(&mut self, clip_id: &str, position: Point<Frame>) -> Result<(), EditError> {
        let safe = self.base.safe_area;
        let crop_size = self.base.crop_region.size();
        let rel = clamp_crop_origin(safe.to_relative_point(position), safe.size(), crop_size);
        let clamped = safe.to_absolute_point(rel);

        self.edit(|clips| {
            let idx = index_of(clips, clip_id)?;
            clips[idx].set_crop_position(clamped, crop_size);
            clips[idx].source = ClipSource::Manual;
            Ok(())
        })
    }

    /// Split a clip in two at `at`. The new right half gets a fresh id.
    pub fn split(&mut self, clip_id: &str, at: f64) -> Result<String, EditError> {
        let mut new_id = String::new();
        self.edit(|clips| {
            let idx = index_of(clips, clip_id)?;
            let clip = &clips[idx];
            if at <= clip.start_time + TIME_EPSILON || at >= clip.end_time - TIME_EPSILON {
                return Err(EditError::SplitOutOfRange {
                    at,
                    start: clip.start_time,
                    end: clip.end_time,
                });
            }
            let mut right = clip.clone();
            right.id = uuid::Uuid::new_v4().to_string();
            right.start_time = at;
            right.source = ClipSource::Manual;
            new_id = right.id.clone();

            clips[idx].end_time = at;
            clips[idx].source = ClipSource::Manual;
            clips.insert(idx + 1, right);
            Ok(())
        })?;
        Ok(new_id)
    }

    /// Absorb the following clip, keeping this clip's framing.
    pub fn merge_with_next(&mut self, clip_id: &str) -> Result<(), EditError> {
        self.edit(|clips| {
            let idx = index_of(clips, clip_id)?;
            if idx + 1 >= clips.len() {
                return Err(EditError::NoNextClip(clip_id.to_string()));
            }
            let next = clips.remove(idx + 1);
            clips[idx].end_time = next.end_time;
            clips[idx].source = ClipSource::Manual;
            Ok(())
        })
    }

    /// Move the boundary between clip `index` and clip `index + 1`.
    pub fn resize_boundary(&mut self, index: usize, at: f64) -> Result<(), EditError> {
        self.edit(|clips| {
            if index + 1 >= clips.len() {
                return Err(EditError::NoSuchBoundary(index));
            }
            let min = clips[index].start_time;
            let max = clips[index + 1].end_time;
            if at <= min + TIME_EPSILON || at >= max - TIME_EPSILON {
                return Err(EditError::BoundaryOutOfRange { at, min, max });
            }
            clips[index].end_time = at;
            clips[index + 1].start_time = at;
            clips[index].source = ClipSource::Manual;
            clips[index + 1].source = ClipSource::Manual;
            Ok(())
        })
    }

    /// Set a clip's zoom factor.
    pub fn set_crop_scale(&mut self, clip_id: &str, scale: f64) -> Result<(), EditError> {
        if !scale.is_finite() || scale < 1.0 {
            return Err(EditError::InvalidScale(scale));
        }
        self.edit(|clips| {
            let idx = index_of(clips, clip_id)?;
            clips[idx].crop_scale = scale;
            clips[idx].source = ClipSource::Manual;
            Ok(())
        })
    }

    pub fn undo(&mut self) -> bool {
        self.history.undo()
    }

    pub fn redo(&mut self) -> bool {
        self.history.redo()
    }

    fn edit<F>(&mut self, apply: F) -> Result<(), EditError>
    where
        F: FnOnce(&mut Vec<VideoClip>) -> Result<(), EditError>,
    {
        let mut clips = self.clips().to_vec();
        apply(&mut clips)?;
        check_contiguous(&clips, self.base.duration_secs)?;
        self.history.push(clips);
        Ok(())
    }
}

fn index_of(clips: &[VideoClip], clip_id: &str) -> Result<usize, EditError> {
    clips
        .iter()
        .position(|c| c.id == clip_id)
        .ok_or_else(|| EditError::UnknownClip(clip_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisKey;
    use crate::detection::FramingStrategy;
    use crate::framing::{AspectRatio, CropRegion, CropStrategy};
    use crate::geometry::{Rect, SafeArea, Size};

    fn result_with(bounds: &[f64]) -> AnalysisResult {
        let safe_area = SafeArea::full_frame(Size::new(1920.0, 1080.0));
        let crop_region = CropRegion::centered(&safe_area, AspectRatio::VERTICAL);
        let clips = bounds
            .windows(2)
            .map(|w| {
                VideoClip::new(
                    w[0],
                    w[1],
                    FramingStrategy::Track,
                    crop_region.origin(),
                    crop_region.size(),
                )
            })
            .collect();
        AnalysisResult {
            key: AnalysisKey::new("src", AspectRatio::VERTICAL, CropStrategy::SmartCrop),
            clips,
            safe_area,
            target_aspect_ratio: AspectRatio::VERTICAL,
            crop_region,
            source_width: 1920.0,
            source_height: 1080.0,
            duration_secs: *bounds.last().unwrap(),
            sampled_frames: 0,
            failed_detections: 0,
        }
    }

    #[test]
    fn test_history_truncates_redo_branch() {
        let mut history = History::new(vec![]);
        history.push(vec![]);
        history.push(vec![]);
        assert_eq!(history.len(), 3);
        assert!(history.undo());
        assert!(history.undo());
        assert!(!history.undo());
        history.push(vec![]);
        assert_eq!(history.len(), 2);
        assert!(!history.can_redo());
    }

    #[test]
    fn test_history_depth_is_capped() {
        let mut history = History::with_depth(vec![], 3);
        for _ in 0..10 {
            history.push(vec![]);
        }
        assert_eq!(history.len(), 3);
        assert!(history.undo());
        assert!(history.undo());
        assert!(!history.undo());
    }

    #[test]
    fn test_split_then_undo_redo() {
        let mut session = EditSession::new(result_with(&[0.0, 10.0])).unwrap();
        let id = session.clips()[0].id.clone();
        let new_id = session.split(&id, 4.0).unwrap();

        assert_eq!(session.clips().len(), 2);
        assert_eq!(session.clips()[0].end_time, 4.0);
        assert_eq!(session.clips()[1].id, new_id);
        assert_eq!(session.clips()[1].source, ClipSource::Manual);

        assert!(session.undo());
        assert_eq!(session.clips().len(), 1);
        assert!(session.redo());
        assert_eq!(session.clips().len(), 2);
    }

    #[test]
    fn test_split_outside_clip_is_rejected() {
        let mut session = EditSession::new(result_with(&[0.0, 5.0, 10.0])).unwrap();
        let id = session.clips()[0].id.clone();
        assert!(matches!(
            session.split(&id, 5.0),
            Err(EditError::SplitOutOfRange { .. })
        ));
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn test_move_crop_is_clamped_to_safe_area() {
        let mut session = EditSession::new(result_with(&[0.0, 10.0])).unwrap();
        let id = session.clips()[0].id.clone();
        session.move_crop(&id, Point::new(5000.0, -50.0)).unwrap();

        let clip = &session.clips()[0];
        assert_eq!(clip.crop_position, Point::new(1920.0 - 606.0, 0.0));
        assert_eq!(clip.subject_center, Point::new(1920.0 - 303.0, 540.0));
    }

    #[test]
    fn test_move_crop_respects_letterboxed_safe_area() {
        let mut result = result_with(&[0.0, 10.0]);
        result.safe_area = SafeArea::new(Rect::new(0.0, 140.0, 1920.0, 800.0));
        result.crop_region = CropRegion::centered(&result.safe_area, AspectRatio::VERTICAL);
        let mut session = EditSession::new(result).unwrap();
        let id = session.clips()[0].id.clone();
        session.move_crop(&id, Point::new(0.0, 0.0)).unwrap();
        assert_eq!(session.clips()[0].crop_position.y, 140.0);
    }

    #[test]
    fn test_resize_boundary_keeps_contiguity() {
        let mut session = EditSession::new(result_with(&[0.0, 3.0, 10.0])).unwrap();
        session.resize_boundary(0, 6.5).unwrap();
        assert_eq!(session.clips()[0].end_time, 6.5);
        assert_eq!(session.clips()[1].start_time, 6.5);
        assert!(matches!(
            session.resize_boundary(0, 10.0),
            Err(EditError::BoundaryOutOfRange { .. })
        ));
        assert!(matches!(
            session.resize_boundary(1, 8.0),
            Err(EditError::NoSuchBoundary(1))
        ));
    }

    #[test]
    fn test_merge_with_next_keeps_earlier_framing() {
        let mut result = result_with(&[0.0, 3.0, 10.0]);
        result.clips[1].crop_position = Point::new(900.0, 0.0);
        let first_position = result.clips[0].crop_position;
        let mut session = EditSession::new(result).unwrap();
        let id = session.clips()[0].id.clone();
        session.merge_with_next(&id).unwrap();
        assert_eq!(session.clips().len(), 1);
        assert_eq!(session.clips()[0].crop_position, first_position);
        assert_eq!(session.clips()[0].end_time, 10.0);

        assert!(matches!(
            session.merge_with_next(&id),
            Err(EditError::NoNextClip(_))
        ));
    }

    #[test]
    fn test_crop_scale_validation() {
        let mut session = EditSession::new(result_with(&[0.0, 10.0])).unwrap();
        let id = session.clips()[0].id.clone();
        assert!(matches!(
            session.set_crop_scale(&id, 0.5),
            Err(EditError::InvalidScale(_))
        ));
        session.set_crop_scale(&id, 1.5).unwrap();
        assert_eq!(session.to_result().clips[0].crop_scale, 1.5);
    }

    #[test]
    fn test_invalid_result_is_rejected() {
        let mut result = result_with(&[0.0, 3.0, 10.0]);
        result.clips[1].start_time = 4.0;
        assert!(matches!(
            EditSession::new(result),
            Err(EditError::Invariant(_))
        ));
    }
}
