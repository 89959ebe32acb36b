//! Hand edits on a stored analysis.

use std::path::PathBuf;

use clap::Subcommand;

use reframe_processing_core::AnalysisRegistry;
use reframe_project_model::analysis::AnalysisResult;
use reframe_project_model::framing::{AspectRatio, CropStrategy};
use reframe_project_model::geometry::Point;
use reframe_project_model::history::EditSession;

use super::{find_result, load_project, print_clips};

#[derive(Subcommand, Debug, Clone)]
pub enum EditOp {
    /// Move a clip's crop window (top-left, source pixels)
    Move { clip: String, x: f64, y: f64 },

    /// Split a clip in two at a time in seconds
    Split { clip: String, at: f64 },

    /// Merge a clip with the one after it
    Merge { clip: String },

    /// Move the boundary after clip INDEX to a new time
    Boundary { index: usize, at: f64 },

    /// Zoom into a clip's crop window (>= 1.0)
    Zoom { clip: String, scale: f64 },
}

/// Resolve a clip reference: a full id, an id prefix, or `#INDEX`.
fn resolve_clip(session: &EditSession, reference: &str) -> anyhow::Result<String> {
    let clips = session.clips();
    if let Some(index) = reference.strip_prefix('#') {
        let index: usize = index.parse()?;
        return clips
            .get(index)
            .map(|clip| clip.id.clone())
            .ok_or_else(|| anyhow::anyhow!("No clip #{index} (have {})", clips.len()));
    }

    let matches: Vec<&str> = clips
        .iter()
        .map(|clip| clip.id.as_str())
        .filter(|id| id.starts_with(reference))
        .collect();
    match matches.as_slice() {
        [id] => Ok((*id).to_string()),
        [] => anyhow::bail!("No clip with id '{reference}'"),
        _ => anyhow::bail!("Clip id '{reference}' is ambiguous"),
    }
}

fn apply(session: &mut EditSession, op: &EditOp) -> anyhow::Result<()> {
    match op {
        EditOp::Move { clip, x, y } => {
            let id = resolve_clip(session, clip)?;
            session.move_crop(&id, Point::new(*x, *y))?;
        }
        EditOp::Split { clip, at } => {
            let id = resolve_clip(session, clip)?;
            let new_id = session.split(&id, *at)?;
            println!("  New clip: {new_id}");
        }
        EditOp::Merge { clip } => {
            let id = resolve_clip(session, clip)?;
            session.merge_with_next(&id)?;
        }
        EditOp::Boundary { index, at } => session.resize_boundary(*index, *at)?,
        EditOp::Zoom { clip, scale } => {
            let id = resolve_clip(session, clip)?;
            session.set_crop_scale(&id, *scale)?;
        }
    }
    Ok(())
}

/// Apply one edit and commit it through a registry holding `result`, so the
/// edited clips pass the same checks as any other committed edit.
fn edit_result(result: AnalysisResult, op: &EditOp) -> anyhow::Result<AnalysisResult> {
    let registry = AnalysisRegistry::new();
    let key = result.key.clone();
    registry.insert_completed(result.clone())?;

    let mut session = EditSession::new(result)?;
    apply(&mut session, op)?;
    tracing::info!(op = ?op, clips = session.clips().len(), "Applied edit");

    let committed = registry.commit_edits(&key, session.clips().to_vec())?;
    Ok(AnalysisResult::clone(&committed))
}

pub fn run(
    project_path: PathBuf,
    ratio: AspectRatio,
    strategy: CropStrategy,
    op: EditOp,
) -> anyhow::Result<()> {
    let mut project = load_project(&project_path)?;
    let result = find_result(&project, ratio, strategy)?.clone();

    let edited = edit_result(result, &op)?;
    print_clips(&edited);
    project.upsert_result(edited);
    project
        .save(&project_path)
        .map_err(|e| anyhow::anyhow!("Failed to save project: {e}"))?;
    println!("Project saved to: {}", project_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reframe_project_model::analysis::AnalysisKey;
    use reframe_project_model::clip::VideoClip;
    use reframe_project_model::detection::FramingStrategy;
    use reframe_project_model::framing::CropRegion;
    use reframe_project_model::geometry::{SafeArea, Size};

    fn single_clip_result(duration: f64) -> AnalysisResult {
        let key = AnalysisKey::new("src", AspectRatio::VERTICAL, CropStrategy::SmartCrop);
        let safe_area = SafeArea::full_frame(Size::new(1920.0, 1080.0));
        let crop_region = CropRegion::centered(&safe_area, key.aspect_ratio);
        AnalysisResult {
            clips: vec![VideoClip::new(
                0.0,
                duration,
                FramingStrategy::Track,
                crop_region.origin(),
                crop_region.size(),
            )],
            target_aspect_ratio: key.aspect_ratio,
            key,
            safe_area,
            crop_region,
            source_width: 1920.0,
            source_height: 1080.0,
            duration_secs: duration,
            sampled_frames: 0,
            failed_detections: 0,
        }
    }

    #[test]
    fn test_split_by_index_commits_contiguous_clips() {
        let edited = edit_result(
            single_clip_result(6.0),
            &EditOp::Split {
                clip: "#0".to_string(),
                at: 2.5,
            },
        )
        .unwrap();
        assert_eq!(edited.clips.len(), 2);
        assert_eq!(edited.clips[0].end_time, 2.5);
        assert_eq!(edited.clips[1].start_time, 2.5);
        assert_eq!(edited.clips[1].end_time, 6.0);
        assert!(edited.validate().is_ok());
    }

    #[test]
    fn test_unknown_clip_reference_is_rejected() {
        let err = edit_result(
            single_clip_result(6.0),
            &EditOp::Merge {
                clip: "#3".to_string(),
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("No clip #3"));
    }
}
