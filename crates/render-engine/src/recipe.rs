//! Export recipes: per-clip trim and crop/scale/pad plans.
//!
//! A recipe is engine-agnostic; [`crate::ffmpeg`] translates it into
//! filter graphs.

use serde::{Deserialize, Serialize};

use reframe_common::{ReframeError, ReframeResult};
use reframe_project_model::clip::{VideoClip, TIME_EPSILON};
use reframe_project_model::framing::{AspectRatio, CropStrategy};
use reframe_project_model::geometry::Size;

/// Output frame size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetSize {
    pub width: u32,
    pub height: u32,
}

impl TargetSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Even-sized output of `ratio` whose longer edge is `long_edge`.
    pub fn for_ratio(ratio: AspectRatio, long_edge: u32) -> Self {
        let long = f64::from(long_edge);
        let (w, h) = if ratio.width >= ratio.height {
            (long, long * f64::from(ratio.height) / f64::from(ratio.width))
        } else {
            (long * f64::from(ratio.width) / f64::from(ratio.height), long)
        };
        Self::new(even_px(w), even_px(h))
    }

    pub fn as_size(&self) -> Size {
        Size::new(f64::from(self.width), f64::from(self.height))
    }
}

/// Round to the nearest pixel, then down to an even count (minimum 2).
fn even_px(v: f64) -> u32 {
    let v = v.round().max(2.0) as u32;
    v - v % 2
}

/// One video transform, applied in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum VideoOp {
    Crop {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    /// Stretch to exactly this size.
    Scale { width: u32, height: u32 },
    /// Scale preserving aspect so the frame fits inside this size.
    ScaleToFit { width: u32, height: u32 },
    /// Center on a black canvas of this size.
    Pad { width: u32, height: u32 },
}

/// Source time range of a stage, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trim {
    pub start: f64,
    pub end: f64,
}

impl Trim {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// One contiguous piece of the output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeStage {
    /// `None` means the whole source.
    pub trim: Option<Trim>,
    pub ops: Vec<VideoOp>,
}

/// Complete export plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExportRecipe {
    Single { stage: RecipeStage },
    /// Stages are concatenated in order, video and audio separately.
    Concat { stages: Vec<RecipeStage> },
}

impl ExportRecipe {
    pub fn stages(&self) -> &[RecipeStage] {
        match self {
            Self::Single { stage } => std::slice::from_ref(stage),
            Self::Concat { stages } => stages,
        }
    }
}

/// Build the recipe for rendering `clips` at `target`.
///
/// `source_region` is the crop window size the analysis used. When it
/// differs from `target` the window is cropped at that size and scaled;
/// otherwise the target size is cropped directly.
pub fn build_recipe(
    clips: &[VideoClip],
    target: TargetSize,
    strategy: CropStrategy,
    source_region: Option<Size>,
    duration_secs: f64,
) -> ReframeResult<ExportRecipe> {
    if clips.is_empty() {
        return Err(ReframeError::render("cannot build a recipe without clips"));
    }

    let stage_for = |clip: &VideoClip, trim: Option<Trim>| RecipeStage {
        trim,
        ops: clip_ops(clip, target, strategy, source_region),
    };

    let recipe = match clips {
        [only] => {
            let spans_source = only.start_time.abs() <= TIME_EPSILON
                && (only.end_time - duration_secs).abs() <= TIME_EPSILON;
            let trim = (!spans_source).then_some(Trim {
                start: only.start_time,
                end: only.end_time,
            });
            ExportRecipe::Single {
                stage: stage_for(only, trim),
            }
        }
        _ => ExportRecipe::Concat {
            stages: clips
                .iter()
                .map(|clip| {
                    stage_for(
                        clip,
                        Some(Trim {
                            start: clip.start_time,
                            end: clip.end_time,
                        }),
                    )
                })
                .collect(),
        },
    };

    tracing::debug!(
        stages = recipe.stages().len(),
        width = target.width,
        height = target.height,
        strategy = %strategy,
        "Built export recipe"
    );
    Ok(recipe)
}

fn fit_and_pad(target: TargetSize) -> Vec<VideoOp> {
    vec![
        VideoOp::ScaleToFit {
            width: target.width,
            height: target.height,
        },
        VideoOp::Pad {
            width: target.width,
            height: target.height,
        },
    ]
}

fn clip_ops(
    clip: &VideoClip,
    target: TargetSize,
    strategy: CropStrategy,
    source_region: Option<Size>,
) -> Vec<VideoOp> {
    if strategy == CropStrategy::CenterCrop || clip.use_full_frame {
        return fit_and_pad(target);
    }

    let target_size = target.as_size();
    let window = source_region.unwrap_or(target_size);
    let needs_scale = window != target_size || clip.crop_scale > 1.0;

    // Zoom shrinks the window about its center.
    let scale = clip.crop_scale.max(1.0);
    let width = even_px(window.width / scale);
    let height = even_px(window.height / scale);
    let x = clip.crop_position.x + (window.width - f64::from(width)) / 2.0;
    let y = clip.crop_position.y + (window.height - f64::from(height)) / 2.0;

    let mut ops = vec![VideoOp::Crop {
        x: x.round().max(0.0) as u32,
        y: y.round().max(0.0) as u32,
        width,
        height,
    }];
    if needs_scale {
        ops.push(VideoOp::Scale {
            width: target.width,
            height: target.height,
        });
    }
    ops
}

/// Map crop positions analysed at `from` onto a source of size `to`.
pub fn rescale_clips(clips: &[VideoClip], from: Size, to: Size) -> Vec<VideoClip> {
    if from.width <= 0.0 || from.height <= 0.0 {
        return clips.to_vec();
    }
    let sx = to.width / from.width;
    let sy = to.height / from.height;
    clips
        .iter()
        .map(|clip| {
            let mut clip = clip.clone();
            clip.crop_position.x *= sx;
            clip.crop_position.y *= sy;
            clip.subject_center.x *= sx;
            clip.subject_center.y *= sy;
            clip
        })
        .collect()
}

/// Targets sharing one output size; `members` index into the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchGroup {
    pub size: TargetSize,
    pub members: Vec<usize>,
}

impl BatchGroup {
    /// The member whose recipe is rendered; the rest receive copies.
    pub fn primary(&self) -> usize {
        self.members[0]
    }
}

/// Group targets by identical output size, in first-seen order.
pub fn plan_batch(targets: &[TargetSize]) -> Vec<BatchGroup> {
    let mut groups: Vec<BatchGroup> = Vec::new();
    for (idx, size) in targets.iter().enumerate() {
        match groups.iter_mut().find(|g| g.size == *size) {
            Some(group) => group.members.push(idx),
            None => groups.push(BatchGroup {
                size: *size,
                members: vec![idx],
            }),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use reframe_project_model::detection::FramingStrategy;
    use reframe_project_model::geometry::Point;

    fn clip(start: f64, end: f64, x: f64, strategy: FramingStrategy) -> VideoClip {
        VideoClip::new(
            start,
            end,
            strategy,
            Point::new(x, 0.0),
            Size::new(606.0, 1080.0),
        )
    }

    const TARGET: TargetSize = TargetSize {
        width: 1080,
        height: 1920,
    };

    #[test]
    fn test_target_for_ratio() {
        assert_eq!(TargetSize::for_ratio(AspectRatio::VERTICAL, 1920), TargetSize::new(1080, 1920));
        assert_eq!(TargetSize::for_ratio(AspectRatio::SQUARE, 1080), TargetSize::new(1080, 1080));
        assert_eq!(TargetSize::for_ratio(AspectRatio::PORTRAIT, 1350), TargetSize::new(1080, 1350));
    }

    #[test]
    fn test_single_full_clip_is_untrimmed() {
        let clips = [clip(0.0, 10.0, 657.0, FramingStrategy::Track)];
        let recipe = build_recipe(
            &clips,
            TARGET,
            CropStrategy::SmartCrop,
            Some(Size::new(606.0, 1080.0)),
            10.0,
        )
        .unwrap();
        let ExportRecipe::Single { stage } = recipe else {
            panic!("expected a single stage");
        };
        assert_eq!(stage.trim, None);
        assert_eq!(
            stage.ops,
            vec![
                VideoOp::Crop {
                    x: 657,
                    y: 0,
                    width: 606,
                    height: 1080
                },
                VideoOp::Scale {
                    width: 1080,
                    height: 1920
                },
            ]
        );
    }

    #[test]
    fn test_single_partial_clip_is_trimmed() {
        let clips = [clip(0.0, 6.0, 0.0, FramingStrategy::Track)];
        let recipe = build_recipe(&clips, TARGET, CropStrategy::SmartCrop, None, 10.0).unwrap();
        assert_eq!(
            recipe.stages()[0].trim,
            Some(Trim {
                start: 0.0,
                end: 6.0
            })
        );
        // Window equals the target: crop only.
        assert_eq!(recipe.stages()[0].ops.len(), 1);
    }

    #[test]
    fn test_multiple_clips_concat_in_order() {
        let clips = [
            clip(0.0, 5.0, 100.0, FramingStrategy::Track),
            clip(5.0, 8.0, 0.0, FramingStrategy::Letterbox),
            clip(8.0, 12.0, 900.0, FramingStrategy::Track),
        ];
        let recipe = build_recipe(
            &clips,
            TARGET,
            CropStrategy::SmartCrop,
            Some(Size::new(606.0, 1080.0)),
            12.0,
        )
        .unwrap();
        let ExportRecipe::Concat { stages } = recipe else {
            panic!("expected concat");
        };
        assert_eq!(stages.len(), 3);
        assert_eq!(stages[1].trim.map(|t| t.duration()), Some(3.0));
        assert!(matches!(stages[1].ops[0], VideoOp::ScaleToFit { .. }));
        assert!(matches!(stages[2].ops[0], VideoOp::Crop { x: 900, .. }));
    }

    #[test]
    fn test_center_crop_ignores_positions() {
        let clips = [clip(0.0, 4.0, 321.0, FramingStrategy::Track)];
        let recipe = build_recipe(&clips, TARGET, CropStrategy::CenterCrop, None, 4.0).unwrap();
        assert_eq!(recipe.stages()[0].ops, fit_and_pad(TARGET));
    }

    #[test]
    fn test_crop_scale_shrinks_window_about_center() {
        let mut zoomed = clip(0.0, 4.0, 100.0, FramingStrategy::Track);
        zoomed.crop_scale = 2.0;
        let recipe = build_recipe(
            &[zoomed],
            TARGET,
            CropStrategy::SmartCrop,
            Some(Size::new(606.0, 1080.0)),
            4.0,
        )
        .unwrap();
        assert_eq!(
            recipe.stages()[0].ops[0],
            VideoOp::Crop {
                x: 252,
                y: 270,
                width: 302,
                height: 540
            }
        );
    }

    #[test]
    fn test_empty_clips_rejected() {
        assert!(build_recipe(&[], TARGET, CropStrategy::SmartCrop, None, 1.0).is_err());
    }

    #[test]
    fn test_rescale_clips_maps_proxy_positions() {
        let clips = [clip(0.0, 1.0, 320.0, FramingStrategy::Track)];
        let scaled = rescale_clips(&clips, Size::new(960.0, 540.0), Size::new(1920.0, 1080.0));
        assert_eq!(scaled[0].crop_position.x, 640.0);
        assert_eq!(scaled[0].id, clips[0].id);
    }

    #[test]
    fn test_plan_batch_groups_identical_sizes() {
        let targets = [
            TargetSize::new(1080, 1920),
            TargetSize::new(1080, 1080),
            TargetSize::new(1080, 1920),
        ];
        let groups = plan_batch(&targets);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].members, vec![0, 2]);
        assert_eq!(groups[0].primary(), 0);
        assert_eq!(groups[1].members, vec![1]);
    }
}
