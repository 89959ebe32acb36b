pub mod analyze;
pub mod batch;
pub mod check;
pub mod edit;
pub mod export;
pub mod info;

use std::path::Path;

use reframe_project_model::analysis::{AnalysisKey, AnalysisResult};
use reframe_project_model::framing::{AspectRatio, CropStrategy};
use reframe_project_model::geometry::Size;
use reframe_project_model::ProjectFile;
use reframe_render_engine::{build_recipe, rescale_clips, ExportRecipe, TargetSize};

/// Load a project file with a readable error.
pub fn load_project(path: &Path) -> anyhow::Result<ProjectFile> {
    ProjectFile::load(path).map_err(|e| anyhow::anyhow!("Failed to load project: {e}"))
}

/// Stored result for (ratio, strategy) in a project.
pub fn find_result<'a>(
    project: &'a ProjectFile,
    ratio: AspectRatio,
    strategy: CropStrategy,
) -> anyhow::Result<&'a AnalysisResult> {
    let key = AnalysisKey::new(project.source.source_id.clone(), ratio, strategy);
    project.result(&key).ok_or_else(|| {
        anyhow::anyhow!(
            "No {strategy} analysis for {ratio} in project; run `reframe analyze` first"
        )
    })
}

/// Build the export recipe for a stored result. Results analysed on a proxy
/// of a different size are mapped onto the project's source first.
pub fn recipe_for(
    project: &ProjectFile,
    result: &AnalysisResult,
    target: TargetSize,
) -> anyhow::Result<ExportRecipe> {
    let analysed = result.source_size();
    let source = Size::new(project.source.width, project.source.height);
    let crop = result.crop_region.size();
    let recipe = if analysed == source {
        build_recipe(&result.clips, target, result.strategy(), Some(crop), result.duration_secs)?
    } else {
        tracing::debug!(
            from = ?analysed,
            to = ?source,
            "Rescaling clips analysed at a different resolution"
        );
        let clips = rescale_clips(&result.clips, analysed, source);
        let crop = Size::new(
            crop.width * source.width / analysed.width,
            crop.height * source.height / analysed.height,
        );
        build_recipe(&clips, target, result.strategy(), Some(crop), result.duration_secs)?
    };
    Ok(recipe)
}

/// Parse comma-separated numbers such as `0,140,1920,800`.
pub fn parse_numbers<const N: usize>(raw: &str, what: &str) -> anyhow::Result<[f64; N]> {
    let values = raw
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| anyhow::anyhow!("Invalid {what} '{raw}': {e}"))?;
    values
        .try_into()
        .map_err(|v: Vec<f64>| anyhow::anyhow!("{what} needs {N} values, got {}", v.len()))
}

pub fn print_clips(result: &AnalysisResult) {
    println!(
        "  {} ({}): {} clip(s), crop {}x{}",
        result.target_aspect_ratio,
        result.strategy(),
        result.clips.len(),
        result.crop_region.width,
        result.crop_region.height
    );
    for (idx, clip) in result.clips.iter().enumerate() {
        println!(
            "    #{idx:<3} {:>8.2}s - {:>8.2}s  {:<9}  crop at ({:.0}, {:.0})  scale {:.2}  {:?}  [{}]",
            clip.start_time,
            clip.end_time,
            if clip.use_full_frame { "letterbox" } else { "track" },
            clip.crop_position.x,
            clip.crop_position.y,
            clip.crop_scale,
            clip.source,
            clip.id,
        );
    }
}
