//! Show project information.

use std::path::PathBuf;

use super::{load_project, print_clips};

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    let project = load_project(&path)?;

    println!("Project: {}", project.name);
    println!("  ID: {}", project.id);
    println!("  Version: {}", project.version);
    println!("  Created: {}", project.created_at);
    println!("  Modified: {}", project.modified_at);
    println!();

    let source = &project.source;
    println!("Source:");
    println!("  Path: {}", source.path.display());
    println!("  Fingerprint: {}", source.source_id);
    println!(
        "  Resolution: {}x{} ({:.1}s, audio: {})",
        source.width, source.height, source.duration_secs, source.has_audio
    );
    println!();

    if project.results.is_empty() {
        println!("No analyses stored.");
        return Ok(());
    }

    println!("Analyses:");
    for result in &project.results {
        print_clips(result);
        println!(
            "    sampled {} frame(s), {} detector failure(s)",
            result.sampled_frames, result.failed_detections
        );
    }

    Ok(())
}
