//! Check media tool availability and configuration.

use reframe_common::config::{config_file_path, AppConfig};
use reframe_render_engine::ffmpeg::command_exists;

pub fn run() -> anyhow::Result<()> {
    println!("Reframe System Check");
    println!("{}", "=".repeat(50));

    let mut all_ok = true;
    for tool in ["ffmpeg", "ffprobe"] {
        if command_exists(tool) {
            println!("[OK] {tool} found");
        } else {
            println!("[MISSING] {tool} not found in PATH");
            all_ok = false;
        }
    }

    let path = config_file_path();
    let config = AppConfig::load_from(&path);
    if path.exists() {
        println!("[OK] Config: {}", path.display());
    } else {
        println!("[OK] Config: defaults ({} not present)", path.display());
    }
    match config.analysis.validate() {
        Ok(()) => println!("[OK] Analysis settings valid"),
        Err(e) => {
            println!("[WARN] {e}");
            all_ok = false;
        }
    }
    println!("     Cache directory: {}", config.cache_dir.display());

    println!();
    if all_ok {
        println!("Reframe is ready.");
    } else {
        println!("Some checks failed. See above for details.");
    }
    Ok(())
}
