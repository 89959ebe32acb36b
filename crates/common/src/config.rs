//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ReframeError, ReframeResult};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory where analysis projects are cached.
    pub cache_dir: PathBuf,

    /// Default analysis parameters.
    pub analysis: AnalysisDefaults,

    /// Default export parameters.
    pub export: ExportDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Tunables for the reframing analysis.
///
/// Pixel thresholds are absolute source pixels tuned for 1080p-class
/// footage unless `resolution_relative` is set, in which case they are
/// rescaled by `source_height / 1080`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisDefaults {
    /// Interval between detection samples (seconds).
    pub sample_interval_secs: f64,

    /// Minimum clip duration (seconds) for position-driven cuts and merging.
    pub min_clip_duration_secs: f64,

    /// Crop movement (pixels) that opens a new clip.
    pub cut_threshold_px: f64,

    /// Crop distance (pixels) below which neighbouring clips are flattened.
    pub similar_position_threshold_px: f64,

    /// Subjects wider than this fraction of the crop width force letterbox.
    pub letterbox_spread_ratio: f64,

    /// Upward framing bias as a fraction of the crop height.
    pub vertical_bias_ratio: f64,

    /// Scale pixel thresholds with the source resolution.
    pub resolution_relative: bool,
}

/// Default encoding parameters passed to the media engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    /// Output format identifier (`mp4-h264`, `mp4-h265`, `webm`).
    pub format: String,

    /// Constant rate factor.
    pub crf: u32,

    /// Encoder preset.
    pub preset: String,

    /// Audio bitrate in kbps.
    pub audio_bitrate_kbps: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "reframe=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            analysis: AnalysisDefaults::default(),
            export: ExportDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for AnalysisDefaults {
    fn default() -> Self {
        Self {
            sample_interval_secs: 0.5,
            min_clip_duration_secs: 1.0,
            cut_threshold_px: 100.0,
            similar_position_threshold_px: 100.0,
            letterbox_spread_ratio: 0.8,
            vertical_bias_ratio: 0.1,
            resolution_relative: false,
        }
    }
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            format: "mp4-h264".to_string(),
            crf: 23,
            preset: "medium".to_string(),
            audio_bitrate_kbps: 192,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Same configuration with the level raised to `debug` when verbose.
    pub fn with_verbosity(&self, verbose: bool) -> Self {
        let mut config = self.clone();
        if verbose {
            config.level = "debug".to_string();
        }
        config
    }
}

impl AnalysisDefaults {
    /// Check that every tunable is inside its usable range.
    pub fn validate(&self) -> ReframeResult<()> {
        if !self.sample_interval_secs.is_finite() || self.sample_interval_secs <= 0.0 {
            return Err(ReframeError::config("sample_interval_secs must be positive"));
        }
        if !self.min_clip_duration_secs.is_finite() || self.min_clip_duration_secs < 0.0 {
            return Err(ReframeError::config(
                "min_clip_duration_secs must not be negative",
            ));
        }
        let thresholds = [self.cut_threshold_px, self.similar_position_threshold_px];
        if thresholds.iter().any(|t| !t.is_finite() || *t < 0.0) {
            return Err(ReframeError::config("pixel thresholds must not be negative"));
        }
        if !self.letterbox_spread_ratio.is_finite() || self.letterbox_spread_ratio <= 0.0 {
            return Err(ReframeError::config("letterbox_spread_ratio must be positive"));
        }
        if !(0.0..=1.0).contains(&self.vertical_bias_ratio) {
            return Err(ReframeError::config(
                "vertical_bias_ratio must be between 0 and 1",
            ));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &Path) -> Self {
        Self::try_load_from(config_path).unwrap_or_else(|e| {
            tracing::warn!("{e}; using default configuration");
            Self::default()
        })
    }

    /// Load config from an explicit path. A missing file yields defaults;
    /// an unreadable or malformed one is an error.
    ///
    /// Callers that load config before logging is initialized use this and
    /// report the error once a subscriber exists.
    pub fn try_load_from(config_path: &Path) -> ReframeResult<Self> {
        if !config_path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(config_path).map_err(|e| {
            ReframeError::config(format!(
                "failed to read config at {}: {e}",
                config_path.display()
            ))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            ReframeError::config(format!(
                "failed to parse config at {}: {e}",
                config_path.display()
            ))
        })
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, config_path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("reframe").join("config.json")
}

/// Default analysis cache directory.
fn default_cache_dir() -> PathBuf {
    let base = std::env::var("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".cache")
        });
    base.join("reframe").join("analyses")
}
