//! Project file: a source video plus every analysis run against it.
//!
//! Stored as a single pretty-printed JSON document. Results are keyed by
//! [`AnalysisKey::cache_id`] so revisiting a (ratio, strategy) pair reuses
//! the stored clips instead of re-running detection.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::analysis::{AnalysisKey, AnalysisResult};
use crate::geometry::Size;

/// Current schema version.
pub const PROJECT_VERSION: &str = "1.0";

/// Identity and geometry of the source video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMedia {
    /// Path to the source file as given by the user.
    pub path: PathBuf,

    /// Stable fingerprint of the file (see [`SourceMedia::fingerprint`]).
    pub source_id: String,

    pub width: f64,
    pub height: f64,
    pub duration_secs: f64,

    /// Whether the source carries an audio stream.
    #[serde(default = "default_true")]
    pub has_audio: bool,
}

fn default_true() -> bool {
    true
}

impl SourceMedia {
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// FNV-1a over the path, byte length and modification time.
    ///
    /// Falls back to the path alone when the file cannot be inspected.
    pub fn fingerprint(path: &Path) -> String {
        let mut input = path.display().to_string();
        if let Ok(meta) = std::fs::metadata(path) {
            input.push_str(&format!("|{}", meta.len()));
            if let Ok(modified) = meta.modified() {
                if let Ok(since) = modified.duration_since(std::time::UNIX_EPOCH) {
                    input.push_str(&format!("|{}", since.as_nanos()));
                }
            }
        }
        format!("{:016x}", fnv1a_64(&input))
    }
}

fn fnv1a_64(input: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in input.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Top-level project document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectFile {
    /// Schema version.
    pub version: String,

    /// Human-readable project name.
    pub name: String,

    /// Unique project identifier (UUID).
    pub id: String,

    /// Creation timestamp (ISO 8601).
    pub created_at: String,

    /// Last modified timestamp (ISO 8601).
    pub modified_at: String,

    pub source: SourceMedia,

    /// Stored analyses, one per cache key.
    #[serde(default)]
    pub results: Vec<AnalysisResult>,
}

impl ProjectFile {
    /// Create an empty project for a source.
    pub fn new(name: impl Into<String>, source: SourceMedia) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            version: PROJECT_VERSION.to_string(),
            name: name.into(),
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now.clone(),
            modified_at: now,
            source,
            results: Vec::new(),
        }
    }

    /// Stored result for a key, if any.
    pub fn result(&self, key: &AnalysisKey) -> Option<&AnalysisResult> {
        let id = key.cache_id();
        self.results.iter().find(|r| r.key.cache_id() == id)
    }

    /// Insert or replace the result for its key.
    pub fn upsert_result(&mut self, result: AnalysisResult) {
        let id = result.key.cache_id();
        match self.results.iter_mut().find(|r| r.key.cache_id() == id) {
            Some(existing) => *existing = result,
            None => self.results.push(result),
        }
        self.touch();
    }

    /// Drop every stored result (e.g. after the source changed).
    pub fn invalidate_results(&mut self) {
        self.results.clear();
        self.touch();
    }

    fn touch(&mut self) {
        self.modified_at = chrono::Utc::now().to_rfc3339();
    }

    /// Load a project document.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ProjectError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let project: ProjectFile =
            serde_json::from_str(&json).map_err(|e| ProjectError::ParseError {
                path: path.to_path_buf(),
                source: e,
            })?;

        for result in &project.results {
            result
                .validate()
                .map_err(|e| ProjectError::ValidationError {
                    message: format!("{}: {e}", result.key.cache_id()),
                })?;
        }

        Ok(project)
    }

    /// Save the project document, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ProjectError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ProjectError::IoError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| ProjectError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        std::fs::write(path, json).map_err(|e| ProjectError::IoError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Errors that can occur when working with projects.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid project: {message}")]
    ValidationError { message: String },
}
