// Engine configuration
// JSON-loadable settings with defaults for every field

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::analysis::AnalysisSettings;
use crate::audio::OnsetConfig;
use crate::groove::TempoConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Name of the library directory looked up under the data dirs and the working directory
const LIBRARY_DIR: &str = "Grooves";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Pattern library root; searched for when unset
    pub library_root: Option<PathBuf>,

    pub sample_rate: f64,

    /// Internal clock tempo when no preview override is set
    pub preview_bpm: f64,

    pub looping: bool,

    /// Ranked matches kept per analysis
    pub max_matches: usize,

    pub onsets: OnsetConfig,
    pub tempo: TempoConfig,

    /// Export directory; the platform data dir when unset
    pub export_dir: Option<PathBuf>,

    /// Exports older than this are removed when the engine starts
    pub export_max_age_secs: u64,

    /// JSONL trace of analysis runs
    pub analysis_trace: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            library_root: None,
            sample_rate: 44100.0,
            preview_bpm: 120.0,
            looping: true,
            max_matches: 15,
            onsets: OnsetConfig::default(),
            tempo: TempoConfig::default(),
            export_dir: None,
            export_max_age_secs: 3600,
            analysis_trace: None,
        }
    }
}

impl EngineConfig {
    pub fn from_json(bytes: &[u8]) -> Result<Self, ConfigError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path)?;
        let config = Self::from_json(&bytes)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn export_max_age(&self) -> Duration {
        Duration::from_secs(self.export_max_age_secs)
    }

    pub fn analysis_settings(&self) -> AnalysisSettings {
        AnalysisSettings {
            tempo: self.tempo.clone(),
            onsets: self.onsets.clone(),
            max_matches: self.max_matches,
            trace_path: self.analysis_trace.clone(),
        }
    }
}

/// Library locations searched when no root is configured, in priority order
pub fn library_root_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(data_dir) = dirs::data_dir() {
        candidates.push(data_dir.join("groovedeck").join(LIBRARY_DIR));
    }
    if let Some(home) = dirs::home_dir() {
        let local = home.join(".local").join("share").join("groovedeck").join(LIBRARY_DIR);
        if !candidates.contains(&local) {
            candidates.push(local);
        }
    }
    candidates.push(PathBuf::from(LIBRARY_DIR));
    candidates
}

/// First candidate that exists and holds at least one sub-directory
pub fn first_library_root(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates
        .iter()
        .find(|dir| {
            std::fs::read_dir(dir)
                .map(|entries| entries.flatten().any(|entry| entry.path().is_dir()))
                .unwrap_or(false)
        })
        .cloned()
}

/// Search the default locations for a pattern library
pub fn resolve_library_root() -> Option<PathBuf> {
    let root = first_library_root(&library_root_candidates());
    match &root {
        Some(path) => log::info!("Using pattern library at {}", path.display()),
        None => log::warn!("No pattern library found"),
    }
    root
}
