//! Settings for Panako
//!
//! TOML configuration for the engine launcher, manifest location and the
//! deep-query, expand and monitor defaults. Every field has a default, so an
//! empty or missing file is valid.

use crate::consolidation::{ConsolidationOptions, DEFAULT_GAP_TOLERANCE};
use crate::error::{CoreError, Result};
use crate::monitor::MonitorOptions;
use crate::segmentation::SegmentationConfig;
use panako_engine::{command::default_library_paths, EngineCommand, EngineError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding `engine.panako_dir`
pub const PANAKO_DIR_ENV: &str = "PANAKO_DIR";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub manifest: ManifestSettings,
    #[serde(default)]
    pub deep_query: DeepQuerySettings,
    #[serde(default)]
    pub expand: ExpandSettings,
    #[serde(default)]
    pub monitor: MonitorSettings,
}

/// Engine launcher configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineSettings {
    /// Panako checkout containing `build/libs/panako-*-all.jar`
    #[serde(default = "default_panako_dir")]
    pub panako_dir: String,
    #[serde(default = "default_java")]
    pub java: String,
    /// Directories searched for the LMDB native library
    #[serde(default = "default_library_paths_str")]
    pub library_paths: Vec<String>,
    /// Bound for blocking engine calls; 0 disables the limit
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Engine setting the match threshold maps to
    #[serde(default = "default_threshold_key")]
    pub threshold_key: String,
    /// Where the engine keeps its databases
    #[serde(default = "default_db_dir")]
    pub db_dir: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            panako_dir: default_panako_dir(),
            java: default_java(),
            library_paths: default_library_paths_str(),
            timeout_secs: default_timeout_secs(),
            threshold_key: default_threshold_key(),
            db_dir: default_db_dir(),
        }
    }
}

fn default_panako_dir() -> String {
    "~/Panako".to_string()
}
fn default_java() -> String {
    "java".to_string()
}
fn default_library_paths_str() -> Vec<String> {
    default_library_paths()
        .into_iter()
        .map(|p| p.display().to_string())
        .collect()
}
fn default_timeout_secs() -> u64 {
    600
}
fn default_threshold_key() -> String {
    panako_engine::DEFAULT_THRESHOLD_KEY.to_string()
}
fn default_db_dir() -> String {
    "~/.panako/dbs".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ManifestSettings {
    #[serde(default = "default_manifest_path")]
    pub path: String,
}

impl Default for ManifestSettings {
    fn default() -> Self {
        Self {
            path: default_manifest_path(),
        }
    }
}

fn default_manifest_path() -> String {
    "~/.panako/indexed_files.txt".to_string()
}

/// Segmented query defaults (also used per seed by expand)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeepQuerySettings {
    #[serde(default = "default_segment_length")]
    pub segment_length: f64,
    #[serde(default = "default_overlap")]
    pub overlap: f64,
    #[serde(default = "default_min_segments")]
    pub min_segments: usize,
    #[serde(default = "default_gap_tolerance")]
    pub gap_tolerance: f64,
}

impl Default for DeepQuerySettings {
    fn default() -> Self {
        Self {
            segment_length: default_segment_length(),
            overlap: default_overlap(),
            min_segments: default_min_segments(),
            gap_tolerance: default_gap_tolerance(),
        }
    }
}

fn default_segment_length() -> f64 {
    15.0
}
fn default_overlap() -> f64 {
    2.0
}
fn default_min_segments() -> usize {
    1
}
fn default_gap_tolerance() -> f64 {
    DEFAULT_GAP_TOLERANCE
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExpandSettings {
    /// Results found by fewer seeds are left out of the report
    #[serde(default = "default_min_seeds")]
    pub min_seeds: usize,
    /// Per-stem lists of paths already discovered
    #[serde(default = "default_known_dir")]
    pub known_dir: String,
}

impl Default for ExpandSettings {
    fn default() -> Self {
        Self {
            min_seeds: default_min_seeds(),
            known_dir: default_known_dir(),
        }
    }
}

fn default_min_seeds() -> usize {
    1
}
fn default_known_dir() -> String {
    "~/.panako/expand".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MonitorSettings {
    #[serde(default = "default_chunk_length")]
    pub chunk_length: u32,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            chunk_length: default_chunk_length(),
            chunk_overlap: default_chunk_overlap(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_chunk_length() -> u32 {
    25
}
fn default_chunk_overlap() -> u32 {
    5
}
fn default_poll_interval_ms() -> u64 {
    100
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => match dirs::home_dir() {
            Some(home) => home.join(rest.trim_start_matches('/')),
            None => PathBuf::from(path),
        },
        _ => PathBuf::from(path),
    }
}

impl Settings {
    /// Load configuration from TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
        Self::from_toml(&content)
            .map_err(|e| CoreError::configuration(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// `~/.panako/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".panako").join("config.toml"))
    }

    /// Load `explicit` if given, else the default file if it exists, else
    /// defaults; then apply environment overrides and validate.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let mut settings = match explicit {
            Some(path) => Self::load(path)?,
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(path) => {
                    log::debug!("Loading settings from {}", path.display());
                    Self::load(&path)?
                }
                None => Self::default(),
            },
        };
        settings.apply_env();
        settings.validate()?;
        Ok(settings)
    }

    pub fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var(PANAKO_DIR_ENV) {
            if !dir.trim().is_empty() {
                self.engine.panako_dir = dir;
            }
        }
    }

    /// Reject parameter combinations before any engine call.
    pub fn validate(&self) -> Result<()> {
        self.segmentation().validate()?;
        if self.deep_query.min_segments == 0 {
            return Err(CoreError::configuration("min_segments must be at least 1"));
        }
        if self.deep_query.gap_tolerance < 0.0 {
            return Err(CoreError::configuration("gap_tolerance must not be negative"));
        }
        if self.monitor.chunk_overlap >= self.monitor.chunk_length {
            return Err(CoreError::configuration(format!(
                "monitor overlap ({}s) must be shorter than the chunk length ({}s)",
                self.monitor.chunk_overlap, self.monitor.chunk_length
            )));
        }
        Ok(())
    }

    pub fn panako_dir(&self) -> PathBuf {
        expand_tilde(&self.engine.panako_dir)
    }

    pub fn manifest_path(&self) -> PathBuf {
        expand_tilde(&self.manifest.path)
    }

    pub fn db_dir(&self) -> PathBuf {
        expand_tilde(&self.engine.db_dir)
    }

    pub fn known_dir(&self) -> PathBuf {
        expand_tilde(&self.expand.known_dir)
    }

    pub fn timeout(&self) -> Option<Duration> {
        match self.engine.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// `java ... -jar panako-*-all.jar` for the configured checkout
    pub fn engine_command(&self) -> std::result::Result<EngineCommand, EngineError> {
        let candidates: Vec<PathBuf> = self
            .engine
            .library_paths
            .iter()
            .map(|p| expand_tilde(p))
            .collect();
        EngineCommand::java(&self.engine.java, &self.panako_dir(), &candidates)
    }

    pub fn segmentation(&self) -> SegmentationConfig {
        SegmentationConfig::new(self.deep_query.segment_length, self.deep_query.overlap)
    }

    pub fn consolidation(&self) -> ConsolidationOptions {
        ConsolidationOptions {
            min_segments: self.deep_query.min_segments,
            gap_tolerance: self.deep_query.gap_tolerance,
        }
    }

    pub fn monitor_options(&self) -> MonitorOptions {
        MonitorOptions {
            chunk_length: self.monitor.chunk_length,
            chunk_overlap: self.monitor.chunk_overlap,
            poll_interval: Duration::from_millis(self.monitor.poll_interval_ms.max(1)),
        }
    }
}
