//! Application Configuration
//!
//! Pipeline settings stored in TOML format.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::dedup::DedupConfig;
use crate::geometry::CameraSpec;
use crate::panorama::{PerspectivePreset, PerspectiveSet, SamplingMode};
use crate::vision::RecognitionConfig;

/// Application settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Which perspectives are rendered from the panorama
    pub perspectives: PerspectiveSettings,
    /// Cross-view duplicate resolution
    pub dedup: DedupConfig,
    /// OCR backend settings
    pub recognition: RecognitionConfig,
    /// Orchestrator behavior
    pub pipeline: PipelineSettings,
}

/// One camera of a custom ring, angles in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraSettings {
    pub horizontal_fov: f64,
    pub vertical_fov: f64,
    #[serde(default)]
    pub yaw: f64,
    #[serde(default)]
    pub pitch: f64,
}

impl From<CameraSettings> for CameraSpec {
    fn from(settings: CameraSettings) -> Self {
        CameraSpec::from_degrees(settings.horizontal_fov, settings.vertical_fov, settings.yaw, settings.pitch)
    }
}

/// Perspective rendering settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerspectiveSettings {
    /// Named camera ring, ignored when `cameras` is set
    pub preset: PerspectivePreset,
    /// Explicit camera ring, in adjacency order
    pub cameras: Option<Vec<CameraSettings>>,
    /// Rendered view width in pixels
    pub width: u32,
    /// Rendered view height in pixels
    pub height: u32,
    pub sampling: SamplingMode,
}

impl Default for PerspectiveSettings {
    fn default() -> Self {
        Self {
            preset: PerspectivePreset::Default,
            cameras: None,
            width: 1024,
            height: 1024,
            sampling: SamplingMode::Bilinear,
        }
    }
}

impl PerspectiveSettings {
    /// Build the perspective set these settings describe
    pub fn build(&self) -> crate::error::Result<PerspectiveSet> {
        match &self.cameras {
            Some(cameras) => PerspectiveSet::new(
                cameras.iter().copied().map(CameraSpec::from).collect(),
                self.width,
                self.height,
            ),
            None => PerspectiveSet::from_preset(self.preset, self.width, self.height),
        }
    }
}

/// Orchestrator settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Abort the run on the first failing view instead of continuing with partial results
    pub abort_on_view_error: bool,
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config {:?}", path))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Default location of the config file
pub fn default_config_path() -> Result<PathBuf> {
    Ok(crate::storage::get_config_dir()?.join("config.toml"))
}

/// Load an explicit config file, else the platform default if it exists,
/// else the built-in defaults
pub fn resolve_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        info!("Loading config from {:?}", path);
        return load_config(path);
    }

    let path = default_config_path()?;
    if path.exists() {
        info!("Loading config from {:?}", path);
        load_config(&path)
    } else {
        Ok(AppConfig::default())
    }
}
