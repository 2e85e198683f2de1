//! Persisted tool settings
//!
//! Stores the mesh2vox integration between runs:
//! - Path to the mesh2vox script
//! - Python interpreter override
//! - Default mesh resolution

use crate::options::DEFAULT_MESH_RESOLUTION;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Settings stored in `<config_dir>/filetovox/settings.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Path to mesh2vox.py
    pub mesh2vox_script: Option<PathBuf>,
    /// Interpreter used to run the script (default: python3 or a venv next to it)
    pub mesh2vox_python: Option<String>,
    /// Voxels along the longest mesh axis
    #[serde(default = "default_mesh_resolution")]
    pub mesh_resolution: i32,
}

fn default_mesh_resolution() -> i32 {
    DEFAULT_MESH_RESOLUTION
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mesh2vox_script: None,
            mesh2vox_python: None,
            mesh_resolution: DEFAULT_MESH_RESOLUTION,
        }
    }
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("filetovox").join("settings.toml"))
    }

    /// Load settings, or return defaults if missing or unreadable
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "ignoring malformed settings");
                Self::default()
            }),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read settings");
                Self::default()
            }
        }
    }

    /// Save settings to the user config directory
    pub fn save(&self) -> Result<PathBuf, SettingsError> {
        let path = Self::config_path().ok_or(SettingsError::NoConfigDir)?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| SettingsError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
