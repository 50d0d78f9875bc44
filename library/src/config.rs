use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::DataflowError;
use crate::evaluation::Strategy;

/// Tunables of a single evaluator.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct EvalOptions {
    /// Fail with `CycleDetected` instead of reading a stale value when a
    /// vertex is reached again while still on the recursion stack.
    pub strict_cycles: bool,
    /// Discrete-time scheduler stops after this many cycles.
    pub max_cycles: u32,
    /// Log the duration of every top-level evaluation at info level.
    pub log_timing: bool,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            strict_cycles: false,
            max_cycles: 1000,
            log_timing: false,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(default)]
pub struct EngineSettings {
    pub strategy: Strategy,
    pub evaluation: EvalOptions,
}

impl EngineSettings {
    pub fn from_toml_str(text: &str) -> Result<Self, DataflowError> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml_string(&self) -> Result<String, DataflowError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, DataflowError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

/// `<config dir>/dataflow/settings.toml`, creating the directory if needed.
pub fn settings_path() -> Option<PathBuf> {
    let proj_dirs = ProjectDirs::from("org", "dataflow", "dataflow")?;
    let config_dir = proj_dirs.config_dir();
    if !config_dir.exists() {
        if let Err(e) = fs::create_dir_all(config_dir) {
            error!("Failed to create config directory: {}", e);
            return None;
        }
    }
    Some(config_dir.join("settings.toml"))
}

pub fn save_settings(settings: &EngineSettings) {
    if let Some(path) = settings_path() {
        match settings.to_toml_string() {
            Ok(text) => {
                if let Err(e) = fs::write(&path, text) {
                    error!("Failed to write settings file: {}", e);
                } else {
                    info!("Settings saved to {}", path.display());
                }
            }
            Err(e) => {
                error!("Failed to serialize settings: {}", e);
            }
        }
    }
}

pub fn load_settings() -> EngineSettings {
    if let Some(path) = settings_path() {
        if path.exists() {
            match EngineSettings::from_file(&path) {
                Ok(settings) => return settings,
                Err(e) => {
                    warn!("Failed to load settings file, using defaults: {}", e);
                }
            }
        }
    }
    EngineSettings::default()
}
