//! Configuration file support.
//!
//! Reads JSON from the path in `RUSTY_MALDI_CONFIG`, or `rusty-maldi.json`
//! in the working directory. Anything missing falls back to defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::params::{ParameterConfig, ParameterMode, ProcessingParameters};

pub const CONFIG_ENV: &str = "RUSTY_MALDI_CONFIG";
pub const CONFIG_FILE: &str = "rusty-maldi.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    /// Initial manual parameter values.
    pub parameters: ProcessingParameters,
    /// Start in auto-estimate mode.
    pub auto_parameters: bool,
    pub preview: PreviewConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            parameters: ProcessingParameters::default(),
            auto_parameters: true,
            preview: PreviewConfig::default(),
        }
    }
}

/// How to reach the external statistics engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Script interpreter, looked up on `PATH` unless absolute.
    pub interpreter: String,
    /// Extra arguments placed before the script path.
    pub args: Vec<String>,
    /// Argument for the preflight version query.
    pub version_arg: String,
    pub timeout_secs: u64,
    pub preflight_timeout_secs: u64,
    /// Parent directory for per-run scratch directories (system temp if unset).
    pub scratch_root: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interpreter: "Rscript".to_string(),
            args: Vec::new(),
            version_arg: "--version".to_string(),
            timeout_secs: 600,
            preflight_timeout_secs: 5,
            scratch_root: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Rows shown in the table view before the user changes the cap.
    pub default_rows: usize,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self { default_rows: 5 }
    }
}

impl AppConfig {
    /// Load the config file if there is one, otherwise defaults.
    pub fn load() -> Self {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
        if !path.exists() {
            log::info!("No configuration file at {}. Using defaults.", path.display());
            return Self::default();
        }
        match Self::from_path(&path) {
            Ok(cfg) => {
                log::info!("Loaded configuration from: {}", path.display());
                cfg
            }
            Err(e) => {
                log::warn!("Failed to load config '{}': {e:#}. Using defaults.", path.display());
                Self::default()
            }
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).context("reading config file")?;
        let mut cfg: AppConfig = serde_json::from_str(&text).context("parsing config JSON")?;
        cfg.parameters.clamp();
        Ok(cfg)
    }

    pub fn parameter_config(&self) -> ParameterConfig {
        let mode = if self.auto_parameters {
            ParameterMode::Auto
        } else {
            ParameterMode::Manual
        };
        ParameterConfig::new(mode, self.parameters)
    }
}
