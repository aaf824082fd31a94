//! Analysis configuration, loaded from JSON with per-field defaults.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::numeric::BaselineParams;
use crate::render::heatmap::HeatMapSettings;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Pixels below this SNR are excluded
    pub snr_threshold: f64,
    /// Plot every rejected spectrum into `rejected/`
    pub save_rejected: bool,
    pub baseline: BaselineParams,
    pub histogram_bins: usize,
    /// Starting display settings for every heatmap
    pub heatmap: HeatMapSettings,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            snr_threshold: 15.0,
            save_rejected: false,
            baseline: BaselineParams::default(),
            histogram_bins: 10,
            heatmap: HeatMapSettings::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        log::info!("Loaded analysis config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
