//! Pipeline configuration, loadable from TOML.
//!
//! Every field has a default, so a config file only names what it changes:
//!
//! ```toml
//! input_dir = "data/holter"
//! window_seconds = 300.0
//!
//! [downsample]
//! phase = 0
//!
//! [features]
//! extended = false
//! ```

use crate::compare::ComparisonConfig;
use crate::error::ConfigError;
use crate::features::FeatureConfig;
use crate::io::beats::DEFAULT_SUFFIX;
use crate::metrics::window::Downsample;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub input_dir: PathBuf,
    /// Recordings are the files whose name ends with this
    pub suffix: String,
    pub window_seconds: f64,
    /// `None` keeps every window
    pub downsample: Option<Downsample>,
    pub features: FeatureConfig,
    pub comparison: ComparisonConfig,
    /// Columns with a larger NaN fraction are reported in the summary
    pub nan_heavy_threshold: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("data"),
            suffix: DEFAULT_SUFFIX.to_string(),
            window_seconds: 60.0,
            downsample: Some(Downsample::default()),
            features: FeatureConfig::default(),
            comparison: ComparisonConfig::default(),
            nan_heavy_threshold: 0.5,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.window_seconds.is_finite() && self.window_seconds > 0.0) {
            return Err(ConfigError::WindowDuration(self.window_seconds));
        }
        if let Some(plan) = &self.downsample {
            plan.validate()?;
        }
        Ok(())
    }
}
