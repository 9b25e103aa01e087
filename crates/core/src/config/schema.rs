//! Configuration schema definitions
//!
//! Section types reuse the conversion crate's option structs where the
//! shapes line up, so a `covert.toml` maps directly onto runtime settings.

use covert_image::{ConvertOptions, DEFAULT_QUALITY, OptimizeSettings, OutputFormat};
use serde::{Deserialize, Serialize};

pub use covert_image::{CodecOptions, Limits};

/// Root configuration schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConfigSchema {
    /// Output format and quality
    #[serde(default)]
    pub convert: ConvertSection,

    /// Size optimization
    #[serde(default)]
    pub optimize: OptimizeSection,

    /// Tier 2 codec loading
    #[serde(default)]
    pub codecs: CodecOptions,

    /// Advisory thresholds
    #[serde(default)]
    pub limits: Limits,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[convert]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertSection {
    /// Target container
    #[serde(default)]
    pub output_format: OutputFormat,

    /// Lossy quality in (0, 1]
    #[serde(default = "default_quality")]
    pub quality: f32,
}

impl Default for ConvertSection {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::default(),
            quality: default_quality(),
        }
    }
}

fn default_quality() -> f32 {
    DEFAULT_QUALITY
}

/// `[optimize]`: the per-file byte budget plus the search tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OptimizeSection {
    /// Byte budget per file; 0 disables optimization
    #[serde(default)]
    pub target_bytes: u64,

    /// Only change dimensions
    #[serde(default)]
    pub lock_quality: bool,

    /// Only change quality
    #[serde(default)]
    pub lock_dimensions: bool,

    /// Search bounds, tolerances, budget, and classifier tuning
    #[serde(flatten)]
    pub settings: OptimizeSettings,
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON log lines
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ConfigSchema {
    /// Conversion options assembled from `[convert]` and `[optimize]`.
    pub fn convert_options(&self) -> ConvertOptions {
        ConvertOptions {
            output_format: self.convert.output_format,
            quality: self.convert.quality,
            target_bytes: self.optimize.target_bytes,
            lock_quality: self.optimize.lock_quality,
            lock_dimensions: self.optimize.lock_dimensions,
        }
    }
}
