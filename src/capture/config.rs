//! Scanner configuration.
//!
//! The quality tier only bounds the preview size from below; the capture
//! size is always the largest the device offers. Everything here is fixed
//! when a session is created.

use super::resolution::DeviceSize;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Host-selected quality/performance preset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    /// Preview above 320x240.
    Low,
    /// Preview above 640x480.
    #[default]
    Medium,
    /// Preview above 1024x768.
    High,
}

impl QualityTier {
    /// Floor that a preview size must strictly exceed in both dimensions.
    pub const fn min_preview_size(self) -> DeviceSize {
        match self {
            QualityTier::Low => DeviceSize::new(320, 240),
            QualityTier::Medium => DeviceSize::new(640, 480),
            QualityTier::High => DeviceSize::new(1024, 768),
        }
    }

    /// Host tag for this tier.
    pub const fn as_str(self) -> &'static str {
        match self {
            QualityTier::Low => "low",
            QualityTier::Medium => "medium",
            QualityTier::High => "high",
        }
    }
}

impl FromStr for QualityTier {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(QualityTier::Low),
            "medium" => Ok(QualityTier::Medium),
            "high" => Ok(QualityTier::High),
            other => Err(ConfigError::UnknownPreset(other.to_string())),
        }
    }
}

/// What to scan and with which camera.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Camera identifier as reported by the camera provider.
    pub camera_id: String,
    /// Quality tier bounding the preview size.
    pub quality: QualityTier,
    /// Requested symbology tags, e.g. `["qr", "ean13"]`.
    pub code_formats: Vec<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            camera_id: "0".to_string(),
            quality: QualityTier::Medium,
            code_formats: vec!["qr".to_string()],
        }
    }
}

impl ScannerConfig {
    /// Validates the configuration parameters.
    ///
    /// Unknown format tags are tolerated here; they are dropped when the
    /// format set is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera_id.trim().is_empty() {
            return Err(ConfigError::EmptyCameraId);
        }
        if self.code_formats.is_empty() {
            return Err(ConfigError::NoCodeFormats);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown quality preset: {0}")]
    UnknownPreset(String),
    #[error("camera id must not be empty")]
    EmptyCameraId,
    #[error("at least one code format is required")]
    NoCodeFormats,
    #[error("invalid detector dimension (must be at least 64 pixels)")]
    InvalidDimension,
    #[error("invalid detection timeout (must be at least 1 ms)")]
    InvalidTimeout,
    #[error("invalid frame rate (must be 1-120 fps)")]
    InvalidFrameRate,
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Detector tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Frames with a larger dimension are downsampled before detection.
    pub max_dimension: u32,
    /// A detection still running after this long is abandoned.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    5_000
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_dimension: 640,
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl DetectorConfig {
    /// Detection timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Demo output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Keep re-arming scanning until interrupted.
    pub continuous: bool,
    /// Number of codes to deliver before exiting if not continuous.
    pub code_count: u32,
    /// Rate at which the frame producer delivers frames.
    pub fps: u32,
    /// Metrics server port (0 to disable).
    pub metrics_port: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            continuous: false,
            code_count: 1,
            fps: 30,
            metrics_port: 9090,
        }
    }
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scanner.validate()?;
        if self.detector.max_dimension < 64 {
            return Err(ConfigError::InvalidDimension);
        }
        if self.detector.timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        if self.output.fps == 0 || self.output.fps > 120 {
            return Err(ConfigError::InvalidFrameRate);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(FileConfig::default().validate().is_ok());
    }

    #[test]
    fn test_quality_tier_parsing() {
        assert_eq!("low".parse::<QualityTier>().unwrap(), QualityTier::Low);
        assert_eq!("high".parse::<QualityTier>().unwrap(), QualityTier::High);
        assert_eq!(
            "ultra".parse::<QualityTier>(),
            Err(ConfigError::UnknownPreset("ultra".to_string()))
        );
    }

    #[test]
    fn test_tier_floors() {
        assert_eq!(QualityTier::Low.min_preview_size(), DeviceSize::new(320, 240));
        assert_eq!(QualityTier::Medium.min_preview_size(), DeviceSize::new(640, 480));
        assert_eq!(QualityTier::High.min_preview_size(), DeviceSize::new(1024, 768));
    }

    #[test]
    fn test_empty_formats_invalid() {
        let mut config = ScannerConfig::default();
        config.code_formats.clear();
        assert_eq!(config.validate(), Err(ConfigError::NoCodeFormats));
    }

    #[test]
    fn test_parse_toml_sections() {
        let config = FileConfig::from_toml(
            r#"
            [scanner]
            camera_id = "1"
            quality = "high"
            code_formats = ["qr", "ean13"]

            [output]
            continuous = true
            code_count = 3
            fps = 15
            metrics_port = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.scanner.camera_id, "1");
        assert_eq!(config.scanner.quality, QualityTier::High);
        assert_eq!(config.scanner.code_formats, vec!["qr", "ean13"]);
        assert_eq!(config.detector.max_dimension, 640);
        assert_eq!(config.detector.timeout(), Duration::from_secs(5));
        assert!(config.output.continuous);
        assert_eq!(config.output.fps, 15);
    }

    #[test]
    fn test_zero_timeout_invalid() {
        let mut config = FileConfig::default();
        config.detector.timeout_ms = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidTimeout));
    }

    #[test]
    fn test_parse_rejects_unknown_tier() {
        let result = FileConfig::from_toml(
            r#"
            [scanner]
            camera_id = "0"
            quality = "ultra"
            code_formats = ["qr"]
            "#,
        );
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
