//! Configuration types for segmentation, remote dispatch and export

use crate::error::{BgComposerError, Result};
use crate::utils::color::Color;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the remote service base URL
pub const API_URL_ENV: &str = "BG_COMPOSER_API_URL";

/// Longest side allowed for decoded images before downscaling
pub const DEFAULT_MAX_DIMENSION: u32 = 2048;

/// Default segmentation tolerance
///
/// Euclidean RGB units for the border flood; border sampling reads it as a
/// percentage of the largest distance, about 123.7 Euclidean units.
pub const DEFAULT_TOLERANCE: f32 = 28.0;

/// Upper bound for the feather band width in pixels
pub const MAX_FEATHER_RADIUS: u32 = 8;

/// Segmentation strategy discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationStrategyKind {
    /// Flood from the border through connected background-colored pixels
    #[default]
    BorderFlood,
    /// Classify every pixel against colors sampled along the border, no connectivity
    BorderSample,
}

impl std::fmt::Display for SegmentationStrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BorderFlood => write!(f, "border-flood"),
            Self::BorderSample => write!(f, "border-sample"),
        }
    }
}

/// Color distance metric used for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ColorMetric {
    /// Plain Euclidean distance over RGB, range `0..=441.7`
    #[default]
    Euclidean,
    /// "Redmean" perceptually weighted Euclidean distance, range `0..=765`
    Weighted,
}

/// How reference background colors are sampled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceSampling {
    /// Every pixel of the outer border ring is a reference and a seed
    #[default]
    BorderRing,
    /// The four corner pixels are the references
    Corners,
    /// Caller-supplied reference colors
    Explicit(Vec<Color>),
}

/// Remote segmentation service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the service API, e.g. `http://localhost:4000/api/v1`
    pub api_base: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Uploads larger than this skip the remote attempt
    pub max_upload_bytes: usize,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_base: None,
            timeout_secs: 60,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl RemoteConfig {
    /// The remote path is only attempted for absolute http(s) base URLs
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.api_base
            .as_deref()
            .is_some_and(|base| base.trim().starts_with("http"))
    }
}

/// Local segmentation engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub strategy: SegmentationStrategyKind,
    /// Maximum color distance for a pixel to count as background
    /// (a percentage of the metric's range under border sampling)
    pub tolerance: f32,
    /// Width of the feather band in pixels (0 disables feathering)
    pub feather_radius: u32,
    pub metric: ColorMetric,
    pub reference: ReferenceSampling,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            strategy: SegmentationStrategyKind::default(),
            tolerance: DEFAULT_TOLERANCE,
            feather_radius: 2,
            metric: ColorMetric::default(),
            reference: ReferenceSampling::default(),
        }
    }
}

/// Top-level configuration for the composer pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    pub remote: RemoteConfig,
    pub segmentation: SegmentationConfig,
    /// Longest allowed side of loaded images
    pub max_dimension: u32,
    /// Directory receiving exports (None = OS downloads directory)
    pub output_dir: Option<PathBuf>,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            remote: RemoteConfig::default(),
            segmentation: SegmentationConfig::default(),
            max_dimension: DEFAULT_MAX_DIMENSION,
            output_dir: None,
        }
    }
}

impl ComposerConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    ///
    /// ```rust
    /// use bg_composer::ComposerConfig;
    ///
    /// let config = ComposerConfig::builder()
    ///     .tolerance(40.0)
    ///     .api_base("http://localhost:4000/api/v1")
    ///     .build()
    ///     .unwrap();
    /// assert!(config.remote.is_configured());
    /// ```
    #[must_use]
    pub fn builder() -> ComposerConfigBuilder {
        ComposerConfigBuilder::default()
    }

    /// Load configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| BgComposerError::file_io_error("read config file", path, &e))?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            BgComposerError::invalid_config(format!(
                "Failed to parse config '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply the `BG_COMPOSER_API_URL` override, if set and non-empty
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.remote.api_base = Some(url.trim().to_string());
            }
        }
        self
    }

    /// Directory exports are written to
    #[must_use]
    pub fn resolved_output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Tolerance that is negative or NaN
    /// - Feather radius above the supported maximum
    /// - Zero `max_dimension`
    /// - Explicit reference sampling without colors
    pub fn validate(&self) -> Result<()> {
        let seg = &self.segmentation;

        if seg.tolerance.is_nan() || seg.tolerance < 0.0 {
            return Err(BgComposerError::config_value_error(
                "tolerance",
                seg.tolerance,
                "0.0-inf",
                Some(DEFAULT_TOLERANCE),
            ));
        }

        if seg.feather_radius > MAX_FEATHER_RADIUS {
            return Err(BgComposerError::config_value_error(
                "feather_radius",
                seg.feather_radius,
                "0-8",
                Some(2),
            ));
        }

        if self.max_dimension == 0 {
            return Err(BgComposerError::config_value_error(
                "max_dimension",
                self.max_dimension,
                "1-65535",
                Some(DEFAULT_MAX_DIMENSION),
            ));
        }

        if let ReferenceSampling::Explicit(colors) = &seg.reference {
            if colors.is_empty() {
                return Err(BgComposerError::invalid_config(
                    "explicit reference sampling needs at least one color",
                ));
            }
        }

        if self.remote.timeout_secs == 0 {
            return Err(BgComposerError::config_value_error(
                "remote timeout_secs",
                self.remote.timeout_secs,
                ">= 1",
                Some(60),
            ));
        }

        Ok(())
    }
}

/// Builder for `ComposerConfig`
#[derive(Debug, Default)]
pub struct ComposerConfigBuilder {
    config: ComposerConfig,
}

impl ComposerConfigBuilder {
    /// Set the remote API base URL
    #[must_use]
    pub fn api_base<S: Into<String>>(mut self, base: S) -> Self {
        self.config.remote.api_base = Some(base.into());
        self
    }

    /// Never attempt the remote service
    #[must_use]
    pub fn no_remote(mut self) -> Self {
        self.config.remote.api_base = None;
        self
    }

    #[must_use]
    pub fn remote_timeout_secs(mut self, secs: u64) -> Self {
        self.config.remote.timeout_secs = secs.max(1);
        self
    }

    #[must_use]
    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.remote.max_upload_bytes = bytes;
        self
    }

    #[must_use]
    pub fn strategy(mut self, strategy: SegmentationStrategyKind) -> Self {
        self.config.segmentation.strategy = strategy;
        self
    }

    /// Set the tolerance; negative values clamp to 0, NaN is rejected at build time
    #[must_use]
    pub fn tolerance(mut self, tolerance: f32) -> Self {
        self.config.segmentation.tolerance = if tolerance < 0.0 { 0.0 } else { tolerance };
        self
    }

    #[must_use]
    pub fn feather_radius(mut self, radius: u32) -> Self {
        self.config.segmentation.feather_radius = radius.min(MAX_FEATHER_RADIUS);
        self
    }

    #[must_use]
    pub fn metric(mut self, metric: ColorMetric) -> Self {
        self.config.segmentation.metric = metric;
        self
    }

    #[must_use]
    pub fn reference(mut self, reference: ReferenceSampling) -> Self {
        self.config.segmentation.reference = reference;
        self
    }

    #[must_use]
    pub fn max_dimension(mut self, max_dimension: u32) -> Self {
        self.config.max_dimension = max_dimension;
        self
    }

    #[must_use]
    pub fn output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.output_dir = Some(dir.into());
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<ComposerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ComposerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_dimension, 2048);
        assert!(!config.remote.is_configured());
        assert_eq!(config.segmentation.strategy, SegmentationStrategyKind::BorderFlood);
    }

    #[test]
    fn test_remote_only_configured_for_http_bases() {
        let mut remote = RemoteConfig::default();
        remote.api_base = Some("/api/v1".to_string());
        assert!(!remote.is_configured());
        remote.api_base = Some("https://tools.example.com/api/v1".to_string());
        assert!(remote.is_configured());
    }

    #[test]
    fn test_builder_clamps_values() {
        let config = ComposerConfig::builder()
            .tolerance(-5.0)
            .feather_radius(40)
            .remote_timeout_secs(0)
            .build()
            .unwrap();
        assert_eq!(config.segmentation.tolerance, 0.0);
        assert_eq!(config.segmentation.feather_radius, MAX_FEATHER_RADIUS);
        assert_eq!(config.remote.timeout_secs, 1);
    }

    #[test]
    fn test_infinite_tolerance_is_allowed() {
        let config = ComposerConfig::builder().tolerance(f32::INFINITY).build();
        assert!(config.is_ok());
    }

    #[test]
    fn test_validation_failures() {
        let mut config = ComposerConfig::default();
        config.segmentation.tolerance = f32::NAN;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("tolerance"));

        let mut config = ComposerConfig::default();
        config.max_dimension = 0;
        assert!(config.validate().unwrap_err().to_string().contains("max_dimension"));

        let config = ComposerConfig::builder()
            .reference(ReferenceSampling::Explicit(vec![]))
            .build();
        assert!(config.is_err());
    }

    #[test]
    fn test_json_roundtrip_with_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("composer.json");
        std::fs::write(
            &path,
            r##"{
                "remote": { "api_base": "http://localhost:4000/api/v1" },
                "segmentation": {
                    "tolerance": 12.5,
                    "strategy": "border_sample",
                    "reference": { "explicit": ["#ffffff"] }
                }
            }"##,
        )
        .unwrap();

        let config = ComposerConfig::from_json_file(&path).unwrap();
        assert_eq!(config.segmentation.tolerance, 12.5);
        assert_eq!(config.segmentation.strategy, SegmentationStrategyKind::BorderSample);
        assert_eq!(
            config.segmentation.reference,
            ReferenceSampling::Explicit(vec![Color::WHITE])
        );
        assert_eq!(config.remote.timeout_secs, 60);
        assert_eq!(config.max_dimension, 2048);
    }

    #[test]
    fn test_missing_config_file_is_io_error() {
        let err = ComposerConfig::from_json_file("/nonexistent/composer.json").unwrap_err();
        assert!(matches!(err, BgComposerError::Io(_)));
    }
}
