//! Conversion of CLI arguments into library configuration

use crate::cli::main_impl::{Cli, CliStrategy};
use crate::{
    background::{BackgroundSpec, CustomAsset},
    config::{ComposerConfig, SegmentationStrategyKind},
    placement::{Effects, PlacementState},
};
use anyhow::{Context, Result};

pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Config file (or defaults), then environment, then flags
    pub(crate) fn from_cli(cli: &Cli) -> Result<ComposerConfig> {
        let mut config = match &cli.config {
            Some(path) => ComposerConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => ComposerConfig::default(),
        }
        .with_env_overrides();

        if let Some(url) = &cli.api_url {
            config.remote.api_base = Some(url.clone());
        }
        if cli.no_remote {
            config.remote.api_base = None;
        }
        if let Some(tolerance) = cli.tolerance {
            config.segmentation.tolerance = tolerance;
        }
        if let Some(strategy) = cli.strategy {
            config.segmentation.strategy = match strategy {
                CliStrategy::BorderFlood => SegmentationStrategyKind::BorderFlood,
                CliStrategy::BorderSample => SegmentationStrategyKind::BorderSample,
            };
        }
        if let Some(output) = &cli.output {
            config.output_dir = Some(output.clone());
        }

        config.validate()?;
        Ok(config)
    }

    /// Placement snapshot from the geometry and filter flags, clamped
    pub(crate) fn placement(cli: &Cli) -> PlacementState {
        let effects = Effects::new(cli.brightness, cli.contrast, cli.saturation, cli.blur);
        PlacementState::default()
            .with_scale(cli.scale)
            .with_offset(cli.offset_x, cli.offset_y)
            .with_rotation(cli.rotation)
            .with_flip(cli.flip_horizontal, cli.flip_vertical)
            .with_effects(effects)
    }

    pub(crate) fn background(cli: &Cli) -> Result<BackgroundSpec> {
        if let Some(path) = &cli.custom_background {
            let asset = CustomAsset::from_path(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            return Ok(BackgroundSpec::Custom(asset));
        }
        Ok(cli.background.parse()?)
    }
}
