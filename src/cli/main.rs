//! Background composer CLI
//!
//! Removes the background of one image and composes the cutout onto a new
//! background, writing `bg-removed-<millis>.png` into the output directory.

use super::config::CliConfigBuilder;
use crate::{
    background::BackgroundSpec,
    export::ExportArtifact,
    placement::PlacementState,
    services::{ProcessingStage, ProgressReporter, ProgressUpdate},
    session::EditingSession,
    tracing_config::{init_cli_tracing, spans},
    types::{ForegroundLayer, ProcessingTimings},
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, Instrument};

/// Remove an image background and compose the cutout onto a new one
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bg-composer")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output directory [default: downloads directory]
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Background: transparent, white, office, nature, studio, city, abstract,
    /// blue-gradient, solid:#rrggbb, gradient:#a,#b or image:<url>
    #[arg(short, long, default_value = "transparent")]
    pub background: String,

    /// Use a local image file as the background
    #[arg(long, value_name = "PATH", conflicts_with = "background")]
    pub custom_background: Option<PathBuf>,

    /// Skip segmentation and use this already cut-out image
    #[arg(long, value_name = "PATH")]
    pub edited_foreground: Option<PathBuf>,

    /// Color distance up to which pixels count as background (percent with border-sample)
    #[arg(short, long, allow_hyphen_values = true)]
    pub tolerance: Option<f32>,

    /// Local segmentation strategy
    #[arg(long, value_enum)]
    pub strategy: Option<CliStrategy>,

    /// Foreground size in percent (20-150)
    #[arg(long, default_value_t = 80.0)]
    pub scale: f32,

    /// Horizontal nudge (-30..30)
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub offset_x: f32,

    /// Vertical nudge (-20..20)
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub offset_y: f32,

    /// Rotation in degrees
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub rotation: f32,

    #[arg(long)]
    pub flip_horizontal: bool,

    #[arg(long)]
    pub flip_vertical: bool,

    /// Brightness in percent (0-200)
    #[arg(long, default_value_t = 100.0)]
    pub brightness: f32,

    /// Contrast in percent (0-200)
    #[arg(long, default_value_t = 100.0)]
    pub contrast: f32,

    /// Saturation in percent (0-200)
    #[arg(long, default_value_t = 100.0)]
    pub saturation: f32,

    /// Blur radius in pixels (0-10)
    #[arg(long, default_value_t = 0.0)]
    pub blur: f32,

    /// Remote segmentation API base, e.g. http://localhost:4000/api/v1
    #[arg(long, value_name = "URL", env = "BG_COMPOSER_API_URL")]
    pub api_url: Option<String>,

    /// Never contact the remote service
    #[arg(long)]
    pub no_remote: bool,

    /// JSON configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Verbose logging (-v: debug, -vv: trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliStrategy {
    BorderFlood,
    BorderSample,
}

/// Spinner that shows the current pipeline stage
struct SpinnerReporter {
    bar: ProgressBar,
    verbose: bool,
}

impl SpinnerReporter {
    fn new(verbose: bool) -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) =
            ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
        {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar, verbose }
    }

    fn handle(&self) -> ProgressBar {
        self.bar.clone()
    }
}

impl ProgressReporter for SpinnerReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            self.bar.set_message(format!(
                "[{}%] {} ({}ms)",
                update.progress, update.description, update.elapsed_ms
            ));
        } else {
            self.bar
                .set_message(format!("[{}%] {}", update.progress, update.description));
        }
    }

    fn report_completion(&self, timings: &ProcessingTimings) {
        self.bar
            .println(format!("✅ Background removed in {}ms", timings.total_ms));
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        self.bar
            .println(format!("❌ {} failed: {}", stage.description(), error));
    }
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();
    let session_id = uuid::Uuid::new_v4().to_string();
    let _guard =
        init_cli_tracing(cli.verbose, &session_id).context("Failed to initialize tracing")?;

    let span = spans::session(&session_id, &cli.input);
    run(cli).instrument(span).await
}

async fn run(cli: Cli) -> Result<()> {
    let config = CliConfigBuilder::from_cli(&cli).context("Invalid configuration")?;
    let placement = CliConfigBuilder::placement(&cli);
    let background = CliConfigBuilder::background(&cli).context("Invalid background")?;

    info!(
        input = %cli.input.display(),
        remote = config.remote.is_configured(),
        strategy = %config.segmentation.strategy,
        "starting background composition"
    );

    let reporter = SpinnerReporter::new(cli.verbose > 0);
    let spinner = reporter.handle();
    let mut session = EditingSession::new(&config)
        .context("Failed to set up session")?
        .with_progress_reporter(Box::new(reporter));

    let result = compose(&cli, &mut session, background, placement).await;
    spinner.finish_and_clear();
    let artifact = result?;

    match &artifact.path {
        Some(path) => println!("💾 Saved {}", path.display()),
        None => println!("💾 Exported {}", artifact.filename),
    }
    Ok(())
}

async fn compose(
    cli: &Cli,
    session: &mut EditingSession,
    background: BackgroundSpec,
    placement: PlacementState,
) -> Result<ExportArtifact> {
    session
        .upload_path(&cli.input)
        .with_context(|| format!("Failed to load {}", cli.input.display()))?;

    if let Some(edited) = &cli.edited_foreground {
        let bytes = std::fs::read(edited)
            .with_context(|| format!("Failed to read {}", edited.display()))?;
        session
            .apply_editor_result(&bytes)
            .context("Failed to use edited foreground")?;
    } else {
        let layer = session
            .remove_background()
            .await
            .context("Background removal failed")?;
        info!(source = %layer.source(), "foreground ready");
    }

    let dimensions = session
        .foreground()
        .map(ForegroundLayer::dimensions)
        .unwrap_or_default();
    let span = spans::compose(&background.to_string(), dimensions);
    session.set_background(background);
    session.update_placement(placement);
    session
        .export()
        .instrument(span)
        .await
        .context("Export failed")
}
