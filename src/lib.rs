#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]
#![allow(clippy::float_cmp)]

//! # Background Composer
//!
//! Removes the background of a photo and composes the cutout onto a new
//! background with adjustable placement and color filters, then exports a
//! flattened PNG.
//!
//! ## Features
//!
//! - **Segmentation**: tolerance-based border flood (or border sampling) with a
//!   narrow feathered edge, exposed as a pure function of the pixel buffer
//! - **Remote first**: an optional HTTP segmentation service is tried before
//!   the local engine; its failures never reach the caller
//! - **Backgrounds**: transparent, solid colors, diagonal gradients, stock or
//!   custom images
//! - **Placement**: clamped offset, scale, rotation, flips, brightness,
//!   contrast, saturation and blur
//! - **Export**: lossless PNG named `bg-removed-<millis>.png`
//! - **CLI Integration**: optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bg_composer::{
//!     BackgroundSpec, ComposerConfig, EditingSession, PlacementState,
//! };
//!
//! # async fn example(upload: Vec<u8>) -> anyhow::Result<()> {
//! let config = ComposerConfig::builder()
//!     .tolerance(32.0)
//!     .output_dir("exports")
//!     .build()?;
//!
//! let mut session = EditingSession::new(&config)?;
//! session.upload(&upload)?;
//! session.remove_background().await?;
//! session.set_background("blue-gradient".parse::<BackgroundSpec>()?);
//! session.update_placement(PlacementState::default().with_scale(100.0).with_rotation(-5.0));
//! let artifact = session.export().await?;
//! println!("saved {:?}", artifact.path);
//! # Ok(())
//! # }
//! ```
//!
//! ## Segmentation only
//!
//! ```rust
//! use bg_composer::{segmentation::segment_with, Color, ReferenceSampling, SegmentationConfig};
//!
//! // 2x2: white row over a black row, white as the known background
//! let pixels = [
//!     255, 255, 255, 255, 255, 255, 255, 255,
//!     0, 0, 0, 255, 0, 0, 0, 255,
//! ];
//! let config = SegmentationConfig {
//!     tolerance: 10.0,
//!     reference: ReferenceSampling::Explicit(vec![Color::WHITE]),
//!     ..SegmentationConfig::default()
//! };
//! let mask = segment_with(&pixels, 2, 2, &config).unwrap();
//! assert_eq!(mask.data(), &[0, 0, 255, 255]);
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): command-line interface, spinner and tracing subscriber
//! - `webp-support` (default): WebP input decoding
//! - `tracing-json`, `tracing-files`: extra subscriber outputs for the CLI

pub mod background;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compositor;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod export;
pub mod placement;
pub mod remote;
pub mod segmentation;
pub mod services;
pub mod session;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod transform;
pub mod types;
pub mod utils;

use tokio::io::AsyncRead;

pub use background::{
    AssetFetcher, BackgroundCatalog, BackgroundOption, BackgroundRenderer, BackgroundSpec,
    CustomAsset, HttpAssetFetcher,
};
pub use config::{
    ColorMetric, ComposerConfig, ComposerConfigBuilder, ReferenceSampling, RemoteConfig,
    SegmentationConfig, SegmentationStrategyKind,
};
pub use dispatcher::{
    DispatchOutcome, DispatchState, LocalAttempt, RemoteAttempt, SegmentationAttempt,
    SegmentationDispatcher,
};
pub use error::{BgComposerError, Result};
pub use export::{
    BlobHandle, DirectorySink, DownloadSink, ExportArtifact, ExportSerializer, MemorySink,
    ObjectUrlRegistry,
};
pub use placement::{DragGesture, Effects, PlacementRect, PlacementState};
pub use remote::RemoteClient;
pub use services::{
    ConsoleProgressReporter, ImageLoader, NoOpProgressReporter, ProcessingStage,
    ProgressReporter, ProgressUpdate,
};
pub use session::{EditingSession, RemovalTicket};
pub use types::{
    AlphaMask, CompositeSurface, ForegroundLayer, MaskStatistics, ProcessingTimings,
    SegmentationSource, SourceImage,
};
pub use utils::Color;

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat, TracingOutput};

/// Remove the background of an encoded image
///
/// Decodes and bounds the image, then runs the remote-first dispatch chain
/// described by `config`.
///
/// ```rust,no_run
/// use bg_composer::{remove_background_from_bytes, ComposerConfig};
///
/// # async fn example(upload: Vec<u8>) -> anyhow::Result<()> {
/// let outcome = remove_background_from_bytes(&upload, &ComposerConfig::default()).await?;
/// println!("cutout from {} path", outcome.source);
/// # Ok(())
/// # }
/// ```
pub async fn remove_background_from_bytes(
    image_bytes: &[u8],
    config: &ComposerConfig,
) -> Result<DispatchOutcome> {
    config.validate()?;
    let source = ImageLoader::new(config.max_dimension).load_from_bytes(image_bytes)?;
    SegmentationDispatcher::from_config(config)?
        .dispatch(&source)
        .await
}

/// Remove the background of an image read from any async stream
pub async fn remove_background_from_reader<R: AsyncRead + Unpin>(
    reader: R,
    config: &ComposerConfig,
) -> Result<DispatchOutcome> {
    config.validate()?;
    let source = ImageLoader::new(config.max_dimension)
        .load_from_reader(reader)
        .await?;
    SegmentationDispatcher::from_config(config)?
        .dispatch(&source)
        .await
}

/// Render `background` and draw `foreground` onto it
///
/// Image backgrounds are fetched over HTTP with the remote timeout from
/// `config`.
pub async fn compose_foreground(
    foreground: &ForegroundLayer,
    background: &BackgroundSpec,
    placement: &PlacementState,
    config: &ComposerConfig,
) -> Result<CompositeSurface> {
    let renderer = BackgroundRenderer::with_http(
        std::time::Duration::from_secs(config.remote.timeout_secs),
        ImageLoader::new(config.max_dimension),
    )?;
    let surface = renderer.render(background, foreground.dimensions()).await?;
    transform::compose_onto(surface, foreground, placement)
}
