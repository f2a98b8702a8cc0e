//! Editing session: the working set of one upload
//!
//! An [`EditingSession`] owns the current source image, its cutout, the
//! placement and the chosen background. A new upload replaces the whole
//! working set; removal results that belong to an earlier upload are
//! discarded when they come back.

use crate::{
    background::{BackgroundRenderer, BackgroundSpec},
    config::ComposerConfig,
    dispatcher::{DispatchOutcome, SegmentationDispatcher},
    error::{BgComposerError, Result},
    export::{
        encode_png, BlobHandle, DirectorySink, DownloadSink, ExportArtifact, ExportSerializer,
        ObjectUrlRegistry,
    },
    placement::{DragGesture, PlacementState},
    services::{mime_type, ImageLoader, ProcessingStage, ProgressReporter, ProgressTracker},
    transform,
    types::{CompositeSurface, ForegroundLayer, ProcessingTimings, SegmentationSource, SourceImage},
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Claim on the single in-flight removal of a session
///
/// Produced by [`EditingSession::start_removal`] and handed back to
/// [`EditingSession::complete_removal`] together with the dispatch result.
#[derive(Debug, Clone)]
pub struct RemovalTicket {
    generation: u64,
    source: SourceImage,
}

impl RemovalTicket {
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn source(&self) -> &SourceImage {
        &self.source
    }
}

/// Explicit per-session context for the upload → remove → compose → export flow
pub struct EditingSession {
    loader: ImageLoader,
    dispatcher: Arc<SegmentationDispatcher>,
    renderer: BackgroundRenderer,
    exporter: ExportSerializer,
    registry: ObjectUrlRegistry,
    progress: ProgressTracker,

    generation: u64,
    pending: Option<u64>,
    source: Option<SourceImage>,
    foreground: Option<ForegroundLayer>,
    placement: PlacementState,
    background: BackgroundSpec,
    source_preview: Option<BlobHandle>,
    result_preview: Option<BlobHandle>,
    last_error: Option<String>,
    last_timings: Option<ProcessingTimings>,
}

impl EditingSession {
    /// Session wired from configuration, exporting into the output directory
    ///
    /// # Errors
    /// - `InvalidConfig` when the configuration does not validate
    pub fn new(config: &ComposerConfig) -> Result<Self> {
        config.validate()?;
        let loader = ImageLoader::new(config.max_dimension);
        let dispatcher = SegmentationDispatcher::from_config(config)?;
        let renderer =
            BackgroundRenderer::with_http(Duration::from_secs(config.remote.timeout_secs), loader)?;
        let sink = DirectorySink::new(config.resolved_output_dir());
        Ok(Self::with_components(loader, dispatcher, renderer, Box::new(sink)))
    }

    #[must_use]
    pub fn with_components(
        loader: ImageLoader,
        dispatcher: SegmentationDispatcher,
        renderer: BackgroundRenderer,
        sink: Box<dyn DownloadSink>,
    ) -> Self {
        let registry = ObjectUrlRegistry::new();
        Self {
            loader,
            dispatcher: Arc::new(dispatcher),
            renderer,
            exporter: ExportSerializer::new(registry.clone(), sink),
            registry,
            progress: ProgressTracker::no_op(),
            generation: 0,
            pending: None,
            source: None,
            foreground: None,
            placement: PlacementState::default(),
            background: BackgroundSpec::default(),
            source_preview: None,
            result_preview: None,
            last_error: None,
            last_timings: None,
        }
    }

    #[must_use]
    pub fn with_progress_reporter(mut self, reporter: Box<dyn ProgressReporter>) -> Self {
        self.progress = ProgressTracker::new(reporter);
        self
    }

    /// Decode a new upload and make it the current image
    ///
    /// Discards the previous cutout and placement and releases their preview
    /// handles. Any removal still in flight for the old image becomes stale.
    pub fn upload(&mut self, bytes: &[u8]) -> Result<&SourceImage> {
        self.progress.restart();
        self.progress.report_stage(ProcessingStage::ImageLoading);
        let source = self.loader.load_from_bytes(bytes);
        let source = self.record(source)?;

        let preview = self
            .registry
            .create(bytes.to_vec(), mime_type(source.original_format()));
        let preview = self.record(preview)?;

        self.generation += 1;
        self.pending = None;
        self.foreground = None;
        self.result_preview = None;
        self.placement = PlacementState::default();
        self.source_preview = Some(preview);
        self.last_error = None;
        self.last_timings = None;
        info!(
            generation = self.generation,
            width = source.width(),
            height = source.height(),
            "image uploaded"
        );

        Ok(self.source.insert(source))
    }

    /// Read an upload from disk
    pub fn upload_path<P: AsRef<Path>>(&mut self, path: P) -> Result<&SourceImage> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| BgComposerError::file_io_error("read input image", path, &e));
        let bytes = self.record(bytes)?;
        self.upload(&bytes)
    }

    /// Claim the in-flight slot for the current image
    ///
    /// # Errors
    /// - `InvalidState` without an upload or while another removal is pending
    pub fn start_removal(&mut self) -> Result<RemovalTicket> {
        let source = self
            .source
            .clone()
            .ok_or_else(|| BgComposerError::invalid_state("no image uploaded"))?;
        if self.pending.is_some() {
            return Err(BgComposerError::invalid_state(
                "background removal is already in progress",
            ));
        }

        self.pending = Some(self.generation);
        Ok(RemovalTicket {
            generation: self.generation,
            source,
        })
    }

    /// Store the outcome of a removal started with `ticket`
    ///
    /// Returns `Ok(false)` when the ticket belongs to a superseded upload;
    /// its result is dropped without touching the session.
    ///
    /// # Errors
    /// - the dispatch error, which also becomes the latest session error
    pub fn complete_removal(
        &mut self,
        ticket: RemovalTicket,
        outcome: Result<DispatchOutcome>,
    ) -> Result<bool> {
        if ticket.generation != self.generation || self.pending != Some(ticket.generation) {
            debug!(
                ticket = ticket.generation,
                current = self.generation,
                "discarding stale removal result"
            );
            return Ok(false);
        }
        self.pending = None;

        let outcome = self.record(outcome)?;
        let stored = self.set_foreground(outcome.layer);
        self.record(stored)?;
        self.progress.report_completion(&outcome.timings);
        self.last_timings = Some(outcome.timings);
        Ok(true)
    }

    /// Run the dispatcher for the current image and keep the cutout
    pub async fn remove_background(&mut self) -> Result<&ForegroundLayer> {
        let ticket = self.start_removal()?;
        let dispatcher = Arc::clone(&self.dispatcher);
        let outcome = dispatcher
            .dispatch_with_progress(ticket.source(), &mut self.progress)
            .await;
        self.complete_removal(ticket, outcome)?;
        self.foreground()
            .ok_or_else(|| BgComposerError::invalid_state("removal produced no foreground"))
    }

    /// Shared handle to the dispatcher, for running a ticket elsewhere
    #[must_use]
    pub fn dispatcher(&self) -> Arc<SegmentationDispatcher> {
        Arc::clone(&self.dispatcher)
    }

    pub fn set_background(&mut self, spec: BackgroundSpec) {
        debug!(background = %spec, "background selected");
        self.background = spec;
    }

    pub fn update_placement(&mut self, state: PlacementState) {
        self.placement = state;
    }

    /// Apply a drag snapshot for the pointer at `point`
    pub fn apply_drag(&mut self, gesture: &DragGesture, point: (f32, f32)) -> &PlacementState {
        self.placement = gesture.update(point);
        &self.placement
    }

    /// Replace the cutout with an image returned by an external editor
    ///
    /// # Errors
    /// - `InvalidState` before an upload
    /// - `Load` when the editor bytes cannot be decoded
    pub fn apply_editor_result(&mut self, bytes: &[u8]) -> Result<&ForegroundLayer> {
        if self.source.is_none() {
            return Err(self.fail(BgComposerError::invalid_state("no image uploaded")));
        }
        let image = self.loader.decode_rgba(bytes);
        let image = self.record(image)?;
        let stored = self.set_foreground(ForegroundLayer::new(image, SegmentationSource::Editor));
        self.record(stored)?;
        self.foreground()
            .ok_or_else(|| BgComposerError::invalid_state("editor result was not stored"))
    }

    /// Build a fresh composite of the current background and placed cutout
    ///
    /// # Errors
    /// - `InvalidState` before a cutout exists
    /// - `Composition` when the background or the draw fails
    pub async fn render(&mut self) -> Result<CompositeSurface> {
        let surface = self.render_inner().await;
        self.record(surface)
    }

    async fn render_inner(&mut self) -> Result<CompositeSurface> {
        let foreground = self
            .foreground
            .clone()
            .ok_or_else(|| BgComposerError::invalid_state("no foreground to compose"))?;

        self.progress.report_stage(ProcessingStage::BackgroundRendering);
        let surface = self
            .renderer
            .render(&self.background, foreground.dimensions())
            .await?;

        self.progress.report_stage(ProcessingStage::ForegroundPlacement);
        transform::compose_onto(surface, &foreground, &self.placement)
    }

    /// Render and hand the PNG to the download sink
    pub async fn export(&mut self) -> Result<ExportArtifact> {
        let surface = self.render().await?;
        self.progress.report_stage(ProcessingStage::Export);
        let artifact = self.exporter.export(&surface);
        let artifact = self.record(artifact)?;
        self.progress.report_stage(ProcessingStage::Completed);
        Ok(artifact)
    }

    fn set_foreground(&mut self, layer: ForegroundLayer) -> Result<()> {
        let bytes = encode_png(layer.image())?;
        self.result_preview = Some(self.registry.create(bytes, "image/png")?);
        self.foreground = Some(layer);
        Ok(())
    }

    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        result.map_err(|e| self.fail(e))
    }

    /// Remember the error as the one to show, replacing any earlier one
    fn fail(&mut self, error: BgComposerError) -> BgComposerError {
        if error.is_user_visible() {
            warn!(error = %error, "session operation failed");
            self.progress.report_error(&error.to_string());
            self.last_error = Some(error.to_string());
        }
        error
    }

    #[must_use]
    pub fn source(&self) -> Option<&SourceImage> {
        self.source.as_ref()
    }

    #[must_use]
    pub fn foreground(&self) -> Option<&ForegroundLayer> {
        self.foreground.as_ref()
    }

    #[must_use]
    pub fn placement(&self) -> &PlacementState {
        &self.placement
    }

    #[must_use]
    pub fn background(&self) -> &BackgroundSpec {
        &self.background
    }

    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.pending.is_some()
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Message of the most recent user-visible failure
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    #[must_use]
    pub fn last_timings(&self) -> Option<&ProcessingTimings> {
        self.last_timings.as_ref()
    }

    #[must_use]
    pub fn source_preview_url(&self) -> Option<&str> {
        self.source_preview.as_ref().map(BlobHandle::url)
    }

    #[must_use]
    pub fn result_preview_url(&self) -> Option<&str> {
        self.result_preview.as_ref().map(BlobHandle::url)
    }

    #[must_use]
    pub fn registry(&self) -> &ObjectUrlRegistry {
        &self.registry
    }
}

impl std::fmt::Debug for EditingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditingSession")
            .field("generation", &self.generation)
            .field("pending", &self.pending)
            .field("has_source", &self.source.is_some())
            .field("has_foreground", &self.foreground.is_some())
            .field("background", &self.background)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}
