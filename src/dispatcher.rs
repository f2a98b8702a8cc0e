//! Remote-first segmentation with local fallback
//!
//! The dispatcher walks an ordered list of [`SegmentationAttempt`]s and stops
//! at the first success. Failures of every attempt but the last are logged
//! and swallowed; only the last attempt's error reaches the caller. Nothing is
//! retried.

use crate::{
    compositor,
    config::{ComposerConfig, SegmentationConfig},
    error::{BgComposerError, Result},
    remote::RemoteClient,
    segmentation::segment_with,
    services::{ImageLoader, ProcessingStage, ProgressTracker},
    types::{ForegroundLayer, ProcessingTimings, SegmentationSource, SourceImage},
};
use async_trait::async_trait;
use instant::Instant;
use tracing::{info, instrument, warn};

/// Visited states of one dispatch, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Initial,
    AttemptRemote,
    RemoteOk,
    RemoteFailed,
    AttemptLocal,
    LocalOk,
    LocalFailed,
    Done,
    Error,
}

impl DispatchState {
    /// `(attempting, succeeded, failed)` states for an attempt's source
    fn for_source(source: SegmentationSource) -> (Self, Self, Self) {
        match source {
            SegmentationSource::Remote => (Self::AttemptRemote, Self::RemoteOk, Self::RemoteFailed),
            SegmentationSource::Local | SegmentationSource::Editor => {
                (Self::AttemptLocal, Self::LocalOk, Self::LocalFailed)
            },
        }
    }
}

/// One way of turning a source image into a foreground layer
#[async_trait]
pub trait SegmentationAttempt: Send + Sync {
    /// Which path this attempt represents
    fn source(&self) -> SegmentationSource;

    async fn attempt(&self, image: &SourceImage) -> Result<ForegroundLayer>;
}

/// Submit the original upload to the remote service
#[derive(Debug)]
pub struct RemoteAttempt {
    client: RemoteClient,
}

impl RemoteAttempt {
    #[must_use]
    pub fn new(client: RemoteClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SegmentationAttempt for RemoteAttempt {
    fn source(&self) -> SegmentationSource {
        SegmentationSource::Remote
    }

    async fn attempt(&self, image: &SourceImage) -> Result<ForegroundLayer> {
        self.client.remove_background(image).await
    }
}

/// Run the local segmentation engine and mask compositor
#[derive(Debug, Clone, Default)]
pub struct LocalAttempt {
    config: SegmentationConfig,
}

impl LocalAttempt {
    #[must_use]
    pub fn new(config: SegmentationConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SegmentationAttempt for LocalAttempt {
    fn source(&self) -> SegmentationSource {
        SegmentationSource::Local
    }

    async fn attempt(&self, image: &SourceImage) -> Result<ForegroundLayer> {
        let mask = segment_with(image.as_raw(), image.width(), image.height(), &self.config)?;
        compositor::compose(image, mask)
    }
}

/// Result of a successful dispatch
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub layer: ForegroundLayer,
    pub source: SegmentationSource,
    pub states: Vec<DispatchState>,
    pub timings: ProcessingTimings,
}

/// Ordered fallback chain of segmentation attempts
pub struct SegmentationDispatcher {
    attempts: Vec<Box<dyn SegmentationAttempt>>,
}

impl SegmentationDispatcher {
    #[must_use]
    pub fn new(attempts: Vec<Box<dyn SegmentationAttempt>>) -> Self {
        Self { attempts }
    }

    /// Remote attempt when an `http(s)` API base is configured, then local
    ///
    /// # Errors
    /// - `Remote` when the HTTP client cannot be built
    pub fn from_config(config: &ComposerConfig) -> Result<Self> {
        let mut attempts: Vec<Box<dyn SegmentationAttempt>> = Vec::with_capacity(2);
        if config.remote.is_configured() {
            let loader = ImageLoader::new(config.max_dimension);
            attempts.push(Box::new(RemoteAttempt::new(RemoteClient::new(&config.remote, loader)?)));
        }
        attempts.push(Box::new(LocalAttempt::new(config.segmentation.clone())));
        Ok(Self::new(attempts))
    }

    /// Local engine only
    #[must_use]
    pub fn local_only(config: SegmentationConfig) -> Self {
        Self::new(vec![Box::new(LocalAttempt::new(config))])
    }

    #[must_use]
    pub fn has_remote(&self) -> bool {
        self.attempts
            .iter()
            .any(|a| a.source() == SegmentationSource::Remote)
    }

    pub async fn dispatch(&self, image: &SourceImage) -> Result<DispatchOutcome> {
        self.dispatch_with_progress(image, &mut ProgressTracker::no_op())
            .await
    }

    /// Try each attempt in order, reporting a stage as each one starts
    ///
    /// # Errors
    /// - the last attempt's error when every attempt failed
    /// - `InvalidConfig` when the chain is empty
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub async fn dispatch_with_progress(
        &self,
        image: &SourceImage,
        progress: &mut ProgressTracker,
    ) -> Result<DispatchOutcome> {
        if self.attempts.is_empty() {
            return Err(BgComposerError::invalid_config("no segmentation attempts configured"));
        }

        let started = Instant::now();
        let mut states = vec![DispatchState::Initial];
        let mut timings = ProcessingTimings::default();
        let last = self.attempts.len() - 1;

        for (index, attempt) in self.attempts.iter().enumerate() {
            let source = attempt.source();
            let (attempting, succeeded, failed) = DispatchState::for_source(source);
            states.push(attempting);
            progress.report_stage(match source {
                SegmentationSource::Remote => ProcessingStage::RemoteSegmentation,
                _ => ProcessingStage::LocalSegmentation,
            });

            let attempt_started = Instant::now();
            let result = attempt.attempt(image).await;
            let elapsed = attempt_started.elapsed().as_millis() as u64;
            match source {
                SegmentationSource::Remote => timings.remote_ms = Some(elapsed),
                _ => timings.local_ms = Some(elapsed),
            }

            match result {
                Ok(layer) => {
                    states.extend([succeeded, DispatchState::Done]);
                    timings.total_ms = started.elapsed().as_millis() as u64;
                    info!(%source, total_ms = timings.total_ms, "segmentation finished");
                    return Ok(DispatchOutcome {
                        layer,
                        source,
                        states,
                        timings,
                    });
                },
                Err(e) if index < last => {
                    states.push(failed);
                    warn!(%source, error = %e, "segmentation attempt failed, falling back");
                },
                Err(e) => {
                    states.extend([failed, DispatchState::Error]);
                    progress.report_error(&e.to_string());
                    return Err(e);
                },
            }
        }

        Err(BgComposerError::invalid_state("segmentation chain ended without a result"))
    }
}

impl std::fmt::Debug for SegmentationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sources: Vec<SegmentationSource> = self.attempts.iter().map(|a| a.source()).collect();
        f.debug_struct("SegmentationDispatcher")
            .field("attempts", &sources)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FailingRemote {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SegmentationAttempt for FailingRemote {
        fn source(&self) -> SegmentationSource {
            SegmentationSource::Remote
        }

        async fn attempt(&self, _image: &SourceImage) -> Result<ForegroundLayer> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(BgComposerError::remote("connection refused"))
        }
    }

    struct FixedRemote;

    #[async_trait]
    impl SegmentationAttempt for FixedRemote {
        fn source(&self) -> SegmentationSource {
            SegmentationSource::Remote
        }

        async fn attempt(&self, image: &SourceImage) -> Result<ForegroundLayer> {
            Ok(ForegroundLayer::new(
                RgbaImage::from_pixel(image.width(), image.height(), Rgba([1, 2, 3, 4])),
                SegmentationSource::Remote,
            ))
        }
    }

    fn framed_square() -> SourceImage {
        let mut img = RgbaImage::from_pixel(8, 8, Rgba([255, 255, 255, 255]));
        for y in 2..6 {
            for x in 2..6 {
                img.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
        SourceImage::new(img)
    }

    #[tokio::test]
    async fn test_remote_failure_falls_back_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = SegmentationDispatcher::new(vec![
            Box::new(FailingRemote {
                calls: Arc::clone(&calls),
            }),
            Box::new(LocalAttempt::default()),
        ]);

        let outcome = dispatcher.dispatch(&framed_square()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.source, SegmentationSource::Local);
        assert_eq!(
            outcome.states,
            vec![
                DispatchState::Initial,
                DispatchState::AttemptRemote,
                DispatchState::RemoteFailed,
                DispatchState::AttemptLocal,
                DispatchState::LocalOk,
                DispatchState::Done,
            ]
        );
        assert!(outcome.timings.remote_ms.is_some());
        assert!(outcome.timings.local_ms.is_some());
    }

    #[tokio::test]
    async fn test_fallback_matches_direct_local_run() {
        let image = framed_square();
        let dispatcher = SegmentationDispatcher::new(vec![
            Box::new(FailingRemote {
                calls: Arc::new(AtomicUsize::new(0)),
            }),
            Box::new(LocalAttempt::default()),
        ]);
        let outcome = dispatcher.dispatch(&image).await.unwrap();

        let mask = segment_with(
            image.as_raw(),
            image.width(),
            image.height(),
            &SegmentationConfig::default(),
        )
        .unwrap();
        let direct = compositor::compose(&image, mask).unwrap();
        assert_eq!(outcome.layer.image().as_raw(), direct.image().as_raw());
    }

    #[tokio::test]
    async fn test_remote_success_short_circuits() {
        let dispatcher = SegmentationDispatcher::new(vec![
            Box::new(FixedRemote),
            Box::new(LocalAttempt::default()),
        ]);
        let outcome = dispatcher.dispatch(&framed_square()).await.unwrap();
        assert_eq!(outcome.source, SegmentationSource::Remote);
        assert_eq!(outcome.timings.local_ms, None);
        assert_eq!(outcome.states.last(), Some(&DispatchState::Done));
    }

    #[tokio::test]
    async fn test_local_failure_is_surfaced() {
        let config = SegmentationConfig {
            tolerance: -1.0,
            ..SegmentationConfig::default()
        };
        let dispatcher = SegmentationDispatcher::new(vec![
            Box::new(FailingRemote {
                calls: Arc::new(AtomicUsize::new(0)),
            }),
            Box::new(LocalAttempt::new(config)),
        ]);
        let err = dispatcher.dispatch(&framed_square()).await.unwrap_err();
        assert!(matches!(err, BgComposerError::Segmentation(_)));
        assert!(err.is_user_visible());
    }

    #[tokio::test]
    async fn test_empty_chain_is_rejected() {
        let dispatcher = SegmentationDispatcher::new(Vec::new());
        assert!(matches!(
            dispatcher.dispatch(&framed_square()).await,
            Err(BgComposerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_from_config_skips_unconfigured_remote() {
        let local = SegmentationDispatcher::from_config(&ComposerConfig::default()).unwrap();
        assert!(!local.has_remote());

        let config = ComposerConfig::builder()
            .api_base("http://localhost:9/api")
            .build()
            .unwrap();
        let both = SegmentationDispatcher::from_config(&config).unwrap();
        assert!(both.has_remote());
    }
}
