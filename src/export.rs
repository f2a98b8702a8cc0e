//! Export serializer: PNG encoding and download delivery
//!
//! Encoded bytes are parked behind a [`BlobHandle`] while they are handed to
//! a [`DownloadSink`]. The handle is revoked as soon as delivery returns,
//! whether it succeeded or not, so repeated exports never accumulate buffers.

use crate::{
    error::{BgComposerError, Result},
    types::CompositeSurface,
};
use image::{ImageFormat, RgbaImage};
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

/// Prefix of every exported file name
pub const EXPORT_PREFIX: &str = "bg-removed-";

/// `bg-removed-<millis>.png`
#[must_use]
pub fn export_filename(timestamp_ms: i64) -> String {
    format!("{}{}.png", EXPORT_PREFIX, timestamp_ms)
}

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: AtomicU64,
    entries: Mutex<HashMap<u64, Arc<[u8]>>>,
}

impl RegistryInner {
    fn remove(&self, id: u64) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(&id);
        }
    }
}

/// Table of live transient byte handles (previews and pending downloads)
#[derive(Debug, Clone, Default)]
pub struct ObjectUrlRegistry {
    inner: Arc<RegistryInner>,
}

impl ObjectUrlRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `bytes` and return the handle that keeps them alive
    pub fn create(&self, bytes: impl Into<Arc<[u8]>>, media_type: &str) -> Result<BlobHandle> {
        let bytes = bytes.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .entries
            .lock()
            .map_err(|_| BgComposerError::invalid_state("object URL registry is poisoned"))?
            .insert(id, Arc::clone(&bytes));

        Ok(BlobHandle {
            id,
            url: format!("blob:bg-composer/{}", id),
            media_type: media_type.to_string(),
            bytes,
            registry: Arc::clone(&self.inner),
            revoked: false,
        })
    }

    /// Number of handles not yet revoked
    #[must_use]
    pub fn live_handles(&self) -> usize {
        self.inner.entries.lock().map_or(0, |e| e.len())
    }

    /// Whether `url` still resolves to bytes
    #[must_use]
    pub fn resolve(&self, url: &str) -> Option<Arc<[u8]>> {
        let id: u64 = url.strip_prefix("blob:bg-composer/")?.parse().ok()?;
        self.inner.entries.lock().ok()?.get(&id).cloned()
    }
}

/// Short-lived reference to encoded bytes, revoked on drop
#[derive(Debug)]
pub struct BlobHandle {
    id: u64,
    url: String,
    media_type: String,
    bytes: Arc<[u8]>,
    registry: Arc<RegistryInner>,
    revoked: bool,
}

impl BlobHandle {
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Release the handle now instead of at drop
    pub fn revoke(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.revoked {
            self.registry.remove(self.id);
            self.revoked = true;
            debug!(url = %self.url, "blob handle revoked");
        }
    }
}

impl Drop for BlobHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Where a finished export ends up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub filename: String,
    /// Location on disk, for sinks that write files
    pub path: Option<PathBuf>,
    pub size_bytes: usize,
    pub dimensions: (u32, u32),
}

/// Receives encoded exports
pub trait DownloadSink: Send + Sync {
    /// Deliver `blob` under `filename`, returning where it went
    fn deliver(&self, filename: &str, blob: &BlobHandle) -> Result<Option<PathBuf>>;
}

/// Writes exports into a directory, atomically via a temp file
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    #[must_use]
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DownloadSink for DirectorySink {
    fn deliver(&self, filename: &str, blob: &BlobHandle) -> Result<Option<PathBuf>> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| BgComposerError::export(format!("cannot create {}: {}", self.dir.display(), e)))?;

        let target = self.dir.join(filename);
        let mut temp = NamedTempFile::new_in(&self.dir)
            .map_err(|e| BgComposerError::export(format!("cannot create temp file: {}", e)))?;
        temp.write_all(blob.bytes())
            .and_then(|()| temp.flush())
            .map_err(|e| BgComposerError::export(format!("cannot write {}: {}", filename, e)))?;
        temp.persist(&target).map_err(|e| {
            BgComposerError::export(format!("cannot move export to {}: {}", target.display(), e.error))
        })?;

        Ok(Some(target))
    }
}

/// Keeps exports in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    artifacts: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivered `(filename, bytes)` pairs in order
    #[must_use]
    pub fn artifacts(&self) -> Vec<(String, Vec<u8>)> {
        self.artifacts.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

impl DownloadSink for MemorySink {
    fn deliver(&self, filename: &str, blob: &BlobHandle) -> Result<Option<PathBuf>> {
        self.artifacts
            .lock()
            .map_err(|_| BgComposerError::export("memory sink is poisoned"))?
            .push((filename.to_string(), blob.bytes().to_vec()));
        Ok(None)
    }
}

/// Encode a raster as PNG
///
/// # Errors
/// - `Export` when encoding fails
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| BgComposerError::export(format!("PNG encoding failed: {}", e)))?;
    Ok(bytes)
}

/// Flattens surfaces to PNG and hands them to a sink
pub struct ExportSerializer {
    registry: ObjectUrlRegistry,
    sink: Box<dyn DownloadSink>,
}

impl ExportSerializer {
    #[must_use]
    pub fn new(registry: ObjectUrlRegistry, sink: Box<dyn DownloadSink>) -> Self {
        Self { registry, sink }
    }

    #[must_use]
    pub fn registry(&self) -> &ObjectUrlRegistry {
        &self.registry
    }

    /// Export with a file name stamped from the current time
    pub fn export(&self, surface: &CompositeSurface) -> Result<ExportArtifact> {
        self.export_named(surface, &export_filename(chrono::Utc::now().timestamp_millis()))
    }

    /// Encode, deliver and release
    ///
    /// # Errors
    /// - `Export` when encoding or delivery fails; the transient handle is
    ///   released in either case
    #[instrument(skip(self, surface), fields(dimensions = ?surface.dimensions()))]
    pub fn export_named(&self, surface: &CompositeSurface, filename: &str) -> Result<ExportArtifact> {
        let bytes = encode_png(surface.image())?;
        let size_bytes = bytes.len();
        let handle = self.registry.create(bytes, "image/png")?;

        let delivered = self.sink.deliver(filename, &handle);
        handle.revoke();
        let path = delivered.map_err(|e| match e {
            BgComposerError::Export(_) => e,
            other => BgComposerError::export(other.to_string()),
        })?;

        info!(filename, size_bytes, "export delivered");
        Ok(ExportArtifact {
            filename: filename.to_string(),
            path,
            size_bytes,
            dimensions: surface.dimensions(),
        })
    }
}

impl std::fmt::Debug for ExportSerializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportSerializer")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
