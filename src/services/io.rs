//! Image loading and downscaling service
//!
//! Decodes uploads into a `SourceImage` whose longer side never exceeds the
//! configured bound, so later per-pixel passes stay bounded in cost.

use crate::{
    config::DEFAULT_MAX_DIMENSION,
    error::{BgComposerError, Result},
    types::SourceImage,
};
use image::{imageops::FilterType, DynamicImage, ImageFormat, RgbaImage};
use std::path::Path;
use std::sync::Arc;

/// Service for decoding and bounding input images
#[derive(Debug, Clone, Copy)]
pub struct ImageLoader {
    max_dimension: u32,
}

impl Default for ImageLoader {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DIMENSION)
    }
}

impl ImageLoader {
    /// Create a loader with the given longest-side bound (minimum 1)
    #[must_use]
    pub fn new(max_dimension: u32) -> Self {
        Self {
            max_dimension: max_dimension.max(1),
        }
    }

    #[must_use]
    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    /// Decode raw image bytes into a bounded `SourceImage`
    ///
    /// The encoded bytes are retained so the remote service receives the
    /// original upload rather than the downscaled raster.
    ///
    /// # Errors
    /// - `Load` when the bytes are empty or cannot be decoded as an image
    pub fn load_from_bytes(&self, bytes: &[u8]) -> Result<SourceImage> {
        let (image, format) = decode(bytes)?;
        let original_dimensions = (image.width(), image.height());
        let pixels = self.bound(image.to_rgba8());

        log::debug!(
            "Loaded {:?} image {}x{} -> {}x{}",
            format,
            original_dimensions.0,
            original_dimensions.1,
            pixels.width(),
            pixels.height()
        );

        Ok(SourceImage::with_original(
            pixels,
            Arc::from(bytes),
            format,
            original_dimensions,
        ))
    }

    /// Load an image from a file path
    ///
    /// # Errors
    /// - `Io` when the file cannot be read
    /// - `Load` when its content is not a decodable image
    pub fn load_from_path<P: AsRef<Path>>(&self, path: P) -> Result<SourceImage> {
        let path_ref = path.as_ref();
        let data = std::fs::read(path_ref)
            .map_err(|e| BgComposerError::file_io_error("read image file", path_ref, &e))?;
        self.load_from_bytes(&data).map_err(|e| match e {
            BgComposerError::Load(msg) => {
                BgComposerError::load(format!("{} ({})", msg, path_ref.display()))
            },
            other => other,
        })
    }

    /// Load an image from an async reader
    ///
    /// # Examples
    /// ```rust,no_run
    /// use bg_composer::services::ImageLoader;
    /// use tokio::fs::File;
    ///
    /// # async fn example() -> anyhow::Result<()> {
    /// let file = File::open("portrait.jpg").await?;
    /// let source = ImageLoader::default().load_from_reader(file).await?;
    /// println!("{}x{}", source.width(), source.height());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn load_from_reader<R: tokio::io::AsyncRead + Unpin>(
        &self,
        mut reader: R,
    ) -> Result<SourceImage> {
        use tokio::io::AsyncReadExt;

        let mut buffer = Vec::new();
        AsyncReadExt::read_to_end(&mut reader, &mut buffer)
            .await
            .map_err(|e| BgComposerError::load(format!("Failed to read from stream: {}", e)))?;

        self.load_from_bytes(&buffer)
    }

    /// Decode bytes into a bounded RGBA raster without keeping the encoding
    ///
    /// Used for background assets and editor replacements.
    pub fn decode_rgba(&self, bytes: &[u8]) -> Result<RgbaImage> {
        let (image, _) = decode(bytes)?;
        Ok(self.bound(image.to_rgba8()))
    }

    /// Downscale so the longer side is at most `max_dimension`
    ///
    /// Returns the image unchanged when it already fits.
    #[must_use]
    pub fn bound(&self, image: RgbaImage) -> RgbaImage {
        let (width, height) = image.dimensions();
        match bounded_dimensions(width, height, self.max_dimension) {
            Some((new_width, new_height)) => {
                log::debug!(
                    "Downscaling {}x{} to {}x{} (max side {})",
                    width,
                    height,
                    new_width,
                    new_height,
                    self.max_dimension
                );
                image::imageops::resize(&image, new_width, new_height, FilterType::Lanczos3)
            },
            None => image,
        }
    }
}

/// Target dimensions when `(width, height)` exceeds `max_dimension`
///
/// The longer side becomes exactly `max_dimension`; the other side is
/// recomputed from the aspect ratio and rounded (never below 1).
#[must_use]
pub fn bounded_dimensions(width: u32, height: u32, max_dimension: u32) -> Option<(u32, u32)> {
    if width <= max_dimension && height <= max_dimension {
        return None;
    }

    let max = f64::from(max_dimension);
    if width > height {
        let new_height = (f64::from(height) * (max / f64::from(width))).round() as u32;
        Some((max_dimension, new_height.max(1)))
    } else {
        let new_width = (f64::from(width) * (max / f64::from(height))).round() as u32;
        Some((new_width.max(1), max_dimension))
    }
}

fn decode(bytes: &[u8]) -> Result<(DynamicImage, Option<ImageFormat>)> {
    if bytes.is_empty() {
        return Err(BgComposerError::load("image data is empty"));
    }

    let format = image::guess_format(bytes).ok();
    let image = image::load_from_memory(bytes).map_err(|e| {
        BgComposerError::load(format!(
            "Failed to decode image from bytes ({} bytes): {}",
            bytes.len(),
            e
        ))
    })?;

    if image.width() == 0 || image.height() == 0 {
        return Err(BgComposerError::load("decoded image has zero size"));
    }

    Ok((image, format))
}

/// MIME type for an encoded image format, used when uploading
#[must_use]
pub fn mime_type(format: Option<ImageFormat>) -> &'static str {
    match format {
        Some(ImageFormat::Png) => "image/png",
        Some(ImageFormat::Jpeg) => "image/jpeg",
        Some(ImageFormat::WebP) => "image/webp",
        Some(ImageFormat::Tiff) => "image/tiff",
        Some(ImageFormat::Gif) => "image/gif",
        Some(ImageFormat::Bmp) => "image/bmp",
        _ => "application/octet-stream",
    }
}
