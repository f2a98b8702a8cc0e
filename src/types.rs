//! Core types for segmentation and compositing

use crate::error::{BgComposerError, Result};
use image::{GenericImageView, ImageBuffer, ImageFormat, Luma, RgbaImage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Decoded input image, immutable once created
///
/// Pixels are shared behind an `Arc` so the session, the dispatcher and any
/// in-flight remote upload can hold the same buffer without copying.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pixels: Arc<RgbaImage>,
    original_bytes: Option<Arc<[u8]>>,
    original_format: Option<ImageFormat>,
    original_dimensions: (u32, u32),
}

impl SourceImage {
    /// Wrap an already decoded raster
    #[must_use]
    pub fn new(pixels: RgbaImage) -> Self {
        let original_dimensions = pixels.dimensions();
        Self {
            pixels: Arc::new(pixels),
            original_bytes: None,
            original_format: None,
            original_dimensions,
        }
    }

    /// Wrap a raster decoded from `bytes`, keeping the encoded upload around
    #[must_use]
    pub fn with_original(
        pixels: RgbaImage,
        original_bytes: Arc<[u8]>,
        original_format: Option<ImageFormat>,
        original_dimensions: (u32, u32),
    ) -> Self {
        Self {
            pixels: Arc::new(pixels),
            original_bytes: Some(original_bytes),
            original_format,
            original_dimensions,
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Dimensions of the upload before any downscaling
    #[must_use]
    pub fn original_dimensions(&self) -> (u32, u32) {
        self.original_dimensions
    }

    #[must_use]
    pub fn was_downscaled(&self) -> bool {
        self.original_dimensions != self.dimensions()
    }

    #[must_use]
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Interleaved RGBA bytes, `width * height * 4` long
    #[must_use]
    pub fn as_raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    #[must_use]
    pub fn original_bytes(&self) -> Option<&[u8]> {
        self.original_bytes.as_deref()
    }

    #[must_use]
    pub fn original_format(&self) -> Option<ImageFormat> {
        self.original_format
    }
}

/// Per-pixel opacity values, one byte per pixel
///
/// `0` is fully background, `255` fully foreground. The length always equals
/// `width * height`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawAlphaMask")]
pub struct AlphaMask {
    data: Vec<u8>,
    dimensions: (u32, u32),
}

/// Unchecked wire form; deserialization goes through [`AlphaMask::new`]
#[derive(Deserialize)]
struct RawAlphaMask {
    data: Vec<u8>,
    dimensions: (u32, u32),
}

impl TryFrom<RawAlphaMask> for AlphaMask {
    type Error = BgComposerError;

    fn try_from(raw: RawAlphaMask) -> Result<Self> {
        Self::new(raw.data, raw.dimensions)
    }
}

impl AlphaMask {
    /// Create a mask, rejecting data whose length does not match the dimensions
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Result<Self> {
        let expected = dimensions.0 as usize * dimensions.1 as usize;
        if data.len() != expected {
            return Err(BgComposerError::segmentation(format!(
                "mask length {} does not match {}x{} ({} pixels)",
                data.len(),
                dimensions.0,
                dimensions.1,
                expected
            )));
        }
        Ok(Self { data, dimensions })
    }

    /// A mask with every pixel set to `value`
    #[must_use]
    pub fn filled(dimensions: (u32, u32), value: u8) -> Self {
        Self {
            data: vec![value; dimensions.0 as usize * dimensions.1 as usize],
            dimensions,
        }
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Convert mask to a grayscale image
    pub fn to_image(&self) -> Result<ImageBuffer<Luma<u8>, Vec<u8>>> {
        let (width, height) = self.dimensions;
        ImageBuffer::from_raw(width, height, self.data.clone()).ok_or_else(|| {
            BgComposerError::segmentation("Failed to create image from mask data")
        })
    }

    /// Get mask statistics
    #[must_use]
    pub fn statistics(&self) -> MaskStatistics {
        let total_pixels = self.data.len();
        let background_pixels = self.data.iter().filter(|&&a| a == 0).count();
        let foreground_pixels = self.data.iter().filter(|&&a| a == 255).count();
        let feathered_pixels = total_pixels - background_pixels - foreground_pixels;
        let ratio = |n: usize| {
            if total_pixels == 0 {
                0.0
            } else {
                n as f32 / total_pixels as f32
            }
        };

        MaskStatistics {
            total_pixels,
            foreground_pixels,
            background_pixels,
            feathered_pixels,
            foreground_ratio: ratio(foreground_pixels),
            background_ratio: ratio(background_pixels),
        }
    }
}

/// Statistics about an alpha mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskStatistics {
    pub total_pixels: usize,
    /// Pixels with alpha 255
    pub foreground_pixels: usize,
    /// Pixels with alpha 0
    pub background_pixels: usize,
    /// Pixels with an intermediate alpha (feather band)
    pub feathered_pixels: usize,
    pub foreground_ratio: f32,
    pub background_ratio: f32,
}

/// Where a foreground layer came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationSource {
    /// Already-composited result from the remote segmentation service
    Remote,
    /// Local segmentation engine plus mask compositor
    Local,
    /// Replacement supplied by an external editor
    Editor,
}

impl std::fmt::Display for SegmentationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote => write!(f, "remote"),
            Self::Local => write!(f, "local"),
            Self::Editor => write!(f, "editor"),
        }
    }
}

/// RGBA cutout: source colors with the segmentation alpha
#[derive(Debug, Clone)]
pub struct ForegroundLayer {
    image: Arc<RgbaImage>,
    source: SegmentationSource,
}

impl ForegroundLayer {
    #[must_use]
    pub fn new(image: RgbaImage, source: SegmentationSource) -> Self {
        Self {
            image: Arc::new(image),
            source,
        }
    }

    #[must_use]
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    #[must_use]
    pub fn source(&self) -> SegmentationSource {
        self.source
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Alpha channel as a standalone mask
    #[must_use]
    pub fn alpha_mask(&self) -> AlphaMask {
        let data = self.image.pixels().map(|p| p[3]).collect();
        AlphaMask {
            data,
            dimensions: self.image.dimensions(),
        }
    }
}

/// Drawing surface combining a rendered background and the placed foreground
///
/// Built fresh for every export.
#[derive(Debug, Clone)]
pub struct CompositeSurface {
    image: RgbaImage,
}

impl CompositeSurface {
    /// Fully transparent surface
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(BgComposerError::composition(format!(
                "cannot allocate a {}x{} drawing surface",
                width, height
            )));
        }
        Ok(Self {
            image: RgbaImage::new(width, height),
        })
    }

    #[must_use]
    pub fn from_image(image: RgbaImage) -> Self {
        Self { image }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    #[must_use]
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbaImage {
        &mut self.image
    }

    #[must_use]
    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Number of pixels whose alpha is zero
    #[must_use]
    pub fn transparent_pixel_count(&self) -> usize {
        self.image.pixels().filter(|p| p[3] == 0).count()
    }

    #[must_use]
    pub fn is_fully_opaque(&self) -> bool {
        self.image.pixels().all(|p| p[3] == 255)
    }

    /// Pixel at `(x, y)`, if in bounds
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<image::Rgba<u8>> {
        self.image
            .in_bounds(x, y)
            .then(|| *self.image.get_pixel(x, y))
    }
}

/// Processing timings in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Time spent in the remote attempt (including failed attempts)
    pub remote_ms: Option<u64>,
    /// Local segmentation and mask composition
    pub local_ms: Option<u64>,
    pub total_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_mask_length_invariant() {
        assert!(AlphaMask::new(vec![0; 6], (3, 2)).is_ok());
        let err = AlphaMask::new(vec![0; 5], (3, 2)).unwrap_err();
        assert!(matches!(err, BgComposerError::Segmentation(_)));
    }

    #[test]
    fn test_mask_deserialization_checks_length() {
        let err = serde_json::from_str::<AlphaMask>(r#"{"data":[1,2,3,4,5,6,7],"dimensions":[2,2]}"#)
            .unwrap_err();
        assert!(err.to_string().contains("mask length 7"));

        let mask = AlphaMask::new(vec![0, 64, 128, 255], (2, 2)).unwrap();
        let json = serde_json::to_string(&mask).unwrap();
        assert_eq!(serde_json::from_str::<AlphaMask>(&json).unwrap(), mask);
    }

    #[test]
    fn test_mask_statistics() {
        let mask = AlphaMask::new(vec![0, 0, 128, 255], (2, 2)).unwrap();
        let stats = mask.statistics();
        assert_eq!(stats.total_pixels, 4);
        assert_eq!(stats.background_pixels, 2);
        assert_eq!(stats.foreground_pixels, 1);
        assert_eq!(stats.feathered_pixels, 1);
        assert!((stats.background_ratio - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_empty_mask_statistics() {
        let stats = AlphaMask::filled((0, 0), 0).statistics();
        assert_eq!(stats.total_pixels, 0);
        assert_eq!(stats.foreground_ratio, 0.0);
    }

    #[test]
    fn test_surface_rejects_zero_size() {
        assert!(matches!(
            CompositeSurface::new(0, 10),
            Err(BgComposerError::Composition(_))
        ));
    }

    #[test]
    fn test_foreground_alpha_mask() {
        let mut img = RgbaImage::from_pixel(2, 1, Rgba([10, 20, 30, 255]));
        img.put_pixel(1, 0, Rgba([10, 20, 30, 0]));
        let layer = ForegroundLayer::new(img, SegmentationSource::Local);
        assert_eq!(layer.alpha_mask().data(), &[255, 0]);
    }

    #[test]
    fn test_source_image_tracks_downscale() {
        let src = SourceImage::with_original(
            RgbaImage::new(4, 2),
            Arc::from(vec![1u8, 2, 3]),
            Some(ImageFormat::Png),
            (8, 4),
        );
        assert!(src.was_downscaled());
        assert_eq!(src.original_bytes(), Some(&[1u8, 2, 3][..]));
        assert!(!SourceImage::new(RgbaImage::new(4, 2)).was_downscaled());
    }
}
