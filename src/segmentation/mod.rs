//! Tolerance-based background segmentation
//!
//! The engine is a pure function of a pixel buffer, its dimensions and a
//! [`SegmentationConfig`]. Strategies classify every pixel as background or
//! foreground; a shared feathering pass then turns that classification into
//! an [`AlphaMask`].
//!
//! ```rust
//! use bg_composer::segmentation::segment;
//!
//! // 3x3 white frame around one red pixel
//! let mut pixels = vec![255u8; 3 * 3 * 4];
//! pixels[4 * 4..4 * 4 + 4].copy_from_slice(&[255, 0, 0, 255]);
//!
//! let mask = segment(&pixels, 3, 3, 0.0).unwrap();
//! assert_eq!(mask.data()[4], 255);
//! assert_eq!(mask.data().iter().filter(|&&a| a == 0).count(), 8);
//! ```

mod border_sample;
mod feather;
mod flood;

pub use border_sample::BorderSample;
pub use flood::BorderFlood;

use crate::{
    config::{ColorMetric, ReferenceSampling, SegmentationConfig, SegmentationStrategyKind},
    error::{BgComposerError, Result},
    types::AlphaMask,
};
use tracing::{debug, instrument};

/// Borrowed view over an interleaved RGBA buffer
#[derive(Debug, Clone, Copy)]
pub struct PixelView<'a> {
    pixels: &'a [u8],
    width: usize,
    height: usize,
}

impl<'a> PixelView<'a> {
    /// Wrap a buffer, checking that it holds exactly `width * height` RGBA pixels
    pub fn new(pixels: &'a [u8], width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| {
                BgComposerError::segmentation(format!("{}x{} overflows a pixel buffer", width, height))
            })?;

        if pixels.len() != expected {
            return Err(BgComposerError::segmentation(format!(
                "pixel buffer holds {} bytes, expected {} for {}x{} RGBA",
                pixels.len(),
                expected,
                width,
                height
            )));
        }

        Ok(Self {
            pixels,
            width: width as usize,
            height: height as usize,
        })
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// RGB of the pixel at linear index `idx`
    #[must_use]
    pub fn rgb(&self, idx: usize) -> [u8; 3] {
        let offset = idx * 4;
        [
            self.pixels[offset],
            self.pixels[offset + 1],
            self.pixels[offset + 2],
        ]
    }

    /// Linear indices of the outer border ring, each listed once, clockwise from the top-left
    #[must_use]
    pub fn border_indices(&self) -> Vec<usize> {
        let (w, h) = (self.width, self.height);
        if w == 0 || h == 0 {
            return Vec::new();
        }
        if h == 1 {
            return (0..w).collect();
        }
        if w == 1 {
            return (0..h).map(|y| y * w).collect();
        }

        let mut ring = Vec::with_capacity(2 * (w + h) - 4);
        ring.extend(0..w);
        ring.extend((1..h).map(|y| y * w + w - 1));
        ring.extend((0..w - 1).rev().map(|x| (h - 1) * w + x));
        ring.extend((1..h - 1).rev().map(|y| y * w));
        ring
    }
}

/// Per-pixel background/foreground decision plus the background color
/// estimate each background pixel was matched against
#[derive(Debug, Clone)]
pub struct Classification {
    /// `true` for background pixels
    pub background: Vec<bool>,
    /// Index into `references`; meaningful only where `background` is set
    pub estimate: Vec<u32>,
    /// Reference background colors
    pub references: Vec<[u8; 3]>,
    /// Distance in metric units below which a color counted as background
    pub threshold: f32,
}

impl Classification {
    /// Background color estimate attached to pixel `idx`
    #[must_use]
    pub fn estimate_of(&self, idx: usize) -> [u8; 3] {
        self.references[self.estimate[idx] as usize]
    }

    #[must_use]
    pub fn background_count(&self) -> usize {
        self.background.iter().filter(|&&bg| bg).count()
    }
}

/// A segmentation strategy
pub trait Segmenter: Send + Sync {
    /// Discriminator this strategy is selected by
    fn kind(&self) -> SegmentationStrategyKind;

    /// Classify every pixel of `view` as background or foreground
    fn classify(&self, view: &PixelView<'_>, config: &SegmentationConfig) -> Result<Classification>;
}

static BORDER_FLOOD: BorderFlood = BorderFlood;
static BORDER_SAMPLE: BorderSample = BorderSample;

/// Strategy implementation for a discriminator
#[must_use]
pub fn strategy(kind: SegmentationStrategyKind) -> &'static dyn Segmenter {
    match kind {
        SegmentationStrategyKind::BorderFlood => &BORDER_FLOOD,
        SegmentationStrategyKind::BorderSample => &BORDER_SAMPLE,
    }
}

/// Segment with default settings and the given tolerance
///
/// `tolerance` is a Euclidean RGB distance for the default border flood.
/// `0.0` only accepts exact matches of the border reference colors;
/// `f32::INFINITY` classifies the whole image as background. Border sampling
/// reads the same field as a percentage instead (see [`BorderSample`]).
pub fn segment(pixels: &[u8], width: u32, height: u32, tolerance: f32) -> Result<AlphaMask> {
    let config = SegmentationConfig {
        tolerance,
        ..SegmentationConfig::default()
    };
    segment_with(pixels, width, height, &config)
}

/// Segment an RGBA buffer with explicit settings
///
/// # Errors
/// - `Segmentation` when the buffer length does not match the dimensions, the
///   tolerance is negative or NaN, or an explicit reference list is empty
#[instrument(skip(pixels, config), fields(strategy = %config.strategy, tolerance = config.tolerance))]
pub fn segment_with(
    pixels: &[u8],
    width: u32,
    height: u32,
    config: &SegmentationConfig,
) -> Result<AlphaMask> {
    validate(config)?;
    let view = PixelView::new(pixels, width, height)?;

    if view.is_empty() {
        return AlphaMask::new(Vec::new(), (width, height));
    }

    let classification = strategy(config.strategy).classify(&view, config)?;
    if classification.background.len() != view.len() {
        return Err(BgComposerError::segmentation(format!(
            "{} produced {} classifications for {} pixels",
            config.strategy,
            classification.background.len(),
            view.len()
        )));
    }

    let mask = feather::refine(&view, &classification, config);
    debug!(
        background = classification.background_count(),
        total = view.len(),
        "segmentation finished"
    );
    AlphaMask::new(mask, (width, height))
}

fn validate(config: &SegmentationConfig) -> Result<()> {
    if config.tolerance.is_nan() || config.tolerance < 0.0 {
        return Err(BgComposerError::segmentation(format!(
            "tolerance must be a non-negative number, got {}",
            config.tolerance
        )));
    }
    if let ReferenceSampling::Explicit(colors) = &config.reference {
        if colors.is_empty() {
            return Err(BgComposerError::segmentation(
                "explicit reference sampling needs at least one color",
            ));
        }
    }
    Ok(())
}

/// Color distance between two RGB triples
#[must_use]
pub fn distance(metric: ColorMetric, a: [u8; 3], b: [u8; 3]) -> f32 {
    let dr = f32::from(a[0]) - f32::from(b[0]);
    let dg = f32::from(a[1]) - f32::from(b[1]);
    let db = f32::from(a[2]) - f32::from(b[2]);

    match metric {
        ColorMetric::Euclidean => (dr * dr + dg * dg + db * db).sqrt(),
        ColorMetric::Weighted => {
            let mean_r = (f32::from(a[0]) + f32::from(b[0])) / 2.0;
            let wr = 2.0 + mean_r / 256.0;
            let wb = 2.0 + (255.0 - mean_r) / 256.0;
            (wr * dr * dr + 4.0 * dg * dg + wb * db * db).sqrt()
        },
    }
}

/// Largest distance `metric` reports, between black and white
#[must_use]
pub fn max_distance(metric: ColorMetric) -> f32 {
    distance(metric, [0, 0, 0], [255, 255, 255])
}

/// Index and distance of the reference closest to `color`
///
/// `references` must not be empty.
pub(crate) fn nearest_reference(
    metric: ColorMetric,
    color: [u8; 3],
    references: &[[u8; 3]],
) -> (u32, f32) {
    let mut best = (0u32, f32::INFINITY);
    for (idx, reference) in references.iter().enumerate() {
        let d = distance(metric, color, *reference);
        if d < best.1 {
            best = (idx as u32, d);
            if d == 0.0 {
                break;
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::color::Color;
    use proptest::prelude::*;

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
        (0..width * height)
            .flat_map(|_| [rgb[0], rgb[1], rgb[2], 255])
            .collect()
    }

    fn paint_rect(pixels: &mut [u8], width: u32, x0: u32, y0: u32, x1: u32, y1: u32, rgb: [u8; 3]) {
        for y in y0..y1 {
            for x in x0..x1 {
                let offset = ((y * width + x) * 4) as usize;
                pixels[offset..offset + 4].copy_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
            }
        }
    }

    #[test]
    fn test_rectangle_boundary_is_exact_at_zero_tolerance() {
        let (w, h) = (12, 9);
        let mut pixels = solid(w, h, [30, 200, 40]);
        paint_rect(&mut pixels, w, 3, 2, 8, 7, [250, 250, 10]);

        // Border sampling compares strictly, so its smallest useful tolerance is above zero
        for (kind, tolerance) in [
            (SegmentationStrategyKind::BorderFlood, 0.0),
            (SegmentationStrategyKind::BorderSample, 1.0),
        ] {
            let config = SegmentationConfig {
                tolerance,
                strategy: kind,
                ..SegmentationConfig::default()
            };
            let mask = segment_with(&pixels, w, h, &config).unwrap();
            for y in 0..h {
                for x in 0..w {
                    let inside = (3..8).contains(&x) && (2..7).contains(&y);
                    let expected = if inside { 255 } else { 0 };
                    assert_eq!(mask.data()[(y * w + x) as usize], expected, "{kind} at ({x},{y})");
                }
            }
        }
    }

    #[test]
    fn test_two_by_two_with_white_reference() {
        let pixels = [
            255, 255, 255, 255, 255, 255, 255, 255, //
            0, 0, 0, 255, 0, 0, 0, 255,
        ];
        let config = SegmentationConfig {
            tolerance: 10.0,
            reference: ReferenceSampling::Explicit(vec![Color::WHITE]),
            ..SegmentationConfig::default()
        };
        let mask = segment_with(&pixels, 2, 2, &config).unwrap();
        assert_eq!(mask.data(), &[0, 0, 255, 255]);
    }

    #[test]
    fn test_unbounded_tolerance_clears_everything() {
        let mut pixels = solid(6, 6, [0, 0, 0]);
        paint_rect(&mut pixels, 6, 1, 1, 5, 5, [255, 255, 255]);
        let mask = segment(&pixels, 6, 6, f32::INFINITY).unwrap();
        assert!(mask.data().iter().all(|&a| a == 0));

        let mask = segment(&pixels, 6, 6, 1000.0).unwrap();
        assert!(mask.data().iter().all(|&a| a == 0));
    }

    #[test]
    fn test_invalid_inputs_are_segmentation_errors() {
        let pixels = solid(2, 2, [0, 0, 0]);
        assert!(matches!(
            segment(&pixels, 3, 2, 10.0),
            Err(BgComposerError::Segmentation(_))
        ));
        assert!(matches!(
            segment(&pixels, 2, 2, f32::NAN),
            Err(BgComposerError::Segmentation(_))
        ));
        assert!(matches!(
            segment(&pixels, 2, 2, -1.0),
            Err(BgComposerError::Segmentation(_))
        ));

        let config = SegmentationConfig {
            reference: ReferenceSampling::Explicit(vec![]),
            ..SegmentationConfig::default()
        };
        assert!(segment_with(&pixels, 2, 2, &config).is_err());
    }

    #[test]
    fn test_empty_image_gives_empty_mask() {
        let mask = segment(&[], 0, 0, 10.0).unwrap();
        assert!(mask.is_empty());
    }

    #[test]
    fn test_border_ring_order_and_uniqueness() {
        let pixels = solid(4, 3, [0, 0, 0]);
        let view = PixelView::new(&pixels, 4, 3).unwrap();
        assert_eq!(view.border_indices(), vec![0, 1, 2, 3, 7, 11, 10, 9, 8, 4]);

        let pixels = solid(1, 3, [0, 0, 0]);
        let view = PixelView::new(&pixels, 1, 3).unwrap();
        assert_eq!(view.border_indices(), vec![0, 1, 2]);
    }

    #[test]
    fn test_strategies_read_tolerance_in_their_own_units() {
        // 240 gray frame, 200 gray center: about 69.3 Euclidean units apart
        let mut pixels = solid(5, 5, [240, 240, 240]);
        paint_rect(&mut pixels, 5, 2, 2, 3, 3, [200, 200, 200]);

        let mask = segment(&pixels, 5, 5, 28.0).unwrap();
        assert_eq!(mask.data()[12], 255);
        let mask = segment(&pixels, 5, 5, 70.0).unwrap();
        assert_eq!(mask.data()[12], 0);

        let config = SegmentationConfig {
            tolerance: 28.0,
            strategy: SegmentationStrategyKind::BorderSample,
            ..SegmentationConfig::default()
        };
        let mask = segment_with(&pixels, 5, 5, &config).unwrap();
        assert_eq!(mask.data()[12], 0);
    }

    #[test]
    fn test_max_distance_per_metric() {
        assert!((max_distance(ColorMetric::Euclidean) - 441.673).abs() < 0.01);
        assert!(max_distance(ColorMetric::Weighted) > max_distance(ColorMetric::Euclidean));
    }

    #[test]
    fn test_distance_metrics() {
        let d = distance(ColorMetric::Euclidean, [0, 0, 0], [255, 255, 255]);
        assert!((d - 441.673).abs() < 0.01);
        assert_eq!(distance(ColorMetric::Weighted, [9, 9, 9], [9, 9, 9]), 0.0);
        assert!(distance(ColorMetric::Weighted, [0, 0, 0], [255, 255, 255]) > d);
    }

    proptest! {
        #[test]
        fn prop_mask_matches_dimensions(
            width in 1u32..12,
            height in 1u32..12,
            seed in any::<u64>(),
            tolerance in 0.0f32..500.0,
            sample in any::<bool>(),
        ) {
            let mut state = seed;
            let pixels: Vec<u8> = (0..width * height * 4)
                .map(|_| {
                    state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                    (state >> 56) as u8
                })
                .collect();
            let config = SegmentationConfig {
                tolerance,
                strategy: if sample {
                    SegmentationStrategyKind::BorderSample
                } else {
                    SegmentationStrategyKind::BorderFlood
                },
                ..SegmentationConfig::default()
            };
            let mask = segment_with(&pixels, width, height, &config).unwrap();
            prop_assert_eq!(mask.len(), (width * height) as usize);
            prop_assert_eq!(mask.dimensions(), (width, height));
        }

        #[test]
        fn prop_unfeathered_mask_is_binary(
            width in 1u32..10,
            height in 1u32..10,
            fill in any::<[u8; 3]>(),
            tolerance in 0.0f32..100.0,
        ) {
            let pixels = solid(width, height, fill);
            let config = SegmentationConfig {
                tolerance,
                feather_radius: 0,
                ..SegmentationConfig::default()
            };
            let mask = segment_with(&pixels, width, height, &config).unwrap();
            prop_assert!(mask.data().iter().all(|&a| a == 0 || a == 255));
        }
    }
}
