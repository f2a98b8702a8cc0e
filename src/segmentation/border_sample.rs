//! Global border-sample classification
//!
//! Samples background colors at evenly spaced points along the four edges and
//! classifies every pixel by its distance to the closest sample. There is no
//! connectivity check, so enclosed regions matching the background are
//! removed as well.
//!
//! Tolerance here is a percentage of the metric's largest distance and the
//! comparison is strict, so `28.0` accepts colors closer than about 123.7
//! Euclidean units and `0.0` accepts nothing.

use super::{max_distance, nearest_reference, Classification, PixelView, Segmenter};
use crate::config::{ReferenceSampling, SegmentationConfig, SegmentationStrategyKind};
use crate::error::Result;

/// Sample points per edge pair (top/bottom and left/right)
pub const SAMPLES_PER_EDGE: usize = 20;

/// Classification against colors sampled along the border
#[derive(Debug, Clone, Copy, Default)]
pub struct BorderSample;

impl Segmenter for BorderSample {
    fn kind(&self) -> SegmentationStrategyKind {
        SegmentationStrategyKind::BorderSample
    }

    fn classify(&self, view: &PixelView<'_>, config: &SegmentationConfig) -> Result<Classification> {
        let references = match &config.reference {
            ReferenceSampling::Explicit(colors) => colors.iter().map(|c| c.channels()).collect(),
            ReferenceSampling::BorderRing | ReferenceSampling::Corners => edge_samples(view),
        };

        let threshold = config.tolerance / 100.0 * max_distance(config.metric);
        let mut background = vec![false; view.len()];
        let mut estimate = vec![0u32; view.len()];
        for idx in 0..view.len() {
            let (reference, d) = nearest_reference(config.metric, view.rgb(idx), &references);
            if d < threshold {
                background[idx] = true;
                estimate[idx] = reference;
            }
        }

        Ok(Classification {
            background,
            estimate,
            references,
            threshold,
        })
    }
}

fn edge_samples(view: &PixelView<'_>) -> Vec<[u8; 3]> {
    let (w, h) = (view.width(), view.height());
    let mut samples = Vec::with_capacity(SAMPLES_PER_EDGE * 4);

    for i in 0..SAMPLES_PER_EDGE {
        let x = i * w / SAMPLES_PER_EDGE;
        samples.push(view.rgb(x));
        samples.push(view.rgb((h - 1) * w + x));
    }
    for i in 0..SAMPLES_PER_EDGE {
        let y = i * h / SAMPLES_PER_EDGE;
        samples.push(view.rgb(y * w));
        samples.push(view.rgb(y * w + w - 1));
    }

    samples.sort_unstable();
    samples.dedup();
    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enclosed_background_color_is_removed() {
        let mut pixels = vec![255u8; 5 * 5 * 4];
        for idx in [6, 7, 8, 11, 13, 16, 17, 18] {
            pixels[idx * 4..idx * 4 + 3].copy_from_slice(&[0, 0, 0]);
        }
        let view = PixelView::new(&pixels, 5, 5).unwrap();
        let config = SegmentationConfig {
            tolerance: 5.0,
            ..SegmentationConfig::default()
        };
        let classification = BorderSample.classify(&view, &config).unwrap();
        assert!(classification.background[12]);
        assert!(!classification.background[6]);
        assert_eq!(classification.background_count(), 17);
    }

    /// 5x5 light gray image with a darker gray center about 69 units away
    fn gray_center() -> Vec<u8> {
        let mut pixels: Vec<u8> = (0..25).flat_map(|_| [240, 240, 240, 255]).collect();
        pixels[12 * 4..12 * 4 + 3].copy_from_slice(&[200, 200, 200]);
        pixels
    }

    #[test]
    fn test_tolerance_is_a_percentage_of_max_distance() {
        let pixels = gray_center();
        let view = PixelView::new(&pixels, 5, 5).unwrap();

        let config = SegmentationConfig::default();
        let classification = BorderSample.classify(&view, &config).unwrap();
        assert!(classification.background[12]);
        assert!((classification.threshold - 123.67).abs() < 0.01);

        let config = SegmentationConfig {
            tolerance: 15.0,
            ..SegmentationConfig::default()
        };
        let classification = BorderSample.classify(&view, &config).unwrap();
        assert!(!classification.background[12]);
        assert_eq!(classification.background_count(), 24);
    }

    #[test]
    fn test_default_tolerance_clears_nearby_gray() {
        let pixels = gray_center();
        let config = SegmentationConfig {
            strategy: SegmentationStrategyKind::BorderSample,
            ..SegmentationConfig::default()
        };
        let mask = super::super::segment_with(&pixels, 5, 5, &config).unwrap();
        assert_eq!(mask.data()[12], 0);
        assert!(mask.data().iter().all(|&a| a == 0));
    }

    #[test]
    fn test_comparison_is_strict() {
        let pixels = vec![90u8; 3 * 3 * 4];
        let view = PixelView::new(&pixels, 3, 3).unwrap();
        let config = SegmentationConfig {
            tolerance: 0.0,
            ..SegmentationConfig::default()
        };
        let classification = BorderSample.classify(&view, &config).unwrap();
        assert_eq!(classification.background_count(), 0);
    }

    #[test]
    fn test_edge_samples_are_deduplicated() {
        let pixels = vec![40u8; 30 * 30 * 4];
        let view = PixelView::new(&pixels, 30, 30).unwrap();
        assert_eq!(edge_samples(&view), vec![[40, 40, 40]]);
    }
}
