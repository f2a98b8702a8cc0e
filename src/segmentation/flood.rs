//! Border flood classification
//!
//! Seeds are border pixels that match a reference background color. The
//! flood expands through 4-neighbours whose color stays within tolerance of
//! the estimate carried by the pixel that reached them, so it cannot leak
//! across a high-contrast subject edge. Anything never reached is foreground.

use super::{nearest_reference, Classification, PixelView, Segmenter};
use crate::config::{ReferenceSampling, SegmentationConfig, SegmentationStrategyKind};
use crate::error::Result;
use std::collections::VecDeque;

/// Connectivity-based flood from the image border
#[derive(Debug, Clone, Copy, Default)]
pub struct BorderFlood;

impl Segmenter for BorderFlood {
    fn kind(&self) -> SegmentationStrategyKind {
        SegmentationStrategyKind::BorderFlood
    }

    fn classify(&self, view: &PixelView<'_>, config: &SegmentationConfig) -> Result<Classification> {
        let (references, seeds) = seed(view, config);
        Ok(flood(view, config, references, &seeds))
    }
}

/// Reference colors and `(pixel, reference)` seed pairs
fn seed(view: &PixelView<'_>, config: &SegmentationConfig) -> (Vec<[u8; 3]>, Vec<(usize, u32)>) {
    let ring = view.border_indices();

    let references: Vec<[u8; 3]> = match &config.reference {
        // Each border pixel is its own estimate
        ReferenceSampling::BorderRing => {
            let references = ring.iter().map(|&idx| view.rgb(idx)).collect();
            let seeds = ring.iter().enumerate().map(|(r, &idx)| (idx, r as u32)).collect();
            return (references, seeds);
        },
        ReferenceSampling::Corners => {
            let (w, h) = (view.width(), view.height());
            [0, w - 1, (h - 1) * w, h * w - 1]
                .into_iter()
                .map(|idx| view.rgb(idx))
                .collect()
        },
        ReferenceSampling::Explicit(colors) => colors.iter().map(|c| c.channels()).collect(),
    };

    let seeds = ring
        .into_iter()
        .filter_map(|idx| {
            let (reference, d) = nearest_reference(config.metric, view.rgb(idx), &references);
            (d <= config.tolerance).then_some((idx, reference))
        })
        .collect();

    (references, seeds)
}

fn flood(
    view: &PixelView<'_>,
    config: &SegmentationConfig,
    references: Vec<[u8; 3]>,
    seeds: &[(usize, u32)],
) -> Classification {
    let (w, h) = (view.width(), view.height());
    let mut background = vec![false; view.len()];
    let mut estimate = vec![0u32; view.len()];
    let mut queue = VecDeque::with_capacity(seeds.len());

    for &(idx, reference) in seeds {
        if !background[idx] {
            background[idx] = true;
            estimate[idx] = reference;
            queue.push_back(idx);
        }
    }

    while let Some(idx) = queue.pop_front() {
        let (x, y) = (idx % w, idx / w);
        let reference = estimate[idx];
        let color = references[reference as usize];

        let neighbors = [
            (x > 0).then(|| idx - 1),
            (x + 1 < w).then(|| idx + 1),
            (y > 0).then(|| idx - w),
            (y + 1 < h).then(|| idx + w),
        ];

        for next in neighbors.into_iter().flatten() {
            if background[next] {
                continue;
            }
            if super::distance(config.metric, view.rgb(next), color) <= config.tolerance {
                background[next] = true;
                estimate[next] = reference;
                queue.push_back(next);
            }
        }
    }

    Classification {
        background,
        estimate,
        references,
        threshold: config.tolerance,
    }
}
