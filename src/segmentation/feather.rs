//! Edge feathering
//!
//! Foreground pixels within `feather_radius` (chessboard distance) of the
//! background form the band. Each takes the background estimate of its
//! nearest background pixel and ramps its alpha by how far its color sits
//! between that estimate and the most subject-like color around it. Uniform
//! subjects on uniform backgrounds therefore stay binary while blended edge
//! pixels get intermediate values.

use super::{distance, Classification, PixelView};
use crate::config::SegmentationConfig;
use std::collections::VecDeque;

const NEIGHBORS_8: [(isize, isize); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Turn a classification into alpha values
pub(super) fn refine(
    view: &PixelView<'_>,
    classification: &Classification,
    config: &SegmentationConfig,
) -> Vec<u8> {
    let background = &classification.background;
    let mut mask: Vec<u8> = background.iter().map(|&bg| if bg { 0 } else { 255 }).collect();

    let radius = config.feather_radius;
    if radius == 0 || background.iter().all(|&bg| bg) || !background.iter().any(|&bg| bg) {
        return mask;
    }

    let (band_distance, owner) = band(view, background, radius);

    for idx in 0..view.len() {
        if background[idx] || band_distance[idx] == 0 || band_distance[idx] > radius {
            continue;
        }

        let reference = classification.estimate_of(owner[idx]);
        let own = distance(config.metric, view.rgb(idx), reference);
        if own <= classification.threshold {
            mask[idx] = 0;
            continue;
        }

        let strongest = neighbors(view, idx)
            .filter(|&n| !background[n])
            .map(|n| distance(config.metric, view.rgb(n), reference))
            .fold(own, f32::max);

        let cutoff = classification.threshold;
        let ramp = ((own - cutoff) / (strongest - cutoff)).clamp(0.0, 1.0);
        mask[idx] = (ramp * 255.0).round() as u8;
    }

    mask
}

/// Chessboard distance to the nearest background pixel (capped past `radius`)
/// and that pixel's index, via a multi-source BFS
fn band(view: &PixelView<'_>, background: &[bool], radius: u32) -> (Vec<u32>, Vec<usize>) {
    let mut dist = vec![u32::MAX; view.len()];
    let mut owner = vec![0usize; view.len()];
    let mut queue = VecDeque::new();

    for idx in 0..view.len() {
        if background[idx] {
            dist[idx] = 0;
            owner[idx] = idx;
            if neighbors(view, idx).any(|n| !background[n]) {
                queue.push_back(idx);
            }
        }
    }

    while let Some(idx) = queue.pop_front() {
        let next_dist = dist[idx] + 1;
        if next_dist > radius {
            continue;
        }
        for n in neighbors(view, idx) {
            if dist[n] == u32::MAX {
                dist[n] = next_dist;
                owner[n] = owner[idx];
                queue.push_back(n);
            }
        }
    }

    (dist, owner)
}

fn neighbors<'a>(view: &'a PixelView<'_>, idx: usize) -> impl Iterator<Item = usize> + 'a {
    let (w, h) = (view.width() as isize, view.height() as isize);
    let (x, y) = ((idx % view.width()) as isize, (idx / view.width()) as isize);
    NEIGHBORS_8.iter().filter_map(move |&(dx, dy)| {
        let (nx, ny) = (x + dx, y + dy);
        (nx >= 0 && ny >= 0 && nx < w && ny < h).then(|| (ny * w + nx) as usize)
    })
}
