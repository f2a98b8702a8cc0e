//! Drawing the placed foreground onto a prepared surface
//!
//! The foreground is filtered, resized to its placement rectangle, optionally
//! blurred, then warped around the rectangle's center (rotation first, flips
//! second) and alpha-blended over whatever the surface already holds. Nothing
//! here mutates the foreground layer, and each draw starts from the identity
//! transform.

use crate::{
    error::{BgComposerError, Result},
    placement::{PlacementRect, PlacementState},
    types::{CompositeSurface, ForegroundLayer},
    utils::effects::{apply_color_effects, gaussian_blur, premultiply, unpremultiply},
};
use image::{imageops::FilterType, Rgba, RgbaImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use tracing::{debug, instrument};

/// Draw `foreground` onto `surface` according to `state`
///
/// Returns the placement rectangle that was used. A rectangle that rounds down
/// to zero width or height draws nothing.
#[instrument(skip_all, fields(surface = ?surface.dimensions(), scale = state.scale_percent()))]
pub fn draw_foreground(
    surface: &mut CompositeSurface,
    foreground: &ForegroundLayer,
    state: &PlacementState,
) -> Result<PlacementRect> {
    let rect = state.rect_for(foreground.dimensions(), surface.dimensions());
    if rect.is_empty() || foreground.width() == 0 || foreground.height() == 0 {
        debug!(?rect, "placement rectangle is empty, skipping foreground draw");
        return Ok(rect);
    }

    let effects = state.effects();
    let mut layer = apply_color_effects(foreground.image().clone(), &effects.color_adjustments());
    premultiply(&mut layer);

    let layer = image::imageops::resize(&layer, rect.width, rect.height, FilterType::Triangle);
    let (layer, blur_pad) = gaussian_blur(layer, effects.blur_px());
    // One transparent pixel of margin so bilinear sampling at the outer
    // rows and columns never falls off the layer
    let layer = pad_transparent(&layer, 1);
    let pad = blur_pad + 1;

    let projection = placement_projection(&rect, state, layer.dimensions(), pad);
    let Some(bounds) = destination_bounds(&projection, layer.dimensions(), surface.dimensions())
    else {
        debug!(?rect, "foreground lies entirely outside the surface");
        return Ok(rect);
    };

    let (bx, by, bw, bh) = bounds;
    let projection = projection.and_then(Projection::translate(-(bx as f32), -(by as f32)));
    let mut placed = RgbaImage::new(bw, bh);
    warp_into(
        &layer,
        &projection,
        Interpolation::Bilinear,
        Rgba([0, 0, 0, 0]),
        &mut placed,
    );
    unpremultiply(&mut placed);

    image::imageops::overlay(surface.image_mut(), &placed, i64::from(bx), i64::from(by));
    debug!(?rect, "foreground drawn");
    Ok(rect)
}

/// Source layer coordinates to surface coordinates
///
/// Pixel indices address pixel centers, so the layer's center sits at
/// `(w - 1) / 2` and the rectangle's center maps to `center - 0.5`.
fn placement_projection(
    rect: &PlacementRect,
    state: &PlacementState,
    layer: (u32, u32),
    pad: u32,
) -> Projection {
    debug_assert!(layer.0 >= rect.width + 2 * pad && layer.1 >= rect.height + 2 * pad);

    let (cx, cy) = rect.center();
    let half_w = (layer.0 as f32 - 1.0) / 2.0;
    let half_h = (layer.1 as f32 - 1.0) / 2.0;
    let sx = if state.flip_horizontal() { -1.0 } else { 1.0 };
    let sy = if state.flip_vertical() { -1.0 } else { 1.0 };

    let mut projection = Projection::translate(-half_w, -half_h).and_then(Projection::scale(sx, sy));
    if state.rotation_deg() != 0.0 {
        projection = projection.and_then(Projection::rotate(state.rotation_deg().to_radians()));
    }
    projection.and_then(Projection::translate(cx as f32 - 0.5, cy as f32 - 0.5))
}

fn pad_transparent(image: &RgbaImage, pad: u32) -> RgbaImage {
    let mut padded = RgbaImage::new(image.width() + pad * 2, image.height() + pad * 2);
    image::imageops::replace(&mut padded, image, i64::from(pad), i64::from(pad));
    padded
}

/// Integer bounding box `(x, y, w, h)` of the warped layer, clipped to the surface
fn destination_bounds(
    projection: &Projection,
    layer: (u32, u32),
    surface: (u32, u32),
) -> Option<(u32, u32, u32, u32)> {
    let (lw, lh) = (layer.0 as f32, layer.1 as f32);
    let corners = [(-0.5, -0.5), (lw - 0.5, -0.5), (-0.5, lh - 0.5), (lw - 0.5, lh - 0.5)];

    let (mut min_x, mut min_y) = (f32::INFINITY, f32::INFINITY);
    let (mut max_x, mut max_y) = (f32::NEG_INFINITY, f32::NEG_INFINITY);
    for (x, y) in corners {
        let (px, py) = *projection * (x, y);
        min_x = min_x.min(px);
        min_y = min_y.min(py);
        max_x = max_x.max(px);
        max_y = max_y.max(py);
    }

    let x0 = min_x.floor().max(0.0);
    let y0 = min_y.floor().max(0.0);
    let x1 = (max_x.ceil() + 1.0).min(surface.0 as f32);
    let y1 = (max_y.ceil() + 1.0).min(surface.1 as f32);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    Some((x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
}

/// Render a complete surface: background first, foreground on top
pub fn compose_onto(
    mut surface: CompositeSurface,
    foreground: &ForegroundLayer,
    state: &PlacementState,
) -> Result<CompositeSurface> {
    if surface.width() == 0 || surface.height() == 0 {
        return Err(BgComposerError::composition("drawing surface is unavailable"));
    }
    draw_foreground(&mut surface, foreground, state)?;
    Ok(surface)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placement::Effects;
    use crate::types::SegmentationSource;

    fn opaque_layer(width: u32, height: u32, color: [u8; 4]) -> ForegroundLayer {
        ForegroundLayer::new(
            RgbaImage::from_pixel(width, height, Rgba(color)),
            SegmentationSource::Local,
        )
    }

    fn white_surface(width: u32, height: u32) -> CompositeSurface {
        CompositeSurface::from_image(RgbaImage::from_pixel(width, height, Rgba([255; 4])))
    }

    #[test]
    fn test_unrotated_draw_fills_exact_rectangle() {
        let layer = opaque_layer(10, 10, [200, 0, 0, 255]);
        let mut surface = white_surface(100, 100);
        let state = PlacementState::default();

        let rect = draw_foreground(&mut surface, &layer, &state).unwrap();
        assert_eq!((rect.x, rect.y, rect.width, rect.height), (36.0, 64.0, 28, 28));

        for y in 0..100 {
            for x in 0..100 {
                let inside = (36..64).contains(&x) && (64..92).contains(&y);
                let expected = if inside { [200, 0, 0, 255] } else { [255; 4] };
                assert_eq!(surface.pixel(x, y).unwrap().0, expected, "({x},{y})");
            }
        }
    }

    #[test]
    fn test_flip_mirrors_content() {
        let mut img = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 255, 255]));
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        let layer = ForegroundLayer::new(img, SegmentationSource::Local);

        // 200 * 0.35 * 1.0 = 70 wide, 35 tall
        let state = PlacementState::default().with_scale(100.0);
        let mut plain = white_surface(200, 200);
        let rect = draw_foreground(&mut plain, &layer, &state).unwrap();
        let left = rect.x as u32 + 2;
        let row = rect.y as u32 + rect.height / 2;
        assert_eq!(plain.pixel(left, row).unwrap().0, [255, 0, 0, 255]);

        let mut flipped = white_surface(200, 200);
        draw_foreground(&mut flipped, &layer, &state.with_flip(true, false)).unwrap();
        assert_eq!(flipped.pixel(left, row).unwrap().0, [0, 0, 255, 255]);
    }

    #[test]
    fn test_half_turn_equals_double_flip() {
        let mut img = RgbaImage::from_pixel(4, 4, Rgba([0, 255, 0, 255]));
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        let layer = ForegroundLayer::new(img, SegmentationSource::Local);
        let state = PlacementState::default().with_scale(100.0);

        let mut rotated = white_surface(120, 120);
        draw_foreground(&mut rotated, &layer, &state.with_rotation(180.0)).unwrap();
        let mut flipped = white_surface(120, 120);
        draw_foreground(&mut flipped, &layer, &state.with_flip(true, true)).unwrap();

        let differing = rotated
            .image()
            .pixels()
            .zip(flipped.image().pixels())
            .filter(|(a, b)| a.0.iter().zip(b.0.iter()).any(|(x, y)| x.abs_diff(*y) > 2))
            .count();
        assert_eq!(differing, 0);
    }

    #[test]
    fn test_transparent_foreground_pixels_leave_background() {
        let layer = opaque_layer(10, 10, [0, 0, 0, 0]);
        let mut surface = white_surface(50, 50);
        draw_foreground(&mut surface, &layer, &PlacementState::default()).unwrap();
        assert!(surface.image().pixels().all(|p| p.0 == [255; 4]));
    }

    #[test]
    fn test_effects_apply_to_foreground_only() {
        let layer = opaque_layer(10, 10, [200, 100, 50, 255]);
        let mut surface = white_surface(100, 100);
        let state = PlacementState::default().with_effects(Effects::default().with_brightness(0.0));
        draw_foreground(&mut surface, &layer, &state).unwrap();
        assert_eq!(surface.pixel(50, 80).unwrap().0, [0, 0, 0, 255]);
        assert_eq!(surface.pixel(2, 2).unwrap().0, [255; 4]);
    }

    #[test]
    fn test_blur_spreads_past_rectangle() {
        let layer = opaque_layer(10, 10, [0, 0, 0, 255]);
        let mut surface = CompositeSurface::new(100, 100).unwrap();
        let state = PlacementState::default().with_effects(Effects::default().with_blur(2.0));
        let rect = draw_foreground(&mut surface, &layer, &state).unwrap();
        let outside = surface.pixel(rect.x as u32 - 2, rect.y as u32 + 10).unwrap();
        assert!(outside[3] > 0);
    }

    #[test]
    fn test_offsurface_and_empty_rects_draw_nothing() {
        let layer = opaque_layer(10, 10, [0, 0, 0, 255]);
        let mut surface = CompositeSurface::new(10, 10).unwrap();
        let state = PlacementState::default().with_scale(20.0);
        let rect = draw_foreground(&mut surface, &layer, &state).unwrap();
        assert!(rect.is_empty());
        assert_eq!(surface.transparent_pixel_count(), 100);
    }
}
