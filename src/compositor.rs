//! Mask compositor: source colors plus segmentation alpha

use crate::{
    error::{BgComposerError, Result},
    types::{AlphaMask, ForegroundLayer, SegmentationSource, SourceImage},
};
use image::{Luma, Rgba, RgbaImage};
use imageproc::map::map_colors2;

/// Merge the source RGB with the mask alpha into a foreground layer
///
/// RGB passes through unchanged and alpha is replaced pixel-for-pixel. The
/// mask is consumed.
///
/// # Errors
/// - `Composition` when the mask was derived from an image of a different size
pub fn compose(source: &SourceImage, mask: AlphaMask) -> Result<ForegroundLayer> {
    let image = apply_mask(source.pixels(), mask)?;
    Ok(ForegroundLayer::new(image, SegmentationSource::Local))
}

/// Replace the alpha channel of `pixels` with `mask`
pub fn apply_mask(pixels: &RgbaImage, mask: AlphaMask) -> Result<RgbaImage> {
    if pixels.dimensions() != mask.dimensions() {
        let (mw, mh) = mask.dimensions();
        return Err(BgComposerError::stage_error(
            "mask composition",
            &format!("mask is {}x{}", mw, mh),
            Some(&format!("{}x{} image", pixels.width(), pixels.height())),
        ));
    }

    let mask = mask.to_image()?;
    Ok(map_colors2(pixels, &mask, |Rgba([r, g, b, _]), Luma([alpha])| {
        Rgba([r, g, b, alpha])
    }))
}
