//! Filter chain applied to the foreground draw
//!
//! Brightness, contrast and saturation follow the CSS filter function
//! definitions so a percentage of 100 is the identity. Blur is a Gaussian
//! whose standard deviation is the requested radius in pixels.

use image::{Rgba, RgbaImage};
use imageproc::map::map_colors;

const LUMA_R: f32 = 0.213;
const LUMA_G: f32 = 0.715;
const LUMA_B: f32 = 0.072;

/// Percentage multipliers around a neutral value of 100
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorAdjustments {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
}

impl ColorAdjustments {
    #[must_use]
    pub fn is_neutral(&self) -> bool {
        self.brightness == 100.0 && self.contrast == 100.0 && self.saturation == 100.0
    }

    /// Apply brightness, contrast then saturation to one straight-alpha pixel
    #[must_use]
    pub fn apply(&self, pixel: Rgba<u8>) -> Rgba<u8> {
        let Rgba([r, g, b, a]) = pixel;
        let brightness = self.brightness / 100.0;
        let contrast = self.contrast / 100.0;
        let s = self.saturation / 100.0;

        let adjust = |v: u8| {
            let v = f32::from(v) * brightness;
            let v = v.clamp(0.0, 255.0);
            ((v - 127.5) * contrast + 127.5).clamp(0.0, 255.0)
        };
        let (r, g, b) = (adjust(r), adjust(g), adjust(b));
        let to_u8 = |v: f32| v.round().clamp(0.0, 255.0) as u8;

        if s == 1.0 {
            return Rgba([to_u8(r), to_u8(g), to_u8(b), a]);
        }

        let sr = (LUMA_R + (1.0 - LUMA_R) * s) * r + (LUMA_G - LUMA_G * s) * g + (LUMA_B - LUMA_B * s) * b;
        let sg = (LUMA_R - LUMA_R * s) * r + (LUMA_G + (1.0 - LUMA_G) * s) * g + (LUMA_B - LUMA_B * s) * b;
        let sb = (LUMA_R - LUMA_R * s) * r + (LUMA_G - LUMA_G * s) * g + (LUMA_B + (1.0 - LUMA_B) * s) * b;

        Rgba([to_u8(sr), to_u8(sg), to_u8(sb), a])
    }
}

/// Apply color adjustments to every pixel, alpha untouched
#[must_use]
pub fn apply_color_effects(image: RgbaImage, adjustments: &ColorAdjustments) -> RgbaImage {
    if adjustments.is_neutral() {
        return image;
    }
    map_colors(&image, |pixel| adjustments.apply(pixel))
}

/// Gaussian blur with `sigma = radius`, padding so the blur can spill outward
///
/// Returns the blurred image and the padding added on each side. A radius of
/// zero (or less) returns the input unchanged with no padding. The input is
/// expected to be premultiplied so transparent pixels do not bleed color.
#[must_use]
pub fn gaussian_blur(image: RgbaImage, radius: f32) -> (RgbaImage, u32) {
    if radius.is_nan() || radius <= 0.0 || image.width() == 0 || image.height() == 0 {
        return (image, 0);
    }

    let pad = (radius * 3.0).ceil() as u32;
    let mut padded = RgbaImage::new(image.width() + pad * 2, image.height() + pad * 2);
    image::imageops::replace(&mut padded, &image, i64::from(pad), i64::from(pad));

    (imageproc::filter::gaussian_blur_f32(&padded, radius), pad)
}

/// Multiply color channels by alpha in place
pub fn premultiply(image: &mut RgbaImage) {
    for pixel in image.pixels_mut() {
        let alpha = u16::from(pixel[3]);
        if alpha == 255 {
            continue;
        }
        for channel in 0..3 {
            pixel[channel] = ((u16::from(pixel[channel]) * alpha + 127) / 255) as u8;
        }
    }
}

/// Divide color channels by alpha in place
pub fn unpremultiply(image: &mut RgbaImage) {
    for pixel in image.pixels_mut() {
        let alpha = u32::from(pixel[3]);
        match alpha {
            255 => {},
            0 => {
                pixel[0] = 0;
                pixel[1] = 0;
                pixel[2] = 0;
            },
            _ => {
                for channel in 0..3 {
                    let value = (u32::from(pixel[channel]) * 255 + alpha / 2) / alpha;
                    pixel[channel] = value.min(255) as u8;
                }
            },
        }
    }
}
