//! Placement state for the cutout and the geometry derived from it
//!
//! Every setter clamps into the supported range, so a `PlacementState` can
//! never hold an out-of-range value no matter how it was produced.

use crate::utils::effects::ColorAdjustments;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Horizontal nudge range, in percent-like units
pub const OFFSET_X_RANGE: RangeInclusive<f32> = -30.0..=30.0;
/// Vertical nudge range, in percent-like units
pub const OFFSET_Y_RANGE: RangeInclusive<f32> = -20.0..=20.0;
/// Foreground scale range in percent
pub const SCALE_RANGE: RangeInclusive<f32> = 20.0..=150.0;
/// Brightness, contrast and saturation range in percent
pub const COLOR_EFFECT_RANGE: RangeInclusive<f32> = 0.0..=200.0;
/// Blur radius range in pixels
pub const BLUR_RANGE: RangeInclusive<f32> = 0.0..=10.0;

/// Default foreground scale in percent
pub const DEFAULT_SCALE_PERCENT: f32 = 80.0;

/// Share of the surface width a foreground at 100% scale occupies
pub const BASE_WIDTH_FRACTION: f64 = 0.35;

fn clamp_to(value: f32, range: &RangeInclusive<f32>, fallback: f32) -> f32 {
    if value.is_nan() {
        return fallback;
    }
    value.clamp(*range.start(), *range.end())
}

/// Color filter chain applied to the foreground draw only
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Effects {
    brightness: f32,
    contrast: f32,
    saturation: f32,
    blur_px: f32,
}

impl Default for Effects {
    fn default() -> Self {
        Self {
            brightness: 100.0,
            contrast: 100.0,
            saturation: 100.0,
            blur_px: 0.0,
        }
    }
}

impl Effects {
    #[must_use]
    pub fn new(brightness: f32, contrast: f32, saturation: f32, blur_px: f32) -> Self {
        Self::default()
            .with_brightness(brightness)
            .with_contrast(contrast)
            .with_saturation(saturation)
            .with_blur(blur_px)
    }

    #[must_use]
    pub fn with_brightness(mut self, value: f32) -> Self {
        self.brightness = clamp_to(value, &COLOR_EFFECT_RANGE, 100.0);
        self
    }

    #[must_use]
    pub fn with_contrast(mut self, value: f32) -> Self {
        self.contrast = clamp_to(value, &COLOR_EFFECT_RANGE, 100.0);
        self
    }

    #[must_use]
    pub fn with_saturation(mut self, value: f32) -> Self {
        self.saturation = clamp_to(value, &COLOR_EFFECT_RANGE, 100.0);
        self
    }

    #[must_use]
    pub fn with_blur(mut self, px: f32) -> Self {
        self.blur_px = clamp_to(px, &BLUR_RANGE, 0.0);
        self
    }

    #[must_use]
    pub fn brightness(&self) -> f32 {
        self.brightness
    }

    #[must_use]
    pub fn contrast(&self) -> f32 {
        self.contrast
    }

    #[must_use]
    pub fn saturation(&self) -> f32 {
        self.saturation
    }

    #[must_use]
    pub fn blur_px(&self) -> f32 {
        self.blur_px
    }

    #[must_use]
    pub fn color_adjustments(&self) -> ColorAdjustments {
        ColorAdjustments {
            brightness: self.brightness,
            contrast: self.contrast,
            saturation: self.saturation,
        }
    }

    /// True when drawing with these effects leaves colors untouched
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.color_adjustments().is_neutral() && self.blur_px == 0.0
    }

    /// CSS-style filter string, useful for previews and logs
    #[must_use]
    pub fn filter_string(&self) -> String {
        format!(
            "brightness({}%) contrast({}%) saturate({}%) blur({}px)",
            self.brightness, self.contrast, self.saturation, self.blur_px
        )
    }

    fn clamped(self) -> Self {
        Self::new(self.brightness, self.contrast, self.saturation, self.blur_px)
    }
}

/// User-adjustable geometry and filters for one foreground
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawPlacement")]
pub struct PlacementState {
    offset_x: f32,
    offset_y: f32,
    rotation_deg: f32,
    scale_percent: f32,
    flip_horizontal: bool,
    flip_vertical: bool,
    effects: Effects,
}

/// Unvalidated wire form; converted through the clamping setters
#[derive(Deserialize)]
#[serde(default)]
struct RawPlacement {
    offset_x: f32,
    offset_y: f32,
    rotation_deg: f32,
    scale_percent: f32,
    flip_horizontal: bool,
    flip_vertical: bool,
    effects: Effects,
}

impl Default for RawPlacement {
    fn default() -> Self {
        let state = PlacementState::default();
        Self {
            offset_x: state.offset_x,
            offset_y: state.offset_y,
            rotation_deg: state.rotation_deg,
            scale_percent: state.scale_percent,
            flip_horizontal: state.flip_horizontal,
            flip_vertical: state.flip_vertical,
            effects: state.effects,
        }
    }
}

impl From<RawPlacement> for PlacementState {
    fn from(raw: RawPlacement) -> Self {
        PlacementState::default()
            .with_offset(raw.offset_x, raw.offset_y)
            .with_rotation(raw.rotation_deg)
            .with_scale(raw.scale_percent)
            .with_flip(raw.flip_horizontal, raw.flip_vertical)
            .with_effects(raw.effects.clamped())
    }
}

impl Default for PlacementState {
    fn default() -> Self {
        Self {
            offset_x: 0.0,
            offset_y: 0.0,
            rotation_deg: 0.0,
            scale_percent: DEFAULT_SCALE_PERCENT,
            flip_horizontal: false,
            flip_vertical: false,
            effects: Effects::default(),
        }
    }
}

impl PlacementState {
    #[must_use]
    pub fn with_offset(mut self, x: f32, y: f32) -> Self {
        self.set_offset(x, y);
        self
    }

    #[must_use]
    pub fn with_rotation(mut self, degrees: f32) -> Self {
        self.set_rotation(degrees);
        self
    }

    #[must_use]
    pub fn with_scale(mut self, percent: f32) -> Self {
        self.set_scale(percent);
        self
    }

    #[must_use]
    pub fn with_flip(mut self, horizontal: bool, vertical: bool) -> Self {
        self.flip_horizontal = horizontal;
        self.flip_vertical = vertical;
        self
    }

    #[must_use]
    pub fn with_effects(mut self, effects: Effects) -> Self {
        self.effects = effects;
        self
    }

    /// Set both offsets, clamping x into `[-30, 30]` and y into `[-20, 20]`
    pub fn set_offset(&mut self, x: f32, y: f32) {
        self.offset_x = clamp_to(x, &OFFSET_X_RANGE, 0.0);
        self.offset_y = clamp_to(y, &OFFSET_Y_RANGE, 0.0);
    }

    /// Rotation is unbounded; non-finite input resets it to zero
    pub fn set_rotation(&mut self, degrees: f32) {
        self.rotation_deg = if degrees.is_finite() { degrees } else { 0.0 };
    }

    pub fn set_scale(&mut self, percent: f32) {
        self.scale_percent = clamp_to(percent, &SCALE_RANGE, DEFAULT_SCALE_PERCENT);
    }

    pub fn toggle_flip_horizontal(&mut self) {
        self.flip_horizontal = !self.flip_horizontal;
    }

    pub fn toggle_flip_vertical(&mut self) {
        self.flip_vertical = !self.flip_vertical;
    }

    pub fn set_effects(&mut self, effects: Effects) {
        self.effects = effects;
    }

    #[must_use]
    pub fn offset_x(&self) -> f32 {
        self.offset_x
    }

    #[must_use]
    pub fn offset_y(&self) -> f32 {
        self.offset_y
    }

    #[must_use]
    pub fn rotation_deg(&self) -> f32 {
        self.rotation_deg
    }

    #[must_use]
    pub fn scale_percent(&self) -> f32 {
        self.scale_percent
    }

    #[must_use]
    pub fn flip_horizontal(&self) -> bool {
        self.flip_horizontal
    }

    #[must_use]
    pub fn flip_vertical(&self) -> bool {
        self.flip_vertical
    }

    #[must_use]
    pub fn effects(&self) -> &Effects {
        &self.effects
    }

    /// Rectangle the foreground occupies on a `surface` sized target
    #[must_use]
    pub fn rect_for(&self, foreground: (u32, u32), surface: (u32, u32)) -> PlacementRect {
        PlacementRect::compute(foreground, surface, self)
    }
}

/// On-surface rectangle of the foreground before rotation and flips
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementRect {
    /// Left edge; fractional when offsets are fractional
    pub x: f64,
    /// Top edge
    pub y: f64,
    pub width: u32,
    pub height: u32,
}

impl PlacementRect {
    /// Horizontally centered, bottom-aligned with a margin, then nudged by the offsets
    #[must_use]
    pub fn compute(foreground: (u32, u32), surface: (u32, u32), state: &PlacementState) -> Self {
        let (fw, fh) = (f64::from(foreground.0), f64::from(foreground.1));
        let (sw, sh) = (f64::from(surface.0), f64::from(surface.1));

        let width = (sw * BASE_WIDTH_FRACTION * f64::from(state.scale_percent) / 100.0).floor();
        let height = if fw > 0.0 {
            (width * (fh / fw)).floor()
        } else {
            0.0
        };

        let margin = (sh * 0.04).floor().max(8.0);
        let x = ((sw - width) / 2.0).floor() + f64::from(state.offset_x) * 2.0;
        let y = (sh - height - margin).floor() + f64::from(state.offset_y) * 2.0;

        Self {
            x,
            y,
            width: width.max(0.0) as u32,
            height: height.max(0.0) as u32,
        }
    }

    /// Center point, the origin rotation and flips are applied around
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (
            self.x + f64::from(self.width) / 2.0,
            self.y + f64::from(self.height) / 2.0,
        )
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Pointer drag translating into offset changes
///
/// Lives in the input adapter; the core only ever sees the clamped
/// `PlacementState` snapshots it produces.
#[derive(Debug, Clone, Copy)]
pub struct DragGesture {
    origin: (f32, f32),
    container: (f32, f32),
    start: PlacementState,
}

impl DragGesture {
    /// Start a drag at pointer `origin` inside a `container` of the given size
    #[must_use]
    pub fn begin(origin: (f32, f32), container: (f32, f32), start: PlacementState) -> Self {
        Self {
            origin,
            container: (container.0.max(1.0), container.1.max(1.0)),
            start,
        }
    }

    /// Snapshot for the pointer at `point`; deltas are percent of the container
    #[must_use]
    pub fn update(&self, point: (f32, f32)) -> PlacementState {
        let dx = (point.0 - self.origin.0) / self.container.0 * 100.0;
        let dy = (point.1 - self.origin.1) / self.container.1 * 100.0;
        self.start
            .with_offset(self.start.offset_x + dx, self.start.offset_y + dy)
    }

    #[must_use]
    pub fn start(&self) -> &PlacementState {
        &self.start
    }
}
