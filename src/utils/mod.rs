//! Shared helpers: colors, the foreground filter chain and data URLs

pub mod color;
pub mod data_url;
pub mod effects;

pub use color::Color;
pub use effects::{apply_color_effects, gaussian_blur, premultiply, unpremultiply, ColorAdjustments};
