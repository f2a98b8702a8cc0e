//! Background variants, the built-in catalog and surface rendering
//!
//! A [`BackgroundSpec`] is rendered into a fresh [`CompositeSurface`] that the
//! foreground is then drawn onto. Fill variants size the surface from the
//! foreground; image variants use the asset's natural size.

use crate::{
    error::{BgComposerError, Result},
    services::ImageLoader,
    types::CompositeSurface,
    utils::{color::Color, data_url},
};
use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use reqwest::Client;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Growth factor of fill surfaces relative to the foreground
pub const FILL_SURFACE_FACTOR: f64 = 1.4;

/// Raw bytes of a user-supplied background
#[derive(Clone, PartialEq, Eq)]
pub struct CustomAsset {
    bytes: Arc<[u8]>,
    label: String,
}

impl CustomAsset {
    #[must_use]
    pub fn new<S: Into<String>>(bytes: impl Into<Arc<[u8]>>, label: S) -> Self {
        Self {
            bytes: bytes.into(),
            label: label.into(),
        }
    }

    /// Read an asset from disk, labelled with its file name
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| BgComposerError::file_io_error("read background image", path, &e))?;
        let label = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        Ok(Self::new(bytes, label))
    }

    /// Decode a `data:` URL, as produced by reading an uploaded file
    pub fn from_data_url(url: &str) -> Result<Self> {
        let decoded = data_url::decode(url).map_err(BgComposerError::invalid_config)?;
        let label = decoded.media_type.unwrap_or_else(|| "data-url".to_string());
        Ok(Self::new(decoded.bytes, label))
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for CustomAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomAsset")
            .field("label", &self.label)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// What to draw behind the foreground
#[derive(Debug, Clone, PartialEq, Default)]
pub enum BackgroundSpec {
    /// Nothing; the exported raster keeps its transparency
    #[default]
    Transparent,
    Solid(Color),
    /// Two-stop linear gradient along the full diagonal
    Gradient(Color, Color),
    /// Image fetched from a URL (`http(s)`, `data:`, `file://` or a local path)
    Image(String),
    /// Image bytes supplied directly by the user
    Custom(CustomAsset),
}

impl BackgroundSpec {
    /// Whether rendering needs an asset to be loaded
    #[must_use]
    pub fn needs_asset(&self) -> bool {
        matches!(self, Self::Image(_) | Self::Custom(_))
    }
}

impl fmt::Display for BackgroundSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transparent => write!(f, "transparent"),
            Self::Solid(color) => write!(f, "solid:{}", color),
            Self::Gradient(a, b) => write!(f, "gradient:{},{}", a, b),
            Self::Image(url) => write!(f, "image:{}", url),
            Self::Custom(asset) => write!(f, "custom:{}", asset.label()),
        }
    }
}

impl FromStr for BackgroundSpec {
    type Err = BgComposerError;

    /// Parse `transparent`, `solid:<color>`, `gradient:<a>,<b>`, `image:<url>`
    /// or a built-in catalog id such as `white` or `office`
    fn from_str(s: &str) -> Result<Self> {
        let input = s.trim();
        if let Some(color) = input.strip_prefix("solid:") {
            return Ok(Self::Solid(color.parse()?));
        }
        if let Some(stops) = input.strip_prefix("gradient:") {
            let (a, b) = stops.split_once(',').ok_or_else(|| {
                BgComposerError::invalid_config(format!(
                    "gradient background needs two colors, got '{}'",
                    stops
                ))
            })?;
            return Ok(Self::Gradient(a.parse()?, b.parse()?));
        }
        if let Some(url) = input.strip_prefix("image:") {
            if url.trim().is_empty() {
                return Err(BgComposerError::invalid_config("image background needs a URL"));
            }
            return Ok(Self::Image(url.trim().to_string()));
        }
        if data_url::is_data_url(input) {
            return Ok(Self::Custom(CustomAsset::from_data_url(input)?));
        }

        BackgroundCatalog::builtin().resolve(input)
    }
}

/// One selectable entry of the background catalog
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundOption {
    pub id: &'static str,
    pub name: &'static str,
    /// `None` for the upload-your-own entry
    pub spec: Option<BackgroundSpec>,
    /// Suggested foreground width as a share of the surface
    pub default_scale: Option<f32>,
}

/// Built-in background choices
#[derive(Debug, Clone)]
pub struct BackgroundCatalog {
    options: Vec<BackgroundOption>,
}

const STOCK_OFFICE: &str =
    "https://images.unsplash.com/photo-1507209696998-3c532be9b2b1?auto=format&fit=crop&w=600&q=60";
const STOCK_NATURE: &str =
    "https://images.unsplash.com/photo-1500530855697-b586d89ba3ee?auto=format&fit=crop&w=600&q=60";
const STOCK_STUDIO: &str =
    "https://images.unsplash.com/photo-1520697222861-ea73b6eec8b2?auto=format&fit=crop&w=600&q=60";
const STOCK_CITY: &str =
    "https://images.unsplash.com/photo-1468436139062-f60a71c5c892?auto=format&fit=crop&w=600&q=60";
const STOCK_ABSTRACT: &str =
    "https://images.unsplash.com/photo-1517694712202-14dd9538aa97?auto=format&fit=crop&w=600&q=60";

/// Start and end stops of the built-in blue gradient
pub const BLUE_GRADIENT: (Color, Color) = (Color::rgb(0x3b, 0x82, 0xf6), Color::rgb(0x63, 0x66, 0xf1));

impl BackgroundCatalog {
    #[must_use]
    pub fn builtin() -> Self {
        let image = |url: &str| Some(BackgroundSpec::Image(url.to_string()));
        let option = |id, name, spec, default_scale| BackgroundOption {
            id,
            name,
            spec,
            default_scale,
        };

        Self {
            options: vec![
                option("transparent", "Transparent", Some(BackgroundSpec::Transparent), Some(0.35)),
                option("white", "White", Some(BackgroundSpec::Solid(Color::WHITE)), Some(0.35)),
                option("office", "Office", image(STOCK_OFFICE), Some(0.3)),
                option("nature", "Nature", image(STOCK_NATURE), Some(0.25)),
                option("studio", "Studio", image(STOCK_STUDIO), Some(0.4)),
                option("city", "City", image(STOCK_CITY), Some(0.3)),
                option(
                    "blue-gradient",
                    "Blue Gradient",
                    Some(BackgroundSpec::Gradient(BLUE_GRADIENT.0, BLUE_GRADIENT.1)),
                    Some(0.35),
                ),
                option("abstract", "Abstract", image(STOCK_ABSTRACT), Some(0.35)),
                option("custom", "Upload Custom", None, None),
            ],
        }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&BackgroundOption> {
        self.options.iter().find(|o| o.id.eq_ignore_ascii_case(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &BackgroundOption> {
        self.options.iter()
    }

    /// Spec for a catalog id
    ///
    /// # Errors
    /// - `InvalidConfig` for unknown ids and for `custom`, which needs an asset
    pub fn resolve(&self, id: &str) -> Result<BackgroundSpec> {
        let option = self.get(id).ok_or_else(|| {
            let known: Vec<&str> = self.options.iter().map(|o| o.id).collect();
            BgComposerError::invalid_config(format!(
                "Unknown background '{}'. Available: {}",
                id,
                known.join(", ")
            ))
        })?;

        option.spec.clone().ok_or_else(|| {
            BgComposerError::invalid_config(format!(
                "Background '{}' requires an uploaded image",
                option.id
            ))
        })
    }
}

/// Loads background assets by URL
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Fetch the encoded bytes behind `url`
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Fetches `http(s)` URLs with reqwest and resolves `data:` URLs and local paths directly
#[derive(Debug, Clone)]
pub struct HttpAssetFetcher {
    client: Client,
}

impl HttpAssetFetcher {
    /// Create a fetcher whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BgComposerError::composition(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        if data_url::is_data_url(url) {
            return data_url::decode(url)
                .map(|d| d.bytes)
                .map_err(|e| BgComposerError::stage_error("background fetch", &e, Some("data URL")));
        }

        if url.starts_with("http://") || url.starts_with("https://") {
            let response = self.client.get(url).send().await.map_err(|e| {
                BgComposerError::stage_error("background fetch", &e.to_string(), Some(url))
            })?;
            if !response.status().is_success() {
                return Err(BgComposerError::stage_error(
                    "background fetch",
                    &format!("HTTP error {}", response.status()),
                    Some(url),
                ));
            }
            let bytes = response.bytes().await.map_err(|e| {
                BgComposerError::stage_error("background fetch", &e.to_string(), Some(url))
            })?;
            return Ok(bytes.to_vec());
        }

        let path = PathBuf::from(url.strip_prefix("file://").unwrap_or(url));
        tokio::fs::read(&path).await.map_err(|e| {
            BgComposerError::stage_error("background fetch", &e.to_string(), Some(url))
        })
    }
}

/// Size of the surface for fill variants: 1.4x the foreground, never smaller
#[must_use]
pub fn fill_surface_size(foreground: (u32, u32)) -> (u32, u32) {
    let grow = |side: u32| side.max((f64::from(side) * FILL_SURFACE_FACTOR).floor() as u32);
    (grow(foreground.0), grow(foreground.1))
}

/// Paint a two-stop linear gradient from `(0, 0)` to the far corner
///
/// The corner pixels take exactly `start` and `end`.
pub fn fill_gradient(image: &mut RgbaImage, start: Color, end: Color) {
    let (w, h) = image.dimensions();
    let dx = f64::from(w.saturating_sub(1));
    let dy = f64::from(h.saturating_sub(1));
    let length_sq = dx * dx + dy * dy;

    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let t = if length_sq == 0.0 {
            0.0
        } else {
            (f64::from(x) * dx + f64::from(y) * dy) / length_sq
        };
        *pixel = start.lerp(end, t as f32).to_rgba();
    }
}

/// Materializes target surfaces for background specs
pub struct BackgroundRenderer {
    fetcher: Arc<dyn AssetFetcher>,
    loader: ImageLoader,
}

impl BackgroundRenderer {
    #[must_use]
    pub fn new(fetcher: Arc<dyn AssetFetcher>, loader: ImageLoader) -> Self {
        Self { fetcher, loader }
    }

    /// Renderer backed by [`HttpAssetFetcher`]
    pub fn with_http(timeout: Duration, loader: ImageLoader) -> Result<Self> {
        Ok(Self::new(Arc::new(HttpAssetFetcher::new(timeout)?), loader))
    }

    /// Render `spec` into a new surface for a foreground of the given size
    ///
    /// # Errors
    /// - `Composition` when the surface cannot be allocated or an image asset
    ///   cannot be fetched or decoded
    #[instrument(skip(self, spec), fields(background = %spec))]
    pub async fn render(
        &self,
        spec: &BackgroundSpec,
        foreground: (u32, u32),
    ) -> Result<CompositeSurface> {
        match spec {
            BackgroundSpec::Image(url) => {
                let bytes = self.fetcher.fetch(url).await?;
                self.decode_asset(&bytes, url)
            },
            BackgroundSpec::Custom(asset) => self.decode_asset(asset.bytes(), asset.label()),
            fill => render_fill(fill, foreground),
        }
    }

    fn decode_asset(&self, bytes: &[u8], origin: &str) -> Result<CompositeSurface> {
        let image = self.loader.decode_rgba(bytes).map_err(|e| {
            BgComposerError::stage_error("background decode", &e.to_string(), Some(origin))
        })?;
        info!(
            width = image.width(),
            height = image.height(),
            "background asset loaded"
        );
        Ok(CompositeSurface::from_image(image))
    }
}

impl fmt::Debug for BackgroundRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundRenderer")
            .field("loader", &self.loader)
            .finish_non_exhaustive()
    }
}

/// Render a variant that needs no asset
///
/// # Errors
/// - `Composition` for image variants or a zero-sized foreground
pub fn render_fill(spec: &BackgroundSpec, foreground: (u32, u32)) -> Result<CompositeSurface> {
    let (w, h) = fill_surface_size(foreground);
    let mut surface = CompositeSurface::new(w, h)?;
    debug!(width = w, height = h, "fill surface allocated");

    match spec {
        BackgroundSpec::Transparent => {},
        BackgroundSpec::Solid(color) => {
            let fill: Rgba<u8> = color.to_rgba();
            surface.image_mut().pixels_mut().for_each(|p| *p = fill);
        },
        BackgroundSpec::Gradient(start, end) => fill_gradient(surface.image_mut(), *start, *end),
        BackgroundSpec::Image(_) | BackgroundSpec::Custom(_) => {
            return Err(BgComposerError::composition(format!(
                "background '{}' needs its asset loaded",
                spec
            )));
        },
    }

    Ok(surface)
}
