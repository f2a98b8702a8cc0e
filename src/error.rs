//! Error types for segmentation and compositing operations

use thiserror::Error;

/// Result type alias for background composition operations
pub type Result<T> = std::result::Result<T, BgComposerError>;

/// Error taxonomy for the segmentation and compositing pipeline
#[derive(Error, Debug)]
pub enum BgComposerError {
    /// Input bytes could not be decoded as an image
    #[error("Load error: {0}")]
    Load(String),

    /// The segmentation algorithm itself failed (not a low-quality mask)
    #[error("Segmentation error: {0}")]
    Segmentation(String),

    /// Remote segmentation service failure (transport, status or payload)
    #[error("Remote segmentation error: {0}")]
    Remote(String),

    /// Drawing surface unavailable or a draw step failed
    #[error("Composition error: {0}")]
    Composition(String),

    /// Encoding the final surface or delivering the download failed
    #[error("Export error: {0}")]
    Export(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation not allowed in the current session state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image codec errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),
}

impl BgComposerError {
    /// Create a new load error
    pub fn load<S: Into<String>>(msg: S) -> Self {
        Self::Load(msg.into())
    }

    /// Create a new segmentation error
    pub fn segmentation<S: Into<String>>(msg: S) -> Self {
        Self::Segmentation(msg.into())
    }

    /// Create a new remote error
    pub fn remote<S: Into<String>>(msg: S) -> Self {
        Self::Remote(msg.into())
    }

    /// Create a new composition error
    pub fn composition<S: Into<String>>(msg: S) -> Self {
        Self::Composition(msg.into())
    }

    /// Create a new export error
    pub fn export<S: Into<String>>(msg: S) -> Self {
        Self::Export(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new invalid state error
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Whether this error may be shown to the user.
    ///
    /// Remote failures are always recovered by the local fallback and stay
    /// internal.
    #[must_use]
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, Self::Remote(_))
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Create composition error with stage context
    pub fn stage_error(stage: &str, details: &str, input_info: Option<&str>) -> Self {
        let input_context = match input_info {
            Some(info) => format!(" (input: {})", info),
            None => String::new(),
        };

        Self::Composition(format!(
            "Composition failed at stage '{}'{}: {}",
            stage, input_context, details
        ))
    }
}
