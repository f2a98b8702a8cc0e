//! Decoding of self-contained encoded image strings (`data:` URLs or bare base64)

use base64::{engine::general_purpose, Engine as _};

/// Decoded payload of a data URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    /// Declared media type, if any (e.g. `image/png`)
    pub media_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Returns true when the string looks like a `data:` URL
#[must_use]
pub fn is_data_url(input: &str) -> bool {
    input.trim_start().starts_with("data:")
}

/// Decode a `data:<mime>;base64,<payload>` URL or a bare base64 string.
///
/// Only base64 payloads are accepted; percent-encoded data URLs are not
/// used for images by any collaborator.
pub fn decode(input: &str) -> Result<DataUrl, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("empty image payload".to_string());
    }

    let (media_type, payload) = if let Some(rest) = trimmed.strip_prefix("data:") {
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| "data URL has no ',' separator".to_string())?;
        let mut params = header.split(';');
        let media_type = params
            .next()
            .filter(|m| !m.is_empty())
            .map(str::to_string);
        if !params.any(|p| p.eq_ignore_ascii_case("base64")) {
            return Err("data URL is not base64 encoded".to_string());
        }
        (media_type, payload)
    } else {
        (None, trimmed)
    };

    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| format!("invalid base64 payload: {}", e))?;

    if bytes.is_empty() {
        return Err("image payload decoded to zero bytes".to_string());
    }

    Ok(DataUrl { media_type, bytes })
}

/// Encode bytes as a `data:` URL with the given media type
#[must_use]
pub fn encode(media_type: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        media_type,
        general_purpose::STANDARD.encode(bytes)
    )
}
