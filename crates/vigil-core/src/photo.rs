//! Submitted photo decoding: optional data-URI prefix, base64, image bytes.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use image::RgbImage;
use thiserror::Error;

/// Standard alphabet, padding optional. Mobile clients are inconsistent about it.
const PHOTO_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Error, Debug)]
pub enum PhotoError {
    #[error("photo payload is empty")]
    Empty,
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("could not decode image: {0}")]
    Image(#[from] image::ImageError),
}

/// Strip a leading `data:<mime>;base64,` prefix, if any.
pub fn strip_data_uri(payload: &str) -> &str {
    let trimmed = payload.trim();
    if trimmed.starts_with("data:") {
        if let Some((_, data)) = trimmed.split_once(',') {
            return data;
        }
    }
    trimmed
}

/// Decode a base64 photo payload into raw image bytes.
pub fn decode_base64(payload: &str) -> Result<Vec<u8>, PhotoError> {
    let data: String = strip_data_uri(payload)
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    if data.is_empty() {
        return Err(PhotoError::Empty);
    }
    Ok(PHOTO_BASE64.decode(data.as_bytes())?)
}

/// Decode a base64 photo payload into an RGB image.
pub fn decode_photo(payload: &str) -> Result<RgbImage, PhotoError> {
    let bytes = decode_base64(payload)?;
    let image = image::load_from_memory(&bytes)?;
    tracing::debug!(
        bytes = bytes.len(),
        width = image.width(),
        height = image.height(),
        "decoded photo"
    );
    Ok(image.to_rgb8())
}

/// Encode image bytes as a plain base64 payload (no data-URI prefix).
pub fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}
