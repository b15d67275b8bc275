//! JPEG and base64 encoding of rendered frames.

use base64::{Engine as _, engine::general_purpose};
use image::{ImageError, RgbImage, codecs::jpeg::JpegEncoder};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("no frame available")]
    NoFrame,
    #[error("JPEG encode failed: {0}")]
    Jpeg(#[from] ImageError),
}

pub fn encode_jpeg(image: Option<&RgbImage>, quality: u8) -> Result<Vec<u8>, EncodeError> {
    let image = image.ok_or(EncodeError::NoFrame)?;
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100)).encode_image(image)?;
    Ok(buffer)
}

/// Standard-alphabet, padded base64 of the JPEG bytes.
pub fn encode_base64(image: Option<&RgbImage>, quality: u8) -> Result<String, EncodeError> {
    let jpeg = encode_jpeg(image, quality)?;
    Ok(general_purpose::STANDARD.encode(jpeg))
}
