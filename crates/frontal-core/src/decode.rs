//! Image decoding: encoded upload bytes to an 8-bit grayscale buffer.

use image::GrayImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("empty image upload")]
    Empty,
    #[error("could not decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("image has zero size ({width}x{height})")]
    ZeroSize { width: u32, height: u32 },
}

/// Decode any format the `image` crate understands, then convert to luma.
pub fn decode_grayscale(bytes: &[u8]) -> Result<GrayImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    let decoded = image::load_from_memory(bytes)?;
    let gray = decoded.to_luma8();
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return Err(DecodeError::ZeroSize { width, height });
    }

    tracing::debug!(width, height, color = ?decoded.color(), "decoded upload");
    Ok(gray)
}
