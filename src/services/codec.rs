//! Image encoding and decoding at the service boundary
//!
//! Images cross the HTTP boundary either as raw upload bytes or as
//! base64 data URLs; every response image is a PNG data URL.

use crate::{
    error::{BgCompositeError, Result},
    types::RasterImage,
};
use base64::{engine::general_purpose, Engine as _};
use image::{codecs::png::PngEncoder, DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat};
use std::io::Cursor;

/// Prefix of every image returned by the service
pub const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Service for converting between wire payloads and decoded images
pub struct ImageCodec;

impl ImageCodec {
    /// Decode raw image bytes, detecting the format from content
    ///
    /// # Errors
    /// `ImageDecode` when the bytes are empty or not a supported image
    pub fn decode_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(BgCompositeError::image_decode("image data is empty"));
        }

        let format = image::guess_format(bytes).map_err(|e| {
            BgCompositeError::image_decode(format!(
                "cannot identify image format ({} bytes): {}",
                bytes.len(),
                e
            ))
        })?;

        image::load_from_memory_with_format(bytes, format).map_err(|e| {
            BgCompositeError::image_decode(format!("failed to decode {:?} image: {}", format, e))
        })
    }

    /// Extract the binary payload of a base64 data URL
    ///
    /// Everything up to the first comma is treated as the header and ignored,
    /// so `data:image/jpeg;base64,...` and a bare `,...` are both accepted.
    /// ASCII whitespace inside the payload is skipped.
    ///
    /// # Errors
    /// `InvalidRequest` when there is no comma or the payload is not valid base64
    pub fn parse_data_url(data_url: &str) -> Result<Vec<u8>> {
        let (_header, payload) = data_url.split_once(',').ok_or_else(|| {
            BgCompositeError::invalid_request(
                "malformed data URL: expected 'data:<mime>;base64,<payload>'",
            )
        })?;

        // MIME-wrapped payloads carry line breaks inside the base64
        let payload: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| BgCompositeError::invalid_request(format!("invalid base64 payload: {}", e)))
    }

    /// Decode a data URL straight into an image
    ///
    /// # Errors
    /// `InvalidRequest` for a malformed data URL, `ImageDecode` for bad image bytes
    pub fn decode_data_url(data_url: &str) -> Result<DynamicImage> {
        let bytes = Self::parse_data_url(data_url)?;
        Self::decode_bytes(&bytes)
    }

    /// Encode an image as PNG, keeping its colour type
    ///
    /// # Errors
    /// `Image` if the encoder rejects the image
    pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        image.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
        Ok(buffer)
    }

    /// Encode an RGBA raster as PNG without copying it into a `DynamicImage`
    ///
    /// # Errors
    /// `Image` if the encoder rejects the buffer
    pub fn encode_rgba_png(image: &RasterImage) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let (width, height) = image.dimensions();
        PngEncoder::new(&mut buffer).write_image(
            image.as_raw(),
            width,
            height,
            ExtendedColorType::Rgba8,
        )?;
        Ok(buffer)
    }

    /// Wrap PNG bytes in a data URL
    #[must_use]
    pub fn png_data_url(png_bytes: &[u8]) -> String {
        format!(
            "{}{}",
            PNG_DATA_URL_PREFIX,
            general_purpose::STANDARD.encode(png_bytes)
        )
    }

    /// Encode an RGBA raster as a PNG data URL
    ///
    /// # Errors
    /// `Image` if PNG encoding fails
    pub fn rgba_to_data_url(image: &RasterImage) -> Result<String> {
        Ok(Self::png_data_url(&Self::encode_rgba_png(image)?))
    }
}
