//! Core types for removal and compositing operations

use crate::error::{BgCompositeError, Result};
use image::{DynamicImage, GenericImageView, ImageBuffer, Luma, RgbaImage};
use serde::{Deserialize, Serialize};

/// Decoded raster image with per-pixel RGBA channels
pub type RasterImage = RgbaImage;

/// Where the scaled subject lands on the background canvas
///
/// Offsets are signed: a subject wider than the background gets a negative
/// `x`, one taller than `background.height - 20` a negative `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// Scaled subject width
    pub width: u32,
    /// Scaled subject height
    pub height: u32,
    /// Horizontal offset of the subject's left edge
    pub x: i64,
    /// Vertical offset of the subject's top edge
    pub y: i64,
}

/// A subject (with alpha) to be placed over a background
#[derive(Debug, Clone)]
pub struct CompositeRequest {
    /// Cut-out subject; must carry an alpha channel
    pub subject: DynamicImage,
    /// Background canvas; must be non-empty
    pub background: DynamicImage,
}

impl CompositeRequest {
    #[must_use]
    pub fn new(subject: DynamicImage, background: DynamicImage) -> Self {
        Self {
            subject,
            background,
        }
    }
}

/// Output of a compositing operation
#[derive(Debug, Clone)]
pub struct CompositeResult {
    /// Blended image, same dimensions as the background
    pub image: RasterImage,
    /// Geometry used for the subject
    pub placement: Placement,
}

impl CompositeResult {
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Greyscale foreground mask produced by a segmentation model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationMask {
    /// Mask data as grayscale values (0-255)
    pub data: Vec<u8>,

    /// Mask dimensions (width, height)
    pub dimensions: (u32, u32),
}

impl SegmentationMask {
    /// Create a new segmentation mask
    #[must_use]
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Self {
        Self { data, dimensions }
    }

    /// Create mask from a grayscale image
    #[must_use]
    pub fn from_image(image: &ImageBuffer<Luma<u8>, Vec<u8>>) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.as_raw().clone(), (width, height))
    }

    /// Convert mask to a grayscale image
    pub fn to_image(&self) -> Result<ImageBuffer<Luma<u8>, Vec<u8>>> {
        let (width, height) = self.dimensions;
        ImageBuffer::from_raw(width, height, self.data.clone()).ok_or_else(|| {
            BgCompositeError::processing("Mask data does not match its dimensions")
        })
    }

    /// Resize the mask to new dimensions
    pub fn resize(&self, new_width: u32, new_height: u32) -> Result<SegmentationMask> {
        let current = self.to_image()?;
        let resized = image::imageops::resize(
            &current,
            new_width,
            new_height,
            image::imageops::FilterType::Lanczos3,
        );
        Ok(SegmentationMask::from_image(&resized))
    }

    /// Cut the subject out of `image`: colour is kept, alpha becomes the mask value
    pub fn cut_out(&self, image: &DynamicImage) -> Result<RasterImage> {
        if image.dimensions() != self.dimensions {
            return Err(BgCompositeError::processing(format!(
                "Image ({}x{}) and mask ({}x{}) dimensions do not match",
                image.width(),
                image.height(),
                self.dimensions.0,
                self.dimensions.1
            )));
        }

        let mut rgba = image.to_rgba8();
        for (pixel, &alpha) in rgba.pixels_mut().zip(self.data.iter()) {
            pixel[3] = alpha;
        }
        Ok(rgba)
    }

    /// Fraction of pixels considered foreground (value above 127)
    #[must_use]
    pub fn foreground_ratio(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let foreground = self.data.iter().filter(|&&v| v > 127).count();
        foreground as f32 / self.data.len() as f32
    }
}

/// Timing breakdown of a single model-backed removal
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingTimings {
    pub preprocessing_ms: u64,
    pub inference_ms: u64,
    pub postprocessing_ms: u64,
    pub total_ms: u64,
}

/// Cut-out image plus the mask and timings that produced it
#[derive(Debug, Clone)]
pub struct RemovalResult {
    pub image: RasterImage,
    pub mask: SegmentationMask,
    pub timings: ProcessingTimings,
}
