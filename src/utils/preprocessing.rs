//! Image preprocessing for segmentation model input
//!
//! Converts an arbitrary image into the normalised NCHW tensor a model
//! expects. The image is stretched to the model's square input (no
//! letterboxing), so the mask maps back with a plain resize.

use crate::{error::BgCompositeError, error::Result, models::PreprocessingConfig};
use image::{imageops::FilterType, DynamicImage, RgbImage};
use ndarray::Array4;

/// Image preprocessor for segmentation models
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Resize, scale to 0..1 by the peak value and normalise into a `1x3xHxW` tensor
    ///
    /// # Errors
    /// `InvalidImage` for zero-sized images or zero-sized model inputs
    pub fn preprocess_for_inference(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Result<Array4<f32>> {
        let [target_width, target_height] = preprocessing_config.target_size;
        if image.width() == 0 || image.height() == 0 {
            return Err(BgCompositeError::invalid_image(format!(
                "cannot preprocess a {}x{} image",
                image.width(),
                image.height()
            )));
        }
        if target_width == 0 || target_height == 0 {
            return Err(BgCompositeError::invalid_image(
                "model input size must be non-zero",
            ));
        }

        let rgb = image.to_rgb8();
        let resized = if rgb.dimensions() == (target_width, target_height) {
            rgb
        } else {
            image::imageops::resize(&rgb, target_width, target_height, FilterType::Lanczos3)
        };

        Ok(Self::canvas_to_tensor(&resized, preprocessing_config))
    }

    /// Convert an RGB canvas to a normalized tensor
    ///
    /// Values are divided by the brightest channel value in the canvas (not a
    /// fixed 255), then normalised by the per-channel mean and std.
    fn canvas_to_tensor(canvas: &RgbImage, config: &PreprocessingConfig) -> Array4<f32> {
        let (width, height) = canvas.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
        // An all-black canvas stays all zeros
        let peak = f32::from(canvas.as_raw().iter().copied().max().unwrap_or(0).max(1));

        #[allow(clippy::indexing_slicing)]
        // Safe: tensor dimensions pre-allocated to match canvas size
        for (x, y, pixel) in canvas.enumerate_pixels() {
            for channel in 0..3 {
                let value = f32::from(pixel[channel]) / peak;
                tensor[[0, channel, y as usize, x as usize]] = (value
                    - config.normalization_mean[channel])
                    / config.normalization_std[channel];
            }
        }

        tensor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbaImage};

    fn unit_config(size: u32) -> PreprocessingConfig {
        unit_config_wh(size, size)
    }

    fn unit_config_wh(width: u32, height: u32) -> PreprocessingConfig {
        PreprocessingConfig {
            target_size: [width, height],
            normalization_mean: [0.0, 0.0, 0.0],
            normalization_std: [1.0, 1.0, 1.0],
        }
    }

    #[test]
    fn test_tensor_shape_matches_model_input() {
        let image = DynamicImage::new_rgb8(64, 48);
        let config = crate::models::ModelKind::U2Net.preprocessing_config();
        let tensor = ImagePreprocessor::preprocess_for_inference(&image, &config).unwrap();
        assert_eq!(tensor.dim(), (1, 3, 320, 320));
    }

    #[test]
    fn test_channel_layout_and_scaling() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([255, 0, 51])));
        let tensor = ImagePreprocessor::preprocess_for_inference(&image, &unit_config(4)).unwrap();
        assert!((tensor[[0, 0, 1, 2]] - 1.0).abs() < 1e-6);
        assert!(tensor[[0, 1, 1, 2]].abs() < 1e-6);
        assert!((tensor[[0, 2, 1, 2]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_scaling_uses_peak_value() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgb([51, 0, 0])
            } else {
                Rgb([102, 51, 0])
            }
        }));
        let tensor = ImagePreprocessor::preprocess_for_inference(&image, &unit_config_wh(2, 1)).unwrap();
        assert!((tensor[[0, 0, 0, 0]] - 0.5).abs() < 1e-6);
        assert!((tensor[[0, 0, 0, 1]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 1, 0, 1]] - 0.5).abs() < 1e-6);

        let black = DynamicImage::new_rgb8(2, 1);
        let tensor = ImagePreprocessor::preprocess_for_inference(&black, &unit_config_wh(2, 1)).unwrap();
        assert!(tensor.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_normalization_applied() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([255, 255, 255])));
        let config = PreprocessingConfig {
            target_size: [2, 2],
            normalization_mean: [0.5, 0.5, 0.5],
            normalization_std: [0.25, 0.5, 1.0],
        };
        let tensor = ImagePreprocessor::preprocess_for_inference(&image, &config).unwrap();
        assert!((tensor[[0, 0, 0, 0]] - 2.0).abs() < 1e-6);
        assert!((tensor[[0, 1, 0, 0]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 2, 0, 0]] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_alpha_is_dropped_and_empty_rejected() {
        let rgba = DynamicImage::ImageRgba8(RgbaImage::new(3, 3));
        let tensor = ImagePreprocessor::preprocess_for_inference(&rgba, &unit_config(3)).unwrap();
        assert_eq!(tensor.dim(), (1, 3, 3, 3));

        let empty = DynamicImage::new_rgb8(0, 5);
        assert!(ImagePreprocessor::preprocess_for_inference(&empty, &unit_config(3)).is_err());
    }
}
