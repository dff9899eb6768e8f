//! Background removal
//!
//! [`BackgroundRemover`] is the seam the HTTP layer depends on. The
//! model-backed implementation runs preprocess → inference → mask → cut-out
//! on a single backend guarded by a mutex.

use crate::{
    backends::create_backend,
    config::RemovalConfig,
    download::ModelDownloader,
    error::{BgCompositeError, Result},
    inference::InferenceBackend,
    models::LoadedModel,
    types::{ProcessingTimings, RasterImage, RemovalResult, SegmentationMask},
    utils::ImagePreprocessor,
};
use image::{DynamicImage, GenericImageView};
use instant::Instant;
use ndarray::{Array4, Axis};
use std::sync::Mutex;
use tracing::{debug, info, instrument, span, Level};

/// Anything that can cut the subject out of an image
///
/// The returned image has the input's dimensions and colours; its alpha
/// channel is 0 on background, 255 on the subject and graded at edges.
pub trait BackgroundRemover: Send + Sync {
    /// Remove the background from `image`
    ///
    /// # Errors
    /// Any failure of the underlying model or image processing
    fn remove(&self, image: &DynamicImage) -> Result<RasterImage>;

    /// Short identifier used in logs and `AppState`'s debug output
    fn name(&self) -> String;
}

/// Background remover backed by a segmentation model
pub struct ModelRemover {
    config: RemovalConfig,
    backend: Mutex<Box<dyn InferenceBackend>>,
    name: String,
}

impl std::fmt::Debug for ModelRemover {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRemover")
            .field("name", &self.name)
            .field("backend", &self.config.backend_type)
            .finish_non_exhaustive()
    }
}

impl ModelRemover {
    /// Wrap and initialize a backend
    ///
    /// # Errors
    /// Backend initialization failures (model parsing, provider setup)
    pub fn new(config: RemovalConfig, mut backend: Box<dyn InferenceBackend>) -> Result<Self> {
        info!(
            backend = %config.backend_type,
            model = %config.model_spec.display_name(),
            "Initializing background remover"
        );

        if let Some(load_time) = backend.initialize(&config)? {
            info!(load_ms = load_time.as_millis() as u64, "Model loaded");
        }

        let name = format!("{}:{}", config.model_spec.kind, config.backend_type);
        Ok(Self {
            config,
            backend: Mutex::new(backend),
            name,
        })
    }

    /// Build a remover from a model file that is already on disk
    ///
    /// # Errors
    /// - Model file unreadable
    /// - Backend not compiled in or failing to initialize
    pub fn from_model_file<P: Into<std::path::PathBuf>>(
        config: RemovalConfig,
        path: P,
    ) -> Result<Self> {
        let model = LoadedModel::from_path(config.model_spec.kind, path)?;
        let backend = create_backend(config.backend_type, model)?;
        Self::new(config, backend)
    }

    /// Resolve the model (downloading it on first use) and build a remover
    ///
    /// Model parsing runs on the blocking pool.
    ///
    /// # Errors
    /// - Download or checksum failures
    /// - Any error from [`ModelRemover::from_model_file`]
    pub async fn load(config: RemovalConfig, downloader: &ModelDownloader) -> Result<Self> {
        config.validate()?;
        let path = downloader.ensure_model(&config.model_spec).await?;
        tokio::task::spawn_blocking(move || Self::from_model_file(config, path))
            .await
            .map_err(|e| BgCompositeError::internal(format!("Model loading task failed: {e}")))?
    }

    #[must_use]
    pub fn config(&self) -> &RemovalConfig {
        &self.config
    }

    /// Run the full removal pipeline, returning the cut-out with its mask and timings
    ///
    /// # Errors
    /// - Zero-sized input
    /// - Inference errors
    /// - Output tensor that is not `1xCxHxW` with at least one channel
    #[instrument(
        skip(self, image),
        fields(
            model = %self.name,
            dimensions = %format!("{}x{}", image.width(), image.height())
        )
    )]
    pub fn process(&self, image: &DynamicImage) -> Result<RemovalResult> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::default();
        let original_dimensions = image.dimensions();

        let mut backend = self
            .backend
            .lock()
            .map_err(|_| BgCompositeError::internal("Inference backend lock poisoned"))?;

        let input_tensor = {
            let _span = span!(Level::DEBUG, "preprocessing").entered();
            let start = Instant::now();
            let tensor =
                ImagePreprocessor::preprocess_for_inference(image, &backend.preprocessing_config())?;
            timings.preprocessing_ms = start.elapsed().as_millis() as u64;
            tensor
        };

        let output_tensor = {
            let _span = span!(Level::DEBUG, "inference").entered();
            let start = Instant::now();
            let tensor = backend.infer(&input_tensor)?;
            timings.inference_ms = start.elapsed().as_millis() as u64;
            tensor
        };
        drop(backend);

        let (mask, cut_out) = {
            let _span = span!(Level::DEBUG, "postprocessing").entered();
            let start = Instant::now();
            let mask = Self::tensor_to_mask(&output_tensor, original_dimensions)?;
            let cut_out = mask.cut_out(image)?;
            timings.postprocessing_ms = start.elapsed().as_millis() as u64;
            (mask, cut_out)
        };

        timings.total_ms = total_start.elapsed().as_millis() as u64;
        debug!(
            preprocessing_ms = timings.preprocessing_ms,
            inference_ms = timings.inference_ms,
            postprocessing_ms = timings.postprocessing_ms,
            total_ms = timings.total_ms,
            foreground_ratio = mask.foreground_ratio(),
            "Background removed"
        );

        Ok(RemovalResult {
            image: cut_out,
            mask,
            timings,
        })
    }

    /// Turn the first channel of a model output into a mask of `original_dimensions`
    ///
    /// Values are min-max normalised; a flat prediction yields an all-zero
    /// mask.
    ///
    /// # Errors
    /// `Processing` when the tensor is not `1xCxHxW` with `C >= 1`
    pub fn tensor_to_mask(
        tensor: &Array4<f32>,
        original_dimensions: (u32, u32),
    ) -> Result<SegmentationMask> {
        let (batch, channels, height, width) = tensor.dim();
        if batch != 1 || channels == 0 || height == 0 || width == 0 {
            return Err(BgCompositeError::processing(format!(
                "Invalid output tensor shape {:?}",
                tensor.shape()
            )));
        }

        let prediction = tensor.index_axis(Axis(0), 0);
        let prediction = prediction.index_axis(Axis(0), 0);

        let (min, max) = prediction
            .iter()
            .filter(|v| v.is_finite())
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let range = max - min;

        let data: Vec<u8> = if range.is_finite() && range > f32::EPSILON {
            prediction
                .iter()
                .map(|&v| {
                    // NaN saturates to 0 in the cast
                    (((v - min) / range) * 255.0).clamp(0.0, 255.0) as u8
                })
                .collect()
        } else {
            vec![0; height * width]
        };

        let mask = SegmentationMask::new(data, (width as u32, height as u32));
        if mask.dimensions == original_dimensions {
            Ok(mask)
        } else {
            mask.resize(original_dimensions.0, original_dimensions.1)
        }
    }
}

impl BackgroundRemover for ModelRemover {
    fn remove(&self, image: &DynamicImage) -> Result<RasterImage> {
        self.process(image).map(|result| result.image)
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::{MockBackend, MockMask};
    use image::{Rgb, RgbImage, Rgba};
    use std::sync::Arc;

    fn remover(backend: MockBackend) -> ModelRemover {
        ModelRemover::new(RemovalConfig::default(), Box::new(backend)).unwrap()
    }

    fn sample_image() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 32, Rgb([200, 100, 50])))
    }

    #[test]
    fn test_cut_out_follows_mask() {
        let result = remover(MockBackend::new()).process(&sample_image()).unwrap();

        assert_eq!(result.image.dimensions(), (64, 32));
        assert_eq!(result.mask.dimensions, (64, 32));
        assert_eq!(result.image.get_pixel(4, 16), &Rgba([200, 100, 50, 255]));
        assert_eq!(result.image.get_pixel(60, 16), &Rgba([200, 100, 50, 0]));
    }

    #[test]
    fn test_flat_prediction_gives_transparent_image() {
        let backend = MockBackend::new().with_mask(MockMask::Constant(0.7));
        let result = remover(backend).process(&sample_image()).unwrap();
        assert!(result.image.pixels().all(|p| p[3] == 0));
        assert!(result.mask.foreground_ratio() < f32::EPSILON);
    }

    #[test]
    fn test_inference_failure_propagates() {
        let remover = remover(MockBackend::new_failing_inference());
        let err = remover.remove(&sample_image()).unwrap_err();
        assert!(matches!(err, BgCompositeError::Inference(_)));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_initialization_failure() {
        let result = ModelRemover::new(
            RemovalConfig::default(),
            Box::new(MockBackend::new_failing_init()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_tensor_to_mask_normalises_range() {
        let tensor = Array4::from_shape_vec((1, 1, 1, 3), vec![-2.0, 0.0, 2.0]).unwrap();
        let mask = ModelRemover::tensor_to_mask(&tensor, (3, 1)).unwrap();
        assert_eq!(mask.data, vec![0, 127, 255]);
    }

    #[test]
    fn test_tensor_to_mask_uses_first_channel_and_resizes() {
        let mut tensor = Array4::<f32>::zeros((1, 2, 4, 4));
        tensor.index_axis_mut(Axis(1), 0).fill(0.25);
        tensor[[0, 0, 0, 0]] = 1.0;
        tensor.index_axis_mut(Axis(1), 1).fill(9.0);

        let mask = ModelRemover::tensor_to_mask(&tensor, (8, 2)).unwrap();
        assert_eq!(mask.dimensions, (8, 2));

        let bad = Array4::<f32>::zeros((2, 1, 4, 4));
        assert!(ModelRemover::tensor_to_mask(&bad, (4, 4)).is_err());
    }

    #[test]
    fn test_remover_is_shareable_across_threads() {
        let remover: Arc<dyn BackgroundRemover> = Arc::new(remover(MockBackend::new()));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let remover = Arc::clone(&remover);
                std::thread::spawn(move || remover.remove(&sample_image()).unwrap().dimensions())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), (64, 32));
        }
        assert_eq!(remover.name(), "u2net:tract");
    }
}
