//! Tract backend implementation for segmentation models
//!
//! Tract is a pure Rust inference library: no C++ runtime to ship, no FFI
//! boundary. The input fact is pinned to the model's square NCHW shape before
//! optimisation so dynamic-shape models compile to a fixed plan.

use crate::config::RemovalConfig;
use crate::error::{BgCompositeError, Result};
use crate::inference::InferenceBackend;
use crate::models::{LoadedModel, ModelInfo, PreprocessingConfig};
use log;
use ndarray::Array4;
use tract_onnx::prelude::*;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

// Use instant crate for cross-platform time compatibility
use instant::{Duration, Instant};

/// Tract backend for running segmentation models
#[derive(Debug)]
pub struct TractBackend {
    model: Option<TractModel>,
    source: LoadedModel,
}

impl TractBackend {
    /// Create an uninitialized backend for a loaded model file
    #[must_use]
    pub fn new(source: LoadedModel) -> Self {
        Self {
            model: None,
            source,
        }
    }

    fn load_model(&mut self) -> Result<Duration> {
        let model_load_start = Instant::now();
        let info = self.source.info();
        let (n, c, h, w) = info.input_shape;

        log::info!("Initializing Tract backend");
        log::info!("  - Model: {} ({})", info.name, self.source.path.display());
        let size_mb = info.size_bytes as f64 / (1024.0 * 1024.0);
        log::info!("  - Model size: {size_mb:.2} MB");
        log::debug!("  - Input fact: {n}x{c}x{h}x{w}");

        let model = onnx()
            .model_for_read(&mut std::io::Cursor::new(&self.source.bytes))
            .map_err(|e| BgCompositeError::model(format!("Failed to load ONNX model: {e}")))?
            .with_input_fact(0, f32::fact([n, c, h, w]).into())
            .map_err(|e| BgCompositeError::model(format!("Failed to set input shape: {e}")))?
            .into_optimized()
            .map_err(|e| BgCompositeError::model(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| {
                BgCompositeError::model(format!("Failed to create runnable model: {e}"))
            })?;

        self.model = Some(model);

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "Tract backend initialized in {}ms",
            model_load_time.as_millis()
        );
        Ok(model_load_time)
    }
}

impl InferenceBackend for TractBackend {
    fn initialize(&mut self, _config: &RemovalConfig) -> Result<Option<Duration>> {
        if self.model.is_some() {
            return Ok(None);
        }
        self.load_model().map(Some)
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| BgCompositeError::internal("Tract model not initialized"))?;

        log::debug!("Running Tract inference, input tensor {:?}", input.shape());
        let inference_start = Instant::now();

        // Copy through a flat buffer so the tensor does not depend on tract's ndarray version
        let data: Vec<f32> = input.iter().copied().collect();
        let input_tensor = Tensor::from_shape(input.shape(), &data).map_err(|e| {
            BgCompositeError::inference(format!("Failed to build input tensor: {e}"))
        })?;

        let outputs = model
            .run(tvec![input_tensor.into()])
            .map_err(|e| BgCompositeError::inference(format!("Tract inference failed: {e}")))?;

        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| BgCompositeError::inference("No output tensor found"))?;

        let output_view = output_tensor.to_array_view::<f32>().map_err(|e| {
            BgCompositeError::inference(format!("Failed to convert output tensor: {e}"))
        })?;

        let shape = output_view.shape().to_vec();
        let [n, c, h, w] = shape[..] else {
            return Err(BgCompositeError::inference(format!(
                "Expected 4D output tensor, got {}D",
                shape.len()
            )));
        };

        let output_array =
            Array4::from_shape_vec((n, c, h, w), output_view.iter().copied().collect()).map_err(
                |e| BgCompositeError::inference(format!("Failed to reshape output tensor: {e}")),
            )?;

        log::debug!(
            "Tract inference completed in {}ms, output tensor {:?}",
            inference_start.elapsed().as_millis(),
            output_array.shape()
        );

        Ok(output_array)
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        self.source.info().input_shape
    }

    fn preprocessing_config(&self) -> PreprocessingConfig {
        self.source.kind.preprocessing_config()
    }

    fn model_info(&self) -> ModelInfo {
        self.source.info()
    }

    fn is_initialized(&self) -> bool {
        self.model.is_some()
    }
}
