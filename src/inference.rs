//! Inference backend abstraction

use crate::{
    config::RemovalConfig,
    error::Result,
    models::{ModelInfo, PreprocessingConfig},
};
use ndarray::Array4;

// Use instant crate for cross-platform time compatibility
use instant::Duration;

/// Trait for inference backends
///
/// Backends take `&mut self` for inference, so shared users wrap them in a
/// lock. `Send` lets a backend move into a blocking worker thread.
pub trait InferenceBackend: Send {
    /// Initialize the backend with the given configuration
    ///
    /// Returns the model load time, or `None` if the backend was already
    /// initialized.
    ///
    /// # Errors
    /// - Model loading or validation errors
    /// - Invalid configuration parameters
    fn initialize(&mut self, config: &RemovalConfig) -> Result<Option<Duration>>;

    /// Run inference on an NCHW input tensor, returning the first model output
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Model inference failures
    /// - Output that is not a 4D tensor
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Expected input shape (NCHW)
    fn input_shape(&self) -> (usize, usize, usize, usize);

    /// Preprocessing the model expects
    fn preprocessing_config(&self) -> PreprocessingConfig;

    /// Get model information for this backend
    fn model_info(&self) -> ModelInfo;

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;
}
