//! ONNX Runtime backend implementation for segmentation models
//!
//! Supports the CPU, CUDA and `CoreML` execution providers. Unavailable
//! providers fall back to CPU with a warning rather than failing.

use crate::config::{ExecutionProvider, RemovalConfig};
use crate::error::{BgCompositeError, Result};
use crate::inference::InferenceBackend;
use crate::models::{LoadedModel, ModelInfo, PreprocessingConfig};
use log;
use ndarray::Array4;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::{self, value::Value};
use std::time::{Duration, Instant};

/// ONNX Runtime backend for running segmentation models
#[derive(Debug)]
pub struct OnnxBackend {
    session: Option<Session>,
    source: LoadedModel,
}

impl OnnxBackend {
    /// List ONNX Runtime execution providers with availability and description
    pub fn list_providers() -> Vec<(String, bool, String)> {
        let cuda_available =
            OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available =
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false);

        vec![
            (
                "CPU".to_string(),
                true,
                "Always available, uses CPU for inference".to_string(),
            ),
            (
                "CUDA".to_string(),
                cuda_available,
                "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
            ),
            (
                "CoreML".to_string(),
                coreml_available,
                "Apple Silicon GPU acceleration (macOS only)".to_string(),
            ),
        ]
    }

    /// Create an uninitialized backend for a loaded model file
    #[must_use]
    pub fn new(source: LoadedModel) -> Self {
        Self {
            session: None,
            source,
        }
    }

    fn cuda() -> Option<ExecutionProviderDispatch> {
        let provider = CUDAExecutionProvider::default();
        if OrtExecutionProvider::is_available(&provider).unwrap_or(false) {
            Some(provider.build())
        } else {
            None
        }
    }

    fn coreml() -> Option<ExecutionProviderDispatch> {
        let provider = CoreMLExecutionProvider::default();
        if OrtExecutionProvider::is_available(&provider).unwrap_or(false) {
            Some(provider.with_subgraphs(true).build())
        } else {
            None
        }
    }

    /// Providers to register for the requested mode, in priority order
    fn select_providers(requested: ExecutionProvider) -> Vec<ExecutionProviderDispatch> {
        let providers: Vec<_> = match requested {
            ExecutionProvider::Auto => [Self::cuda(), Self::coreml()].into_iter().flatten().collect(),
            ExecutionProvider::Cpu => Vec::new(),
            ExecutionProvider::Cuda => Self::cuda().into_iter().collect(),
            ExecutionProvider::CoreMl => Self::coreml().into_iter().collect(),
        };

        if providers.is_empty() && requested != ExecutionProvider::Cpu {
            log::warn!("Execution provider '{requested}' not available, falling back to CPU");
        }
        providers
    }

    fn load_model(&mut self, config: &RemovalConfig) -> Result<Duration> {
        let model_load_start = Instant::now();
        let info = self.source.info();

        let mut session_builder = Session::builder()
            .map_err(|e| {
                BgCompositeError::inference(format!("Failed to create session builder: {e}"))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                BgCompositeError::inference(format!("Failed to set optimization level: {e}"))
            })?;

        let providers = Self::select_providers(config.execution_provider);
        let provider_count = providers.len();
        if provider_count > 0 {
            session_builder = session_builder
                .with_execution_providers(providers)
                .map_err(|e| {
                    BgCompositeError::inference(format!("Failed to set execution providers: {e}"))
                })?;
        }

        let available = std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(8);
        let intra_threads = if config.intra_threads > 0 {
            config.intra_threads
        } else {
            available
        };
        let inter_threads = if config.inter_threads > 0 {
            config.inter_threads
        } else {
            (available / 4).max(1)
        };

        let session = session_builder
            .with_parallel_execution(true)
            .map_err(|e| {
                BgCompositeError::inference(format!("Failed to enable parallel execution: {e}"))
            })?
            .with_intra_threads(intra_threads)
            .map_err(|e| BgCompositeError::inference(format!("Failed to set intra threads: {e}")))?
            .with_inter_threads(inter_threads)
            .map_err(|e| BgCompositeError::inference(format!("Failed to set inter threads: {e}")))?
            .commit_from_memory(&self.source.bytes)
            .map_err(|e| BgCompositeError::model(format!("Failed to create session: {e}")))?;

        log::info!("Initialized ONNX Runtime backend");
        log::info!("  - Model: {} ({})", info.name, self.source.path.display());
        log::info!(
            "  - Requested provider: {} ({} accelerator(s) registered)",
            config.execution_provider,
            provider_count
        );
        log::debug!("  - Threading: {intra_threads} intra-op, {inter_threads} inter-op");

        self.session = Some(session);
        Ok(model_load_start.elapsed())
    }
}

impl InferenceBackend for OnnxBackend {
    fn initialize(&mut self, config: &RemovalConfig) -> Result<Option<Duration>> {
        if self.session.is_some() {
            return Ok(None);
        }
        self.load_model(config).map(Some)
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| BgCompositeError::internal("ONNX session not initialized"))?;

        let inference_start = Instant::now();
        log::debug!("Starting ONNX inference with input shape {:?}", input.dim());

        let input_value = Value::from_array(input.clone()).map_err(|e| {
            BgCompositeError::inference(format!("Failed to convert input tensor: {e}"))
        })?;

        // Positional inputs avoid depending on tensor names, which differ per model
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| BgCompositeError::inference(format!("ONNX inference failed: {e}")))?;

        let first_key = outputs
            .keys()
            .next()
            .ok_or_else(|| BgCompositeError::inference("No output tensors found"))?
            .to_string();
        let output_tensor = outputs
            .get(first_key.as_str())
            .ok_or_else(|| BgCompositeError::inference("First output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| {
                BgCompositeError::inference(format!("Failed to extract output tensor: {e}"))
            })?;

        let shape = output_tensor.shape().to_vec();
        let [n, c, h, w] = shape[..] else {
            return Err(BgCompositeError::inference(format!(
                "Expected 4D output tensor, got {}D",
                shape.len()
            )));
        };

        let output_array =
            Array4::from_shape_vec((n, c, h, w), output_tensor.iter().copied().collect())
                .map_err(|e| {
                    BgCompositeError::inference(format!("Failed to reshape output tensor: {e}"))
                })?;

        log::debug!(
            "ONNX inference completed in {:.2}ms",
            inference_start.elapsed().as_secs_f64() * 1000.0
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
        self.session.is_some()
    }
}
