//! Mock backend for testing the removal pipeline without model files

use crate::{
    config::RemovalConfig,
    error::{BgCompositeError, Result},
    inference::InferenceBackend,
    models::{ModelInfo, ModelKind, PreprocessingConfig},
};
use instant::Duration;
use ndarray::Array4;
use std::sync::{Arc, Mutex};

/// Shape of the synthetic mask emitted by [`MockBackend`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockMask {
    /// Left half foreground (1.0), right half background (0.0)
    LeftHalf,
    /// Every value equal
    Constant(f32),
}

/// Mock inference backend
#[derive(Debug, Clone)]
pub struct MockBackend {
    initialized: bool,
    kind: ModelKind,
    mask: MockMask,
    /// Output spatial size, independent of the input
    output_size: (usize, usize),
    call_history: Arc<Mutex<Vec<String>>>,
    should_fail_init: bool,
    should_fail_inference: bool,
}

impl MockBackend {
    /// Mock u2netp-shaped backend emitting a left-half mask
    #[must_use]
    pub fn new() -> Self {
        Self {
            initialized: false,
            kind: ModelKind::U2NetP,
            mask: MockMask::LeftHalf,
            output_size: (320, 320),
            call_history: Arc::new(Mutex::new(Vec::new())),
            should_fail_init: false,
            should_fail_inference: false,
        }
    }

    /// Create a mock backend that will fail during initialization
    #[must_use]
    pub fn new_failing_init() -> Self {
        let mut backend = Self::new();
        backend.should_fail_init = true;
        backend
    }

    /// Create a mock backend that will fail during inference
    #[must_use]
    pub fn new_failing_inference() -> Self {
        let mut backend = Self::new();
        backend.should_fail_inference = true;
        backend
    }

    #[must_use]
    pub fn with_mask(mut self, mask: MockMask) -> Self {
        self.mask = mask;
        self
    }

    #[must_use]
    pub fn with_output_size(mut self, height: usize, width: usize) -> Self {
        self.output_size = (height, width);
        self
    }

    /// Shared handle to the call history, usable after the backend is boxed
    #[must_use]
    pub fn call_history(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.call_history)
    }

    fn record_call(&self, method: &str) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(method.to_string());
        }
    }

    fn generate_output(&self) -> Array4<f32> {
        let (height, width) = self.output_size;
        match self.mask {
            MockMask::Constant(value) => Array4::from_elem((1, 1, height, width), value),
            MockMask::LeftHalf => Array4::from_shape_fn((1, 1, height, width), |(_, _, _, x)| {
                if x < width / 2 {
                    1.0
                } else {
                    0.0
                }
            }),
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(&mut self, _config: &RemovalConfig) -> Result<Option<Duration>> {
        self.record_call("initialize");

        if self.should_fail_init {
            return Err(BgCompositeError::model("Mock backend initialization failed"));
        }
        if self.initialized {
            return Ok(None);
        }

        self.initialized = true;
        Ok(Some(Duration::from_millis(1)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        self.record_call("infer");

        if !self.initialized {
            return Err(BgCompositeError::internal("Backend not initialized"));
        }
        if self.should_fail_inference {
            return Err(BgCompositeError::inference("Mock inference failed"));
        }

        let expected = self.input_shape();
        if input.dim() != expected {
            return Err(BgCompositeError::inference(format!(
                "Expected input shape {:?}, got {:?}",
                expected,
                input.dim()
            )));
        }

        Ok(self.generate_output())
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        let [width, height] = self.kind.preprocessing_config().target_size;
        (1, 3, height as usize, width as usize)
    }

    fn preprocessing_config(&self) -> PreprocessingConfig {
        self.kind.preprocessing_config()
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: format!("mock-{}", self.kind),
            size_bytes: 1024,
            input_shape: self.input_shape(),
        }
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_failures() {
        let mut backend = MockBackend::new_failing_init();
        assert!(backend.initialize(&RemovalConfig::default()).is_err());

        let mut backend = MockBackend::new_failing_inference();
        backend.initialize(&RemovalConfig::default()).unwrap();
        let input = Array4::zeros(backend.input_shape());
        assert!(matches!(
            backend.infer(&input),
            Err(BgCompositeError::Inference(_))
        ));
    }

    #[test]
    fn test_mock_rejects_uninitialized_and_wrong_shape() {
        let mut backend = MockBackend::new();
        let input = Array4::zeros(backend.input_shape());
        assert!(backend.infer(&input).is_err());

        backend.initialize(&RemovalConfig::default()).unwrap();
        assert!(backend.infer(&Array4::zeros((1, 3, 8, 8))).is_err());
        assert!(backend.infer(&input).is_ok());

        let history = backend.call_history();
        assert_eq!(
            history.lock().unwrap().as_slice(),
            ["infer", "initialize", "infer", "infer"]
        );
    }
}
