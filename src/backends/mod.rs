//! Backend implementations for different inference engines
//!
//! - Tract backend (pure Rust, no external dependencies, default)
//! - ONNX Runtime backend (GPU acceleration, feature `onnx`)

use crate::error::{BgCompositeError, Result};
use crate::inference::InferenceBackend;
use crate::models::LoadedModel;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "tract")]
pub mod tract;

// Test utilities for backend testing
#[cfg(test)]
pub mod test_utils;

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxBackend;

#[cfg(feature = "tract")]
pub use self::tract::TractBackend;

/// Inference engine selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Pure Rust inference via tract
    #[default]
    Tract,
    /// ONNX Runtime
    Onnx,
}

impl BackendType {
    /// Whether this backend was compiled in
    #[must_use]
    pub fn is_available(self) -> bool {
        match self {
            Self::Tract => cfg!(feature = "tract"),
            Self::Onnx => cfg!(feature = "onnx"),
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tract => write!(f, "tract"),
            Self::Onnx => write!(f, "onnx"),
        }
    }
}

impl FromStr for BackendType {
    type Err = BgCompositeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tract" => Ok(Self::Tract),
            "onnx" | "ort" => Ok(Self::Onnx),
            other => Err(BgCompositeError::invalid_config(format!(
                "Unknown backend '{}'. Available: tract, onnx",
                other
            ))),
        }
    }
}

/// Create an uninitialized backend of the requested type for a loaded model
///
/// # Errors
/// `InvalidConfig` if the backend was not compiled into this build
pub fn create_backend(
    backend_type: BackendType,
    model: LoadedModel,
) -> Result<Box<dyn InferenceBackend>> {
    match backend_type {
        #[cfg(feature = "tract")]
        BackendType::Tract => Ok(Box::new(TractBackend::new(model))),
        #[cfg(feature = "onnx")]
        BackendType::Onnx => Ok(Box::new(OnnxBackend::new(model))),
        #[allow(unreachable_patterns)]
        other => {
            drop(model);
            Err(BgCompositeError::invalid_config(format!(
                "Backend '{}' is not available in this build (enable the '{}' feature)",
                other, other
            )))
        },
    }
}
