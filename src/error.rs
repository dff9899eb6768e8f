//! Error types for removal, compositing and request handling

use thiserror::Error;

/// Result type alias for all fallible operations in this crate
pub type Result<T> = std::result::Result<T, BgCompositeError>;

/// Coarse classification used at the HTTP boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or malformed request fields (HTTP 400)
    ClientInput,
    /// Anything that failed while decoding, removing, compositing or encoding (HTTP 500)
    Processing,
}

/// Error types for background removal and compositing operations
#[derive(Error, Debug)]
pub enum BgCompositeError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image encoding or pixel-level errors reported by the image crate
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Bytes that could not be decoded as a supported raster format
    #[error("Image decode error: {0}")]
    ImageDecode(String),

    /// Decoded image unusable for the requested operation
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Missing or malformed request fields
    #[error("{0}")]
    InvalidRequest(String),

    /// Backend inference errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Model loading or initialization errors
    #[error("Model error: {0}")]
    Model(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Model download failures
    #[error("Network error: {0}")]
    Network(String),

    /// Generic processing failure
    #[error("Processing error: {0}")]
    Processing(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BgCompositeError {
    /// Create a new image decode error
    pub fn image_decode<S: Into<String>>(msg: S) -> Self {
        Self::ImageDecode(msg.into())
    }

    /// Create a new invalid image error
    pub fn invalid_image<S: Into<String>>(msg: S) -> Self {
        Self::InvalidImage(msg.into())
    }

    /// Create a new client input error
    pub fn invalid_request<S: Into<String>>(msg: S) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a network error with the underlying cause appended
    pub fn network_error<S: Into<String>, E: std::fmt::Display>(context: S, error: E) -> Self {
        Self::Network(format!("{}: {}", context.into(), error))
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {})",
            parameter, value, valid_range
        ))
    }

    /// Classify the error for the HTTP boundary
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) => ErrorKind::ClientInput,
            _ => ErrorKind::Processing,
        }
    }

    /// Whether this error was caused by the client's request
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.kind() == ErrorKind::ClientInput
    }
}
