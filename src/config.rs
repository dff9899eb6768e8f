//! Configuration types for the removal pipeline and the HTTP server

use crate::backends::BackendType;
use crate::error::{BgCompositeError, Result};
use crate::models::ModelSpec;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

/// Default bind host
pub const DEFAULT_HOST: &str = "0.0.0.0";
/// Default bind port
pub const DEFAULT_PORT: u16 = 5000;
/// Default request body limit (32 MiB)
pub const DEFAULT_MAX_BODY_BYTES: u64 = 32 * 1024 * 1024;
/// Upper bound accepted for the body limit (1 GiB)
pub const MAX_BODY_BYTES_LIMIT: u64 = 1024 * 1024 * 1024;
/// Upper bound accepted for inference thread counts
pub const MAX_THREADS: usize = 256;

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl FromStr for ExecutionProvider {
    type Err = BgCompositeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(BgCompositeError::invalid_config(format!(
                "Unknown execution provider '{}'. Available: auto, cpu, cuda, coreml",
                other
            ))),
        }
    }
}

/// Configuration for model-backed background removal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalConfig {
    /// Which model to load and where it comes from
    pub model_spec: ModelSpec,

    /// Inference engine
    pub backend_type: BackendType,

    /// Execution provider (ONNX Runtime only)
    pub execution_provider: ExecutionProvider,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// Number of inter-op threads for inference (0 = auto)
    pub inter_threads: usize,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            model_spec: ModelSpec::default(),
            backend_type: BackendType::default(),
            execution_provider: ExecutionProvider::default(),
            intra_threads: 0,
            inter_threads: 0,
        }
    }
}

impl RemovalConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    /// ```rust
    /// use bg_composite::{ExecutionProvider, RemovalConfig};
    ///
    /// let config = RemovalConfig::builder()
    ///     .execution_provider(ExecutionProvider::Cpu)
    ///     .num_threads(4)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.inter_threads, 2);
    /// ```
    #[must_use]
    pub fn builder() -> RemovalConfigBuilder {
        RemovalConfigBuilder::default()
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Thread counts above [`MAX_THREADS`]
    /// - Expected SHA-256 that is not 64 hex characters
    pub fn validate(&self) -> Result<()> {
        if self.intra_threads > MAX_THREADS {
            return Err(BgCompositeError::config_value_error(
                "intra-op threads",
                self.intra_threads,
                "0-256",
            ));
        }

        if self.inter_threads > MAX_THREADS {
            return Err(BgCompositeError::config_value_error(
                "inter-op threads",
                self.inter_threads,
                "0-256",
            ));
        }

        if let Some(ref digest) = self.model_spec.sha256 {
            if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(BgCompositeError::invalid_config(format!(
                    "SHA-256 digest must be 64 hex characters, got '{}'",
                    digest
                )));
            }
        }

        Ok(())
    }
}

/// Builder for `RemovalConfig`
#[derive(Debug, Default)]
pub struct RemovalConfigBuilder {
    config: RemovalConfig,
}

impl RemovalConfigBuilder {
    /// Set the model specification
    #[must_use]
    pub fn model_spec(mut self, model_spec: ModelSpec) -> Self {
        self.config.model_spec = model_spec;
        self
    }

    /// Set the inference backend
    #[must_use]
    pub fn backend_type(mut self, backend_type: BackendType) -> Self {
        self.config.backend_type = backend_type;
        self
    }

    /// Set execution provider
    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    /// Set number of intra-op threads
    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    /// Set number of inter-op threads
    #[must_use]
    pub fn inter_threads(mut self, threads: usize) -> Self {
        self.config.inter_threads = threads;
        self
    }

    /// Set both thread counts: `threads` intra-op, half of it inter-op (0 = auto)
    #[must_use]
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self.config.inter_threads = if threads > 0 { (threads / 2).max(1) } else { 0 };
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// Any failure reported by [`RemovalConfig::validate`]
    pub fn build(self) -> Result<RemovalConfig> {
        let config = self.config;
        config.validate()?;
        Ok(config)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,

    /// TCP port to bind
    pub port: u16,

    /// Directory served under `/static`
    pub static_dir: PathBuf,

    /// Largest accepted request body in bytes
    pub max_body_bytes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            static_dir: PathBuf::from("static"),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Resolve host and port into a bindable address
    ///
    /// # Errors
    /// `InvalidConfig` when the host is not an IP address (or `localhost`)
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let host = if self.host.eq_ignore_ascii_case("localhost") {
            "127.0.0.1"
        } else {
            self.host.as_str()
        };
        let ip = IpAddr::from_str(host).map_err(|e| {
            BgCompositeError::invalid_config(format!("Invalid host '{}': {}", self.host, e))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Unparseable host
    /// - Body limit of zero or above [`MAX_BODY_BYTES_LIMIT`]
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        if self.max_body_bytes == 0 || self.max_body_bytes > MAX_BODY_BYTES_LIMIT {
            return Err(BgCompositeError::config_value_error(
                "max body size",
                self.max_body_bytes,
                "1 byte - 1 GiB",
            ));
        }

        Ok(())
    }
}

/// Builder for `ServerConfig`
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    #[must_use]
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.config.host = host.into();
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    #[must_use]
    pub fn static_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.static_dir = dir.into();
        self
    }

    #[must_use]
    pub fn max_body_bytes(mut self, bytes: u64) -> Self {
        self.config.max_body_bytes = bytes;
        self
    }

    /// Set the body limit in mebibytes
    #[must_use]
    pub fn max_body_mb(mut self, megabytes: u64) -> Self {
        self.config.max_body_bytes = megabytes.saturating_mul(1024 * 1024);
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// Any failure reported by [`ServerConfig::validate`]
    pub fn build(self) -> Result<ServerConfig> {
        let config = self.config;
        config.validate()?;
        Ok(config)
    }
}
