//! Segmentation model registry
//!
//! A model is described by its kind (which fixes input size and
//! normalisation) and a source telling where the ONNX file comes from.

use crate::error::{BgCompositeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

const RELEASE_BASE_URL: &str = "https://github.com/danielgatis/rembg/releases/download/v0.0.0";

/// Supported segmentation model families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    /// General purpose U²-Net (176 MB)
    #[default]
    U2Net,
    /// Lightweight U²-Net (4.7 MB)
    U2NetP,
    /// IS-Net general use model, 1024px input
    IsNetGeneralUse,
}

impl ModelKind {
    /// All known kinds, in display order
    pub const ALL: [ModelKind; 3] = [Self::U2Net, Self::U2NetP, Self::IsNetGeneralUse];

    /// Stable identifier used on the command line and in cache file names
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::U2Net => "u2net",
            Self::U2NetP => "u2netp",
            Self::IsNetGeneralUse => "isnet-general-use",
        }
    }

    /// File name of the cached ONNX model
    #[must_use]
    pub fn file_name(self) -> String {
        format!("{}.onnx", self.id())
    }

    /// Default download location
    #[must_use]
    pub fn default_url(self) -> String {
        format!("{}/{}", RELEASE_BASE_URL, self.file_name())
    }

    /// Input normalisation expected by the model
    #[must_use]
    pub fn preprocessing_config(self) -> PreprocessingConfig {
        match self {
            Self::U2Net | Self::U2NetP => PreprocessingConfig {
                target_size: [320, 320],
                normalization_mean: [0.485, 0.456, 0.406],
                normalization_std: [0.229, 0.224, 0.225],
            },
            Self::IsNetGeneralUse => PreprocessingConfig {
                target_size: [1024, 1024],
                normalization_mean: [0.5, 0.5, 0.5],
                normalization_std: [1.0, 1.0, 1.0],
            },
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ModelKind {
    type Err = BgCompositeError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.id() == normalized)
            .ok_or_else(|| {
                BgCompositeError::invalid_config(format!(
                    "Unknown model '{}'. Available: {}",
                    s,
                    Self::ALL.map(ModelKind::id).join(", ")
                ))
            })
    }
}

/// Where the ONNX file for a model comes from
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModelSource {
    /// The kind's default URL, cached on first use
    #[default]
    Default,
    /// A custom URL, cached on first use
    Url(String),
    /// A model file already on disk
    File(PathBuf),
}

/// Complete model specification
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModelSpec {
    pub kind: ModelKind,
    pub source: ModelSource,
    /// Expected SHA-256 (hex) of the downloaded file
    pub sha256: Option<String>,
}

impl ModelSpec {
    /// Spec for a kind fetched from its default URL
    #[must_use]
    pub fn new(kind: ModelKind) -> Self {
        Self {
            kind,
            source: ModelSource::Default,
            sha256: None,
        }
    }

    /// Spec for a model file on disk
    #[must_use]
    pub fn from_file<P: Into<PathBuf>>(kind: ModelKind, path: P) -> Self {
        Self {
            kind,
            source: ModelSource::File(path.into()),
            sha256: None,
        }
    }

    /// URL to download from, if this spec needs downloading at all
    #[must_use]
    pub fn download_url(&self) -> Option<String> {
        match &self.source {
            ModelSource::Default => Some(self.kind.default_url()),
            ModelSource::Url(url) => Some(url.clone()),
            ModelSource::File(_) => None,
        }
    }

    /// Get a display name for tracing and logging
    #[must_use]
    pub fn display_name(&self) -> String {
        match &self.source {
            ModelSource::Default => format!("{}:default", self.kind),
            ModelSource::Url(url) => format!("{}:url:{}", self.kind, url),
            ModelSource::File(path) => format!(
                "{}:file:{}",
                self.kind,
                path.file_name().unwrap_or_default().to_string_lossy()
            ),
        }
    }
}

/// Model preprocessing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    /// Model input size as `[width, height]`
    pub target_size: [u32; 2],
    /// Per-channel mean subtracted after scaling to 0..1
    pub normalization_mean: [f32; 3],
    /// Per-channel standard deviation divided out after mean subtraction
    pub normalization_std: [f32; 3],
}

/// Model information and metadata
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: String,
    pub size_bytes: usize,
    pub input_shape: (usize, usize, usize, usize), // NCHW format
}

/// A model file loaded into memory, ready to hand to a backend
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub kind: ModelKind,
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

impl LoadedModel {
    /// Read a model file from disk
    ///
    /// # Errors
    /// - File missing or unreadable
    /// - File is empty
    pub fn from_path<P: Into<PathBuf>>(kind: ModelKind, path: P) -> Result<Self> {
        let path = path.into();
        let bytes = std::fs::read(&path)
            .map_err(|e| BgCompositeError::file_io_error("read model file", &path, &e))?;
        if bytes.is_empty() {
            return Err(BgCompositeError::model(format!(
                "Model file '{}' is empty",
                path.display()
            )));
        }
        Ok(Self { kind, path, bytes })
    }

    #[must_use]
    pub fn info(&self) -> ModelInfo {
        let [width, height] = self.kind.preprocessing_config().target_size;
        ModelInfo {
            name: self.kind.id().to_string(),
            size_bytes: self.bytes.len(),
            input_shape: (1, 3, height as usize, width as usize),
        }
    }
}
