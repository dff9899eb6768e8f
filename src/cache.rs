//! Model file cache
//!
//! Downloaded models live in a flat directory, one `.onnx` file per model.
//! The directory is `$BG_COMPOSITE_CACHE_DIR`, else `$U2NET_HOME` (shared
//! with other u2net tooling), else `<user cache dir>/bg-composite/models`.

use crate::error::{BgCompositeError, Result};
use crate::models::{ModelSource, ModelSpec};
use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the cache directory
pub const CACHE_DIR_ENV: &str = "BG_COMPOSITE_CACHE_DIR";
/// Fallback environment variable understood by other u2net tools
pub const U2NET_HOME_ENV: &str = "U2NET_HOME";

/// Model cache rooted at a single directory
#[derive(Debug, Clone)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Create a cache in the directory chosen from the environment
    ///
    /// # Errors
    /// - No user cache directory could be determined
    /// - The directory could not be created
    pub fn new() -> Result<Self> {
        let cache_dir = resolve_cache_dir(
            std::env::var_os(CACHE_DIR_ENV),
            std::env::var_os(U2NET_HOME_ENV),
            dirs::cache_dir(),
        )?;
        Self::with_custom_cache_dir(&cache_dir)
    }

    /// Create a cache in an explicit directory
    ///
    /// # Errors
    /// The directory could not be created
    pub fn with_custom_cache_dir(cache_dir: &Path) -> Result<Self> {
        fs::create_dir_all(cache_dir)
            .map_err(|e| BgCompositeError::file_io_error("create cache directory", cache_dir, &e))?;
        Ok(Self {
            cache_dir: cache_dir.to_path_buf(),
        })
    }

    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Where the model for `spec` lives (or will live once downloaded)
    #[must_use]
    pub fn model_path(&self, spec: &ModelSpec) -> PathBuf {
        match &spec.source {
            ModelSource::File(path) => path.clone(),
            ModelSource::Default => self.cache_dir.join(spec.kind.file_name()),
            ModelSource::Url(url) => self.cache_dir.join(url_file_name(spec, url)),
        }
    }

    /// Whether a non-empty model file for `spec` is present
    #[must_use]
    pub fn is_model_cached(&self, spec: &ModelSpec) -> bool {
        fs::metadata(self.model_path(spec)).is_ok_and(|meta| meta.is_file() && meta.len() > 0)
    }
}

/// Pick the cache directory: explicit override, then `U2NET_HOME`, then the user cache
///
/// # Errors
/// `InvalidConfig` when none of the three is available
pub fn resolve_cache_dir(
    override_dir: Option<OsString>,
    u2net_home: Option<OsString>,
    user_cache_dir: Option<PathBuf>,
) -> Result<PathBuf> {
    if let Some(dir) = override_dir.filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    if let Some(dir) = u2net_home.filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    user_cache_dir
        .map(|dir| dir.join("bg-composite").join("models"))
        .ok_or_else(|| {
            BgCompositeError::invalid_config(format!(
                "Cannot determine a cache directory; set {}",
                CACHE_DIR_ENV
            ))
        })
}

/// Cache file name for a custom URL: kind plus a short digest of the URL
fn url_file_name(spec: &ModelSpec, url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let short: String = digest.iter().take(6).map(|b| format!("{b:02x}")).collect();
    format!("{}-{}.onnx", spec.kind, short)
}

/// Format a byte count for display
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", size, UNITS.get(unit).copied().unwrap_or("GB"))
    }
}
