//! Model downloading
//!
//! Streams a model file into the cache with progress reporting and optional
//! SHA-256 verification. Downloads land in `<file>.part` and are renamed into
//! place only once complete and verified, so an interrupted run never leaves
//! a truncated model behind.

use crate::cache::{format_size, ModelCache};
use crate::error::{BgCompositeError, Result};
use crate::models::{ModelSource, ModelSpec};
use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;

/// Progress bar abstraction that works with and without CLI features
#[derive(Debug)]
pub enum ProgressIndicator {
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    NoOp,
}

impl ProgressIndicator {
    pub fn set_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_message(msg),
            Self::NoOp => {},
        }
    }

    pub fn set_length(&self, len: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_length(len),
            Self::NoOp => {},
        }
    }

    pub fn set_position(&self, pos: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_position(pos),
            Self::NoOp => {},
        }
    }

    pub fn finish_with_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(msg),
            Self::NoOp => {},
        }
    }
}

/// Model downloader backed by a [`ModelCache`]
#[derive(Debug)]
pub struct ModelDownloader {
    client: Client,
    cache: ModelCache,
    show_progress: bool,
}

impl ModelDownloader {
    /// Create a downloader using the environment-selected cache directory
    ///
    /// # Errors
    /// - Failed to create HTTP client
    /// - Failed to initialize model cache
    pub fn new() -> Result<Self> {
        Self::with_cache(ModelCache::new()?)
    }

    /// Create a downloader for an explicit cache
    ///
    /// # Errors
    /// Failed to create HTTP client
    pub fn with_cache(cache: ModelCache) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(600))
            .build()
            .map_err(|e| BgCompositeError::network_error("Failed to create HTTP client", e))?;

        Ok(Self {
            client,
            cache,
            show_progress: false,
        })
    }

    /// Show a progress bar while downloading (only with the `cli` feature)
    #[must_use]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    /// Return a local path for the model, downloading it on first use
    ///
    /// # Errors
    /// - Explicit model file missing
    /// - Network errors or non-success HTTP status
    /// - SHA-256 mismatch
    /// - File system errors while writing the cache
    pub async fn ensure_model(&self, spec: &ModelSpec) -> Result<PathBuf> {
        let path = self.cache.model_path(spec);

        if let ModelSource::File(_) = spec.source {
            if !path.is_file() {
                return Err(BgCompositeError::model(format!(
                    "Model file '{}' does not exist",
                    path.display()
                )));
            }
            return Ok(path);
        }

        if self.cache.is_model_cached(spec) {
            log::debug!("Using cached model {}", path.display());
            return Ok(path);
        }

        let url = spec
            .download_url()
            .ok_or_else(|| BgCompositeError::internal("Model source has no download URL"))?;
        validate_model_url(&url)?;

        log::info!("Downloading model {} from {}", spec.kind, url);
        let part_path = part_path(&path);
        let progress = self.create_progress_indicator();

        let outcome = async {
            let downloaded = self.download_file(&url, &part_path, &progress).await?;
            if !verify_file_integrity(&part_path, spec.sha256.as_deref())? {
                return Err(BgCompositeError::model(format!(
                    "SHA-256 mismatch for model downloaded from {}",
                    url
                )));
            }
            tokio::fs::rename(&part_path, &path)
                .await
                .map_err(|e| BgCompositeError::file_io_error("move model into cache", &path, &e))?;
            Ok(downloaded)
        }
        .await;

        match outcome {
            Ok(downloaded) => {
                progress.finish_with_message(format!("Downloaded {}", spec.kind));
                log::info!(
                    "Cached model {} ({}) at {}",
                    spec.kind,
                    format_size(downloaded),
                    path.display()
                );
                Ok(path)
            },
            Err(e) => {
                progress.finish_with_message("Download failed".to_string());
                if let Err(remove_err) = tokio::fs::remove_file(&part_path).await {
                    log::debug!(
                        "Could not remove partial download {}: {}",
                        part_path.display(),
                        remove_err
                    );
                }
                Err(e)
            },
        }
    }

    fn create_progress_indicator(&self) -> ProgressIndicator {
        #[cfg(feature = "cli")]
        {
            if self.show_progress {
                let pb = ProgressBar::new(0);
                if let Ok(style) = ProgressStyle::default_bar().template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
                ) {
                    pb.set_style(style.progress_chars("#>-"));
                }
                return ProgressIndicator::Indicatif(pb);
            }
        }
        ProgressIndicator::NoOp
    }

    /// Stream `url` into `local_path`, returning the byte count
    async fn download_file(
        &self,
        url: &str,
        local_path: &Path,
        progress: &ProgressIndicator,
    ) -> Result<u64> {
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BgCompositeError::file_io_error("create directory", parent, &e))?;
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BgCompositeError::network_error(format!("Failed to download {}", url), e))?;

        if !response.status().is_success() {
            return Err(BgCompositeError::network_error(
                format!("Failed to download {}", url),
                format!("HTTP {}", response.status()),
            ));
        }

        if let Some(total) = response.content_length() {
            progress.set_length(total);
        }

        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| BgCompositeError::file_io_error("create file", local_path, &e))?;

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut downloaded = 0u64;
        let mut buffer = vec![0; 64 * 1024];

        loop {
            let bytes_read = stream
                .read(&mut buffer)
                .await
                .map_err(|e| BgCompositeError::network_error("Failed to read download stream", e))?;

            if bytes_read == 0 {
                break;
            }

            file.write_all(buffer.get(..bytes_read).unwrap_or(&[]))
                .await
                .map_err(|e| BgCompositeError::file_io_error("write to file", local_path, &e))?;

            downloaded += bytes_read as u64;
            progress.set_position(downloaded);
        }

        file.flush()
            .await
            .map_err(|e| BgCompositeError::file_io_error("flush file", local_path, &e))?;

        if downloaded == 0 {
            return Err(BgCompositeError::model(format!(
                "Downloaded model from {} is empty",
                url
            )));
        }

        log::debug!("Downloaded {} bytes to {}", downloaded, local_path.display());
        Ok(downloaded)
    }
}

/// Verify a file against an expected SHA-256 hex digest
///
/// Returns `Ok(true)` when no digest is given.
///
/// # Errors
/// The file could not be read
pub fn verify_file_integrity(file_path: &Path, expected_hash: Option<&str>) -> Result<bool> {
    let Some(expected) = expected_hash else {
        return Ok(true);
    };

    let contents = std::fs::read(file_path)
        .map_err(|e| BgCompositeError::file_io_error("read file for verification", file_path, &e))?;

    let actual_hash = format!("{:x}", Sha256::digest(&contents));
    if actual_hash.eq_ignore_ascii_case(expected.trim()) {
        Ok(true)
    } else {
        log::warn!(
            "File integrity check failed for {}: expected {}, got {}",
            file_path.display(),
            expected,
            actual_hash
        );
        Ok(false)
    }
}

/// Check that a model URL is something we can fetch
///
/// # Errors
/// `InvalidConfig` for empty or non-HTTP(S) URLs
pub fn validate_model_url(url: &str) -> Result<()> {
    if url.trim().is_empty() {
        return Err(BgCompositeError::invalid_config("Model URL cannot be empty"));
    }
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return Err(BgCompositeError::invalid_config(format!(
            "Unsupported model URL '{}': expected http:// or https://",
            url
        )));
    }
    Ok(())
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}
