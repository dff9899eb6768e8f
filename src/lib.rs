#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # bg-composite
//!
//! Background removal and subject-over-background compositing, served over HTTP.
//!
//! A segmentation model (U²-Net family, run on Tract or ONNX Runtime) cuts the
//! subject out of an uploaded photo; the compositor then scales the cut-out to
//! 80% of a background's height, centres it horizontally and rests it 20 px
//! above the bottom edge.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bg_composite::{
//!     server::{self, AppState},
//!     ModelDownloader, ModelRemover, RemovalConfig, ServerConfig,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let downloader = ModelDownloader::new()?;
//! let remover = ModelRemover::load(RemovalConfig::default(), &downloader).await?;
//!
//! server::serve(
//!     ServerConfig::default(),
//!     AppState::new(Arc::new(remover)),
//!     async { tokio::signal::ctrl_c().await.ok(); },
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Compositing without a model
//!
//! ```rust,no_run
//! use bg_composite::composite_images;
//!
//! # fn example() -> anyhow::Result<()> {
//! let subject = image::open("cutout.png")?;
//! let background = image::open("beach.jpg")?;
//! let result = composite_images(subject, background)?;
//! result.image.save("composite.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `tract` (default): Pure Rust inference backend
//! - `onnx`: ONNX Runtime backend with CUDA/CoreML execution providers
//! - `cli` (default): Server binary, subscriber setup and download progress
//! - `webp-support` (default): WebP decoding
//! - `tracing-json`, `tracing-files`: extra log outputs for the binary

pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compositor;
pub mod config;
pub mod download;
pub mod error;
pub mod inference;
pub mod models;
pub mod removal;
pub mod server;
pub mod services;
pub mod tracing_config;
pub mod types;
pub mod utils;

use image::DynamicImage;

// Public API exports
pub use backends::{create_backend, BackendType};
pub use cache::{format_size, ModelCache};
pub use compositor::{composite_images, ImageCompositor};
pub use config::{ExecutionProvider, RemovalConfig, ServerConfig};
pub use download::{validate_model_url, ModelDownloader};
pub use error::{BgCompositeError, Result};
pub use inference::InferenceBackend;
pub use models::{ModelKind, ModelSource, ModelSpec};
pub use removal::{BackgroundRemover, ModelRemover};
pub use services::ImageCodec;
pub use tracing_config::{TracingConfig, TracingFormat, TracingOutput};
pub use types::{CompositeResult, Placement, RasterImage, RemovalResult, SegmentationMask};

/// Composite two data-URL images and return the result as a PNG data URL
///
/// Both inputs are `data:<mime>;base64,<payload>` strings; the subject must
/// carry an alpha channel.
///
/// # Errors
/// - `InvalidRequest` for a malformed data URL or base64 payload
/// - `ImageDecode` when a payload is not a supported image
/// - `InvalidImage` for an empty background or a subject without alpha
pub fn composite_data_urls(person: &str, background: &str) -> Result<String> {
    let subject = ImageCodec::decode_data_url(person)?;
    let background = ImageCodec::decode_data_url(background)?;
    let result = composite_images(subject, background)?;
    tracing::debug!(
        width = result.placement.width,
        height = result.placement.height,
        x = result.placement.x,
        y = result.placement.y,
        "Subject placed"
    );
    ImageCodec::rgba_to_data_url(&result.image)
}

/// Decode raw upload bytes, remove the background and return the cut-out
///
/// # Errors
/// - `ImageDecode` when the bytes are not a supported image
/// - Any failure of `remover`
pub fn remove_background_from_bytes(
    remover: &dyn BackgroundRemover,
    image_bytes: &[u8],
) -> Result<RasterImage> {
    let image: DynamicImage = ImageCodec::decode_bytes(image_bytes)?;
    remover.remove(&image)
}
