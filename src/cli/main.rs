//! Server launcher
//!
//! Parses flags (each with a `BG_COMPOSITE_*` environment fallback), sets up
//! tracing, resolves the model and serves the HTTP API until Ctrl-C.

use super::config::CliConfigBuilder;
use crate::{
    removal::ModelRemover,
    server::{self, AppState},
    tracing_config::{TracingConfig, TracingFormat, TracingGuard, TracingOutput},
};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// HTTP service for background removal and subject-over-background compositing
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bg-composite")]
pub struct Cli {
    /// Interface to bind
    #[arg(long, env = "BG_COMPOSITE_HOST", default_value = crate::config::DEFAULT_HOST)]
    pub host: String,

    /// Port to bind
    #[arg(short, long, env = "BG_COMPOSITE_PORT", default_value_t = crate::config::DEFAULT_PORT)]
    pub port: u16,

    /// Segmentation model (u2net, u2netp, isnet-general-use)
    #[arg(short, long, env = "BG_COMPOSITE_MODEL", default_value = "u2net")]
    pub model: String,

    /// Use a local ONNX file instead of downloading
    #[arg(long, env = "BG_COMPOSITE_MODEL_PATH", value_name = "PATH", conflicts_with = "model_url")]
    pub model_path: Option<PathBuf>,

    /// Download the model from this URL instead of the default release
    #[arg(long, env = "BG_COMPOSITE_MODEL_URL", value_name = "URL")]
    pub model_url: Option<String>,

    /// Expected SHA-256 of the downloaded model (hex)
    #[arg(long, env = "BG_COMPOSITE_MODEL_SHA256", value_name = "HEX")]
    pub model_sha256: Option<String>,

    /// Inference backend (tract, onnx)
    #[arg(short, long, env = "BG_COMPOSITE_BACKEND", default_value = "tract")]
    pub backend: String,

    /// Execution provider for the onnx backend (auto, cpu, cuda, coreml)
    #[arg(short, long, env = "BG_COMPOSITE_EXECUTION_PROVIDER", default_value = "auto")]
    pub execution_provider: String,

    /// Inference threads (0 = auto-detect)
    #[arg(short, long, env = "BG_COMPOSITE_THREADS", default_value_t = 0)]
    pub threads: usize,

    /// Directory served under /static
    #[arg(long, env = "BG_COMPOSITE_STATIC_DIR", default_value = "static")]
    pub static_dir: PathBuf,

    /// Largest accepted request body, in MiB
    #[arg(long, env = "BG_COMPOSITE_MAX_BODY_MB", default_value_t = 32)]
    pub max_body_mb: u64,

    /// Model cache directory
    #[arg(long, env = "BG_COMPOSITE_CACHE_DIR", value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE, -vvv: TRACE including HTTP internals)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log line format
    #[arg(long, env = "BG_COMPOSITE_LOG_FORMAT", value_enum, default_value_t = TracingFormat::Console)]
    pub log_format: TracingFormat,

    /// Also write logs to this file (daily rotation)
    #[arg(long, env = "BG_COMPOSITE_LOG_FILE", value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Download the model into the cache and exit
    #[arg(long)]
    pub download_only: bool,

    /// Print the model cache directory and exit
    #[arg(long)]
    pub show_cache_dir: bool,
}

/// Main entry point for the server binary
///
/// # Errors
/// - Invalid flags or configuration
/// - Model download or initialization failures
/// - The listen address could not be bound
pub async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _tracing_guard = init_tracing(&cli)?;

    let (server_config, removal_config) =
        CliConfigBuilder::from_cli(&cli).context("Invalid configuration")?;
    let downloader = CliConfigBuilder::downloader(&cli)
        .context("Failed to set up model cache")?
        .with_progress(std::io::stderr().is_terminal());

    if cli.show_cache_dir {
        println!("{}", downloader.cache().cache_dir().display());
        return Ok(());
    }

    if cli.download_only {
        let path = downloader
            .ensure_model(&removal_config.model_spec)
            .await
            .context("Failed to download model")?;
        println!("{}", path.display());
        return Ok(());
    }

    let remover = ModelRemover::load(removal_config, &downloader)
        .await
        .context("Failed to load background removal model")?;

    server::serve(
        server_config,
        AppState::new(Arc::new(remover)),
        shutdown_signal(),
    )
    .await
    .context("Server failed")?;

    Ok(())
}

fn init_tracing(cli: &Cli) -> Result<TracingGuard> {
    let output = match &cli.log_file {
        Some(path) => TracingOutput::Both(path.clone()),
        None => TracingOutput::Console,
    };

    let mut config = TracingConfig::new()
        .with_verbosity(cli.verbose)
        .with_format(cli.log_format)
        .with_output(output);
    if let Ok(directives) = std::env::var("RUST_LOG") {
        config = config.with_env_filter(directives);
    }

    config.init().context("Failed to initialize tracing subscriber")
}

/// Resolve on Ctrl-C; never resolve if the signal handler cannot be installed
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!(error = %e, "Cannot listen for Ctrl-C; graceful shutdown disabled");
            std::future::pending::<()>().await;
        },
    }
}
