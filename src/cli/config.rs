//! Conversion of CLI arguments into library configuration

use crate::cache::ModelCache;
use crate::cli::main_impl::Cli;
use crate::{
    backends::BackendType,
    config::{ExecutionProvider, RemovalConfig, ServerConfig},
    download::ModelDownloader,
    models::{ModelKind, ModelSource, ModelSpec},
};
use anyhow::{Context, Result};

pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build server and removal configuration from CLI arguments
    pub(crate) fn from_cli(cli: &Cli) -> Result<(ServerConfig, RemovalConfig)> {
        let server_config = ServerConfig::builder()
            .host(cli.host.clone())
            .port(cli.port)
            .static_dir(cli.static_dir.clone())
            .max_body_mb(cli.max_body_mb)
            .build()
            .context("Invalid server settings")?;

        let backend_type: BackendType = cli.backend.parse()?;
        if !backend_type.is_available() {
            anyhow::bail!(
                "Backend '{}' is not compiled in; rebuild with --features {}",
                backend_type,
                backend_type
            );
        }

        let execution_provider: ExecutionProvider = cli.execution_provider.parse()?;
        if backend_type == BackendType::Tract && execution_provider != ExecutionProvider::Auto {
            log::warn!(
                "Execution provider '{}' is ignored by the tract backend",
                execution_provider
            );
        }

        let removal_config = RemovalConfig::builder()
            .model_spec(Self::model_spec(cli)?)
            .backend_type(backend_type)
            .execution_provider(execution_provider)
            .num_threads(cli.threads)
            .build()
            .context("Invalid model settings")?;

        Ok((server_config, removal_config))
    }

    /// Model spec from `--model`, `--model-path`, `--model-url` and `--model-sha256`
    pub(crate) fn model_spec(cli: &Cli) -> Result<ModelSpec> {
        let kind: ModelKind = cli.model.parse()?;

        let source = match (&cli.model_path, &cli.model_url) {
            (Some(_), Some(_)) => anyhow::bail!("--model-path and --model-url are mutually exclusive"),
            (Some(path), None) => ModelSource::File(path.clone()),
            (None, Some(url)) => {
                crate::download::validate_model_url(url)?;
                ModelSource::Url(url.clone())
            },
            (None, None) => ModelSource::Default,
        };

        Ok(ModelSpec {
            kind,
            source,
            sha256: cli.model_sha256.clone(),
        })
    }

    /// Downloader for `--cache-dir`, or the environment-selected cache
    pub(crate) fn downloader(cli: &Cli) -> Result<ModelDownloader> {
        let cache = match &cli.cache_dir {
            Some(dir) => ModelCache::with_custom_cache_dir(dir)?,
            None => ModelCache::new()?,
        };
        Ok(ModelDownloader::with_cache(cache)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::PathBuf;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("bg-composite").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&[]);
        let (server, removal) = CliConfigBuilder::from_cli(&cli).unwrap();
        assert_eq!(server.port, 5000);
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.max_body_bytes, 32 * 1024 * 1024);
        assert_eq!(removal.model_spec, ModelSpec::new(ModelKind::U2Net));
        assert_eq!(removal.backend_type, BackendType::Tract);
    }

    #[test]
    fn test_model_flags() {
        let cli = parse(&["--model", "u2netp", "--model-path", "/models/custom.onnx"]);
        let spec = CliConfigBuilder::model_spec(&cli).unwrap();
        assert_eq!(spec.kind, ModelKind::U2NetP);
        assert_eq!(spec.source, ModelSource::File(PathBuf::from("/models/custom.onnx")));

        let cli = parse(&["--model-url", "https://example.com/m.onnx", "--model-sha256", "ab"]);
        let spec = CliConfigBuilder::model_spec(&cli).unwrap();
        assert_eq!(spec.source, ModelSource::Url("https://example.com/m.onnx".to_string()));
        assert_eq!(spec.sha256.as_deref(), Some("ab"));
        // Digest length is checked when the removal config is built
        assert!(CliConfigBuilder::from_cli(&cli).is_err());
    }

    #[test]
    fn test_invalid_values() {
        assert!(CliConfigBuilder::from_cli(&parse(&["--model", "nope"])).is_err());
        assert!(CliConfigBuilder::from_cli(&parse(&["--backend", "nope"])).is_err());
        assert!(CliConfigBuilder::from_cli(&parse(&["--execution-provider", "tpu"])).is_err());
        assert!(CliConfigBuilder::from_cli(&parse(&["--host", "not a host"])).is_err());
        assert!(CliConfigBuilder::from_cli(&parse(&["--max-body-mb", "0"])).is_err());
        assert!(Cli::try_parse_from(["bg-composite", "--model-path", "a", "--model-url", "b"]).is_err());
    }

    #[test]
    fn test_threads_and_server_flags() {
        let cli = parse(&["--threads", "6", "--port", "8080", "--static-dir", "/srv/static"]);
        let (server, removal) = CliConfigBuilder::from_cli(&cli).unwrap();
        assert_eq!((removal.intra_threads, removal.inter_threads), (6, 3));
        assert_eq!(server.port, 8080);
        assert_eq!(server.static_dir, PathBuf::from("/srv/static"));
    }

    #[test]
    fn test_downloader_with_cache_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cli = parse(&["--cache-dir", dir.path().to_str().unwrap()]);
        let downloader = CliConfigBuilder::downloader(&cli).unwrap();
        assert_eq!(downloader.cache().cache_dir(), dir.path());
    }
}
