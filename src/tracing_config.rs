//! Tracing configuration for structured logging
//!
//! The library only emits spans and events; the binary installs the
//! subscriber described by a [`TracingConfig`].

#[cfg(feature = "cli")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum TracingFormat {
    /// Human-readable console output with colors
    #[default]
    Console,
    /// Compact output without colors, for CI and log collectors
    Compact,
    /// JSON lines (requires the `tracing-json` feature)
    Json,
}

/// Where log lines go
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TracingOutput {
    /// stdout (default)
    #[default]
    Console,
    /// Daily-rotated file (requires the `tracing-files` feature)
    File(std::path::PathBuf),
    /// Both stdout and a daily-rotated file
    Both(std::path::PathBuf),
}

impl TracingOutput {
    fn writes_console(&self) -> bool {
        matches!(self, Self::Console | Self::Both(_))
    }

    #[cfg_attr(not(feature = "tracing-files"), allow(dead_code))]
    fn file_path(&self) -> Option<&std::path::Path> {
        match self {
            Self::Console => None,
            Self::File(path) | Self::Both(path) => Some(path),
        }
    }
}

/// Tracing configuration builder
#[derive(Debug, Default)]
pub struct TracingConfig {
    /// Verbosity level (maps to log levels)
    pub verbosity: u8,
    pub format: TracingFormat,
    pub output: TracingOutput,
    /// Explicit filter directives; overrides `verbosity` when set
    pub env_filter: Option<String>,
}

/// Keeps background log writers alive; drop it only at shutdown
#[derive(Debug)]
#[must_use = "dropping the guard stops file logging"]
pub struct TracingGuard {
    #[cfg(feature = "tracing-files")]
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity level (0-3+)
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: TracingOutput) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Convert verbosity level to tracing filter string
    ///
    /// The HTTP stack is noisy at debug level, so it stays at `info` until `-vvv`.
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "info",
            1 => "debug,hyper=info,warp=info",
            2 => "trace,hyper=info,warp=info",
            _ => "trace",
        }
    }

    /// Install the global subscriber
    ///
    /// # Errors
    /// - Invalid filter directives
    /// - A format or output whose feature is not compiled in
    /// - A global subscriber is already installed
    #[cfg(feature = "cli")]
    pub fn init(self) -> anyhow::Result<TracingGuard> {
        let filter = match &self.env_filter {
            Some(directives) => EnvFilter::try_new(directives)?,
            None => EnvFilter::try_new(self.verbosity_to_filter())?,
        };

        let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
        if self.output.writes_console() {
            layers.push(self.console_layer()?);
        }

        #[cfg(feature = "tracing-files")]
        let file_guard = match self.output.file_path() {
            Some(path) => {
                use tracing_appender::{non_blocking, rolling};

                let directory = path.parent().unwrap_or_else(|| std::path::Path::new("."));
                let prefix = path
                    .file_name()
                    .unwrap_or_else(|| std::ffi::OsStr::new("bg-composite.log"));
                let (writer, guard) = non_blocking(rolling::daily(directory, prefix));
                layers.push(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer)
                        .compact()
                        .boxed(),
                );
                Some(guard)
            },
            None => None,
        };

        #[cfg(not(feature = "tracing-files"))]
        {
            if self.output.file_path().is_some() {
                anyhow::bail!("File logging requires the 'tracing-files' feature");
            }
        }

        tracing_subscriber::registry()
            .with(layers)
            .with(filter)
            .try_init()?;

        Ok(TracingGuard {
            #[cfg(feature = "tracing-files")]
            _file_guard: file_guard,
        })
    }

    #[cfg(feature = "cli")]
    fn console_layer(&self) -> anyhow::Result<Box<dyn Layer<Registry> + Send + Sync>> {
        use tracing_subscriber::fmt;

        let layer = match self.format {
            TracingFormat::Console => fmt::layer()
                .with_ansi(true)
                .with_target(false)
                .with_level(true)
                .compact()
                .boxed(),
            TracingFormat::Compact => fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .compact()
                .boxed(),
            #[cfg(feature = "tracing-json")]
            TracingFormat::Json => fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .boxed(),
            #[cfg(not(feature = "tracing-json"))]
            TracingFormat::Json => {
                anyhow::bail!("JSON logging requires the 'tracing-json' feature")
            },
        };
        Ok(layer)
    }
}
