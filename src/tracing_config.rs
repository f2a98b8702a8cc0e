//! Subscriber setup for the command line front end
//!
//! The library only emits events; binaries decide where they go.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Output format of the console or file layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Colored compact output (default)
    Console,
    /// Plain compact output for CI logs
    Compact,
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Where events are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TracingOutput {
    Console,
    /// Append to a single file
    #[cfg(feature = "tracing-files")]
    File(std::path::PathBuf),
    /// Console plus a daily rolling file
    #[cfg(feature = "tracing-files")]
    Both(std::path::PathBuf),
}

/// Keeps non-blocking file writers flushing until dropped
#[derive(Debug, Default)]
#[must_use = "dropping the guard stops file logging"]
pub struct TracingGuard {
    #[cfg(feature = "tracing-files")]
    _file: Option<tracing_appender::non_blocking::WorkerGuard>,
}

#[derive(Debug)]
pub struct TracingConfig {
    /// `-v` count
    pub verbosity: u8,
    pub format: TracingFormat,
    pub output: TracingOutput,
    /// Explicit filter directive, takes precedence over `verbosity`
    pub env_filter: Option<String>,
    /// Correlates all events of one CLI run
    pub session_id: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            format: TracingFormat::Console,
            output: TracingOutput::Console,
            env_filter: None,
            session_id: None,
        }
    }
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

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

    #[must_use]
    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Filter directive for the verbosity level
    ///
    /// Dependencies stay at `warn` so `-vv` is not drowned in HTTP internals.
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "warn,bg_composer=info",
            1 => "warn,bg_composer=debug",
            _ => "info,bg_composer=trace",
        }
    }

    fn filter(&self) -> anyhow::Result<EnvFilter> {
        let directive = self
            .env_filter
            .as_deref()
            .unwrap_or_else(|| self.verbosity_to_filter());
        Ok(EnvFilter::try_new(directive)?)
    }

    /// Install the global subscriber
    ///
    /// # Errors
    /// - invalid filter directives
    /// - a global subscriber is already installed
    pub fn init(self) -> anyhow::Result<TracingGuard> {
        let registry = Registry::default().with(self.filter()?);
        #[cfg_attr(not(feature = "tracing-files"), allow(unused_mut))]
        let mut guard = TracingGuard::default();

        match (&self.format, &self.output) {
            (TracingFormat::Console, TracingOutput::Console) => {
                registry
                    .with(fmt::layer().with_ansi(true).with_target(false).compact())
                    .try_init()?;
            },
            (TracingFormat::Compact, TracingOutput::Console) => {
                registry
                    .with(fmt::layer().with_ansi(false).with_target(false).compact())
                    .try_init()?;
            },
            #[cfg(feature = "tracing-json")]
            (TracingFormat::Json, TracingOutput::Console) => {
                registry
                    .with(fmt::layer().json().with_current_span(true))
                    .try_init()?;
            },
            #[cfg(feature = "tracing-files")]
            (format, TracingOutput::File(path)) => {
                let (writer, file_guard) = file_writer(path, false);
                guard._file = Some(file_guard);
                match format {
                    #[cfg(feature = "tracing-json")]
                    TracingFormat::Json => registry
                        .with(fmt::layer().json().with_writer(writer))
                        .try_init()?,
                    _ => registry
                        .with(fmt::layer().with_ansi(false).with_writer(writer).compact())
                        .try_init()?,
                }
            },
            #[cfg(feature = "tracing-files")]
            (format, TracingOutput::Both(path)) => {
                let (writer, file_guard) = file_writer(path, true);
                guard._file = Some(file_guard);
                let file_layer = fmt::layer().with_ansi(false).with_writer(writer).compact();
                let ansi = matches!(format, TracingFormat::Console);
                registry
                    .with(fmt::layer().with_ansi(ansi).with_target(false).compact())
                    .with(file_layer)
                    .try_init()?;
            },
        }

        if let Some(session_id) = &self.session_id {
            tracing::info!(session_id = %session_id, "bg-composer session started");
        }

        Ok(guard)
    }
}

#[cfg(feature = "tracing-files")]
fn file_writer(
    path: &std::path::Path,
    rolling: bool,
) -> (
    tracing_appender::non_blocking::NonBlocking,
    tracing_appender::non_blocking::WorkerGuard,
) {
    use tracing_appender::{non_blocking, rolling as roll};

    let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
    let name = path
        .file_name()
        .unwrap_or_else(|| std::ffi::OsStr::new("bg-composer.log"));
    if rolling {
        non_blocking(roll::daily(dir, name))
    } else {
        non_blocking(roll::never(dir, name))
    }
}

/// Console tracing tagged with `session_id`
///
/// # Errors
/// - see [`TracingConfig::init`]
pub fn init_cli_tracing(verbosity: u8, session_id: &str) -> anyhow::Result<TracingGuard> {
    TracingConfig::new()
        .with_verbosity(verbosity)
        .with_session_id(session_id)
        .init()
}

/// Spans shared by the CLI stages
pub mod spans {
    use tracing::{Level, Span};

    pub fn session(session_id: &str, input: &std::path::Path) -> Span {
        tracing::span!(
            Level::INFO,
            "session",
            session_id = %session_id,
            input = %input.display()
        )
    }

    pub fn compose(background: &str, dimensions: (u32, u32)) -> Span {
        tracing::span!(
            Level::DEBUG,
            "compose",
            background = %background,
            width = dimensions.0,
            height = dimensions.1
        )
    }
}
