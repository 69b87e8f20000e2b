//! Logging configuration.
//!
//! Structured logging built on `tracing`. `LogConfig` selects level, format
//! and destination; `init()` installs a global subscriber and returns a
//! guard that flushes buffered output when dropped. Defaults to JSON on
//! stdout.

use crate::Error;
use std::io;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

pub use tracing::{debug, error, info, trace, warn};

/// Minimum level of emitted records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Record layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Structured JSON, one object per line (default)
    Json,
    /// Plain single-line text
    Plain,
    /// Multi-line output for development
    Pretty,
    /// Terse single-line text
    Compact,
}

/// Where records go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    File(String),
}

/// Logging configuration, plain struct with builder methods
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
    pub targets: bool,
    pub thread_ids: bool,
    pub spans: bool,
    pub colors: bool,
    /// Overrides `level` when set, e.g. "gantry=debug,hyper=info"
    pub env_filter: Option<String>,
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_targets(mut self, enable: bool) -> Self {
        self.targets = enable;
        self
    }

    pub fn with_thread_ids(mut self, enable: bool) -> Self {
        self.thread_ids = enable;
        self
    }

    pub fn with_spans(mut self, enable: bool) -> Self {
        self.spans = enable;
        self
    }

    pub fn with_colors(mut self, enable: bool) -> Self {
        self.colors = enable;
        self
    }

    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Install the global subscriber.
    ///
    /// Keep the returned guard alive for the life of the process; dropping
    /// it flushes the non-blocking writer.
    pub fn init(self) -> Result<WorkerGuard, Error> {
        let env_filter = match &self.env_filter {
            Some(filter) => EnvFilter::try_new(filter)
                .unwrap_or_else(|_| EnvFilter::new(self.level.as_str())),
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.level.as_str())),
        };

        match &self.output {
            LogOutput::Stdout => {
                let (writer, guard) = tracing_appender::non_blocking(io::stdout());
                self.init_with_writer(writer, env_filter);
                Ok(guard)
            }
            LogOutput::Stderr => {
                let (writer, guard) = tracing_appender::non_blocking(io::stderr());
                self.init_with_writer(writer, env_filter);
                Ok(guard)
            }
            LogOutput::File(path) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                let (writer, guard) = tracing_appender::non_blocking(file);
                self.init_with_writer(writer, env_filter);
                Ok(guard)
            }
        }
    }

    fn init_with_writer<W>(&self, writer: W, env_filter: EnvFilter)
    where
        W: for<'a> tracing_subscriber::fmt::MakeWriter<'a> + Send + Sync + 'static,
    {
        let fmt_span = if self.spans {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        match self.format {
            LogFormat::Json => {
                let layer = fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_current_span(self.spans)
                    .with_span_list(self.spans)
                    .with_target(self.targets)
                    .with_thread_ids(self.thread_ids)
                    .with_span_events(fmt_span);
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(layer)
                    .init();
            }
            LogFormat::Plain => {
                let layer = fmt::layer()
                    .with_writer(writer)
                    .with_target(self.targets)
                    .with_thread_ids(self.thread_ids)
                    .with_ansi(self.colors)
                    .with_span_events(fmt_span);
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(layer)
                    .init();
            }
            LogFormat::Pretty => {
                let layer = fmt::layer()
                    .pretty()
                    .with_writer(writer)
                    .with_target(self.targets)
                    .with_thread_ids(self.thread_ids)
                    .with_ansi(self.colors)
                    .with_span_events(fmt_span);
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(layer)
                    .init();
            }
            LogFormat::Compact => {
                let layer = fmt::layer()
                    .compact()
                    .with_writer(writer)
                    .with_target(self.targets)
                    .with_thread_ids(self.thread_ids)
                    .with_ansi(self.colors)
                    .with_span_events(fmt_span);
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(layer)
                    .init();
            }
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Json,
            output: LogOutput::Stdout,
            targets: true,
            thread_ids: false,
            spans: false,
            colors: false,
            env_filter: None,
        }
    }
}
