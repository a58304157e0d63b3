//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber from the `log` config group
//! - Hand out loggers scoped to a component label
//! - Publish entries to subscribers when observable (Clash API `/logs`)
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, compact format for development
//! - Log level configurable via config and environment (`RUST_LOG` wins)
//! - A second factory in the same process keeps the first subscriber

use std::fmt;
use std::fs::OpenOptions;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::Span;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::adapter::builder::LogFactoryOptions;
use crate::adapter::PlatformInterface;
use crate::config::LogFormat;
use crate::error::BoxError;

const OBSERVER_CAPACITY: usize = 1024;

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// One published log line.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub scope: String,
    pub message: String,
}

/// Source of scoped loggers. Closed last during teardown.
#[async_trait]
pub trait LogFactory: Send + Sync {
    /// Logger for a component, e.g. `outbound/direct[0]`.
    fn new_logger(&self, scope: &str) -> Logger;

    /// Root logger of the box.
    fn logger(&self) -> Logger {
        self.new_logger("")
    }

    /// Live feed of entries, when the factory is observable.
    fn subscribe(&self) -> Option<broadcast::Receiver<LogEntry>> {
        None
    }

    async fn close(&self) -> Result<(), BoxError>;
}

/// Where a logger's entries are published besides tracing.
struct Sink {
    observers: Option<broadcast::Sender<LogEntry>>,
    platform: Option<Arc<dyn PlatformInterface>>,
    closed: AtomicBool,
}

impl Sink {
    fn publish(&self, level: LogLevel, scope: &str, message: String) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let entry = LogEntry {
            level,
            scope: scope.to_string(),
            message,
        };
        if let Some(platform) = &self.platform {
            platform.write_log(&entry);
        }
        if let Some(tx) = &self.observers {
            // No receivers is fine.
            let _ = tx.send(entry);
        }
    }
}

/// Scoped logger emitting tracing events.
#[derive(Clone)]
pub struct Logger {
    scope: Arc<str>,
    span: Span,
    sink: Option<Arc<Sink>>,
}

impl Logger {
    /// Logger that only emits tracing events.
    pub fn new(scope: &str) -> Self {
        Self {
            scope: Arc::from(scope),
            span: tracing::info_span!("component", scope = %scope),
            sink: None,
        }
    }

    fn with_sink(scope: &str, sink: Arc<Sink>) -> Self {
        Self {
            sink: Some(sink),
            ..Self::new(scope)
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Span wrapping this component's events.
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn trace(&self, message: impl fmt::Display) {
        self.log(LogLevel::Trace, message);
    }

    pub fn debug(&self, message: impl fmt::Display) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: impl fmt::Display) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl fmt::Display) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl fmt::Display) {
        self.log(LogLevel::Error, message);
    }

    pub fn log(&self, level: LogLevel, message: impl fmt::Display) {
        let scope = &*self.scope;
        match level {
            LogLevel::Trace => tracing::trace!(parent: &self.span, scope, "{}", message),
            LogLevel::Debug => tracing::debug!(parent: &self.span, scope, "{}", message),
            LogLevel::Info => tracing::info!(parent: &self.span, scope, "{}", message),
            LogLevel::Warn => tracing::warn!(parent: &self.span, scope, "{}", message),
            LogLevel::Error => tracing::error!(parent: &self.span, scope, "{}", message),
        }
        if let Some(sink) = &self.sink {
            sink.publish(level, scope, message.to_string());
        }
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").field("scope", &self.scope).finish()
    }
}

/// Log factory backed by a `tracing_subscriber` registry.
pub struct TracingLogFactory {
    sink: Arc<Sink>,
    installed: bool,
}

impl TracingLogFactory {
    pub fn new(options: LogFactoryOptions) -> Result<Self, BoxError> {
        let config = &options.config;
        let installed = if config.disabled {
            false
        } else {
            let filter = EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.level))?;

            let (writer, ansi) = match &config.output {
                Some(path) => {
                    let file = OpenOptions::new().create(true).append(true).open(path)?;
                    (BoxMakeWriter::new(Mutex::new(file)), false)
                }
                // The platform receives entries through its own hook.
                None if options.platform.is_some() => (BoxMakeWriter::new(std::io::sink), false),
                None => (BoxMakeWriter::new(std::io::stdout), true),
            };

            let base = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(ansi)
                .with_target(false);
            let layer: Box<dyn Layer<Registry> + Send + Sync> = match (config.format, config.timestamp) {
                (LogFormat::Json, true) => base.json().boxed(),
                (LogFormat::Json, false) => base.json().without_time().boxed(),
                (LogFormat::Compact, true) => base.compact().boxed(),
                (LogFormat::Compact, false) => base.compact().without_time().boxed(),
            };

            tracing_subscriber::registry()
                .with(layer)
                .with(filter)
                .try_init()
                .is_ok()
        };

        let observers = options
            .observable
            .then(|| broadcast::channel(OBSERVER_CAPACITY).0);

        Ok(Self {
            sink: Arc::new(Sink {
                observers,
                platform: options.platform,
                closed: AtomicBool::new(false),
            }),
            installed,
        })
    }

    /// Whether this factory installed the global subscriber.
    pub fn installed(&self) -> bool {
        self.installed
    }
}

#[async_trait]
impl LogFactory for TracingLogFactory {
    fn new_logger(&self, scope: &str) -> Logger {
        Logger::with_sink(scope, self.sink.clone())
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<LogEntry>> {
        self.sink.observers.as_ref().map(|tx| tx.subscribe())
    }

    async fn close(&self) -> Result<(), BoxError> {
        self.sink.closed.store(true, Ordering::Release);
        Ok(())
    }
}
