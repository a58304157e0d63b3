//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All components produce:
//!     → logging.rs (scoped loggers over tracing, optional live feed)
//!     → metrics.rs (phase durations, failure counters)
//!
//! Consumers:
//!     → stdout / log file (tracing-subscriber fmt layer)
//!     → Clash API `/logs` (observable feed)
//!     → V2Ray API `/stats` (Prometheus text)
//! ```
//!
//! # Design Decisions
//! - Every component gets a logger scoped to `<role>/<type>[<tag>]`
//! - The log factory is closed last so teardown output is captured
//! - Metrics are cheap (atomic increments behind the `metrics` facade)

pub mod logging;
pub mod metrics;

pub use logging::{LogEntry, LogFactory, LogLevel, Logger, TracingLogFactory};
