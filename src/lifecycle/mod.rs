//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     pre_start: start-pre scripts → pre-service pre-start → outbounds → router
//!     start:     pre_start → pre-services → inbounds → post-services → start-post scripts
//!
//! Failure (startup.rs):
//!     phase error → close (teardown errors logged) → phase error returned
//!     teardown panics → DoubleFault panic
//!
//! Shutdown (teardown.rs, shutdown.rs):
//!     latch → close-pre scripts → post-services → inbounds → outbounds
//!           → router → pre-services → close-post scripts → log factory
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → caller closes the box
//! ```
//!
//! # Design Decisions
//! - Strictly sequential: each component's start/close is awaited before the next
//! - No timeouts; a component that never returns blocks its phase
//! - Teardown is not the mirror of startup: pre-services stop after the router
//!   so control APIs observe the router closing

pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod teardown;

pub use shutdown::{CloseGuard, ShutdownLatch};
pub use signals::{shutdown_signal, ShutdownSignal};
