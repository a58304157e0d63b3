//! Hook scripts bound to the four lifecycle points.
//!
//! # Data Flow
//! ```text
//! ScriptConfig[] → command.rs (CommandScript, built once at construction)
//!
//! start-pre  → runner.rs::run_start_hooks  (first step of pre-start)
//! start-post → runner.rs::run_start_hooks  (last step of start)
//! close-pre  → runner.rs::run_close_hooks  (first step of teardown)
//! close-post → runner.rs::run_close_hooks  (after the router and pre-services stop)
//! ```
//!
//! # Design Decisions
//! - `keep = true`: long-running child managed like a service (start / close)
//! - `keep = false`: one-shot run that blocks the surrounding phase until it exits
//! - Close-post one-shot runs get a fresh context, the ambient one may be cancelled

pub mod command;
pub mod runner;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::ScriptMode;
use crate::error::BoxError;

pub use command::CommandScript;
pub use runner::{run_close_hooks, run_start_hooks, stop_kept_scripts, HookFailure};

/// User script attached to a lifecycle point.
#[async_trait]
pub trait HookScript: Send + Sync {
    fn tag(&self) -> &str;

    fn mode(&self) -> ScriptMode;

    /// Managed as a long-running service rather than run once.
    fn keep(&self) -> bool;

    async fn start(&self) -> Result<(), BoxError>;

    async fn close(&self) -> Result<(), BoxError>;

    /// Run to completion; abandon the run when `context` is cancelled.
    async fn run_once(&self, context: CancellationToken) -> Result<(), BoxError>;
}
