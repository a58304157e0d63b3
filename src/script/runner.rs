//! Script hook runner.
//!
//! Runs every script bound to one hook point, in configuration order.
//! Start points stop at the first failure; close points record each
//! failure and carry on.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::ScriptMode;
use crate::error::{BoxError, ErrorAggregator};
use crate::observability::Logger;
use crate::script::HookScript;

/// A hook script failed at a start point.
#[derive(Debug, Error)]
#[error("run script[{tag}]: {source}")]
pub struct HookFailure {
    pub tag: String,
    pub mode: ScriptMode,
    #[source]
    pub source: BoxError,
}

fn bound_to(
    scripts: &[Arc<dyn HookScript>],
    mode: ScriptMode,
) -> impl Iterator<Item = &Arc<dyn HookScript>> {
    scripts.iter().filter(move |s| s.mode() == mode)
}

/// Run the scripts of a start point. Kept scripts are started, the others
/// run to completion with `context`.
pub async fn run_start_hooks(
    scripts: &[Arc<dyn HookScript>],
    mode: ScriptMode,
    context: &CancellationToken,
    logger: &Logger,
) -> Result<(), HookFailure> {
    for script in bound_to(scripts, mode) {
        logger.trace(format_args!("run script[{}]", script.tag()));
        let result = if script.keep() {
            script.start().await
        } else {
            script.run_once(context.clone()).await
        };
        result.map_err(|source| HookFailure {
            tag: script.tag().to_string(),
            mode,
            source,
        })?;
    }
    Ok(())
}

/// Run the scripts of a close point. Kept scripts are stopped, the others
/// run to completion with `context`. Every failure is recorded.
pub async fn run_close_hooks(
    scripts: &[Arc<dyn HookScript>],
    mode: ScriptMode,
    context: &CancellationToken,
    logger: &Logger,
    errors: &mut ErrorAggregator,
) {
    for script in bound_to(scripts, mode) {
        if script.keep() {
            logger.trace(format_args!("stop script[{}]", script.tag()));
            errors.record(script.close().await, || {
                format!("stop script[{}]", script.tag())
            });
        } else {
            logger.trace(format_args!("run script[{}]", script.tag()));
            errors.record(script.run_once(context.clone()).await, || {
                format!("run script[{}]", script.tag())
            });
        }
    }
}

/// Stop the kept scripts that were started at a start point.
pub async fn stop_kept_scripts(
    scripts: &[Arc<dyn HookScript>],
    mode: ScriptMode,
    logger: &Logger,
    errors: &mut ErrorAggregator,
) {
    for script in bound_to(scripts, mode).filter(|s| s.keep()) {
        logger.trace(format_args!("stop script[{}]", script.tag()));
        errors.record(script.close().await, || {
            format!("stop script[{}]", script.tag())
        });
    }
}
