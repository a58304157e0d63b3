//! Lifecycle metrics.
//!
//! # Metrics
//! - `box_phase_duration_seconds` (histogram): time spent in pre-start / start / close
//! - `box_component_failures_total` (counter): failures by phase and component role
//! - `box_close_total` (counter): teardowns executed
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; a no-op until a recorder is installed
//! - The V2Ray API installs a Prometheus recorder and renders these at `/stats`

use std::time::Duration;

use metrics::{counter, histogram};

/// Record how long a lifecycle phase took.
pub fn record_phase(phase: &'static str, elapsed: Duration) {
    histogram!("box_phase_duration_seconds", "phase" => phase).record(elapsed.as_secs_f64());
}

/// Record a failed component step.
pub fn record_component_failure(phase: &'static str, component: &'static str) {
    counter!("box_component_failures_total", "phase" => phase, "component" => component)
        .increment(1);
}

/// Record one executed teardown and how many of its steps failed.
pub fn record_close(failures: usize) {
    counter!("box_close_total").increment(1);
    if failures > 0 {
        counter!("box_component_failures_total", "phase" => "close", "component" => "any")
            .increment(failures as u64);
    }
}
