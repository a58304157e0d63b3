//! Process-wide debug settings.
//!
//! Applied once, as the first construction step. The first box in a process
//! decides; later boxes see the settings already in effect.

use std::sync::OnceLock;

use crate::config::DebugConfig;

/// A debug option that was applied to the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugSetting {
    /// `RUST_BACKTRACE=1`: panics and double faults carry a backtrace.
    Backtrace,
    /// Panics are logged through tracing before the default hook runs.
    PanicLog,
}

static APPLIED: OnceLock<Vec<DebugSetting>> = OnceLock::new();

/// Apply `config` unless a previous call already did. Returns the settings in effect.
pub fn apply(config: &DebugConfig) -> &'static [DebugSetting] {
    APPLIED.get_or_init(|| {
        let settings = requested(config);
        for setting in &settings {
            match setting {
                DebugSetting::Backtrace => std::env::set_var("RUST_BACKTRACE", "1"),
                DebugSetting::PanicLog => install_panic_log(),
            }
        }
        settings
    })
}

/// Settings `config` asks for, without applying them.
pub fn requested(config: &DebugConfig) -> Vec<DebugSetting> {
    let mut settings = Vec::new();
    if config.trace_back {
        settings.push(DebugSetting::Backtrace);
    }
    if config.panic_log {
        settings.push(DebugSetting::PanicLog);
    }
    settings
}

fn install_panic_log() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_default();
        tracing::error!(
            location = %location,
            "panic: {}",
            crate::error::panic_message(info.payload())
        );
        previous(info);
    }));
}
