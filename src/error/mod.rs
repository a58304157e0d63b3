//! Error taxonomy of the box.
//!
//! # Kinds
//! - `BuildError`: construction failed; names the failing element
//! - `PhaseError`: pre-start or start failed; names the failing component
//! - `CloseError`: teardown failures (aggregated) or the already-closed sentinel
//! - `DoubleFault`: teardown panicked while recovering from a `PhaseError`
//!
//! Collaborators report failures as `BoxError`; the box wraps them with
//! positional context and never drops the cause.

pub mod aggregate;

use std::fmt;

use thiserror::Error;

use crate::config::ScriptMode;

pub use aggregate::{AggregateError, ErrorAggregator};

/// Failure type returned by collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Element of the construction pipeline that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStage {
    LogFactory,
    Route,
    Inbound(usize),
    Outbound(usize),
    ParseProvider(usize),
    UpdateProvider(usize),
    ProviderOutbounds(usize),
    InitializeRouter,
    Platform,
    ClashApi,
    V2RayApi,
    RegisterService(String),
    Script(usize),
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStage::LogFactory => write!(f, "create log factory"),
            BuildStage::Route => write!(f, "parse route options"),
            BuildStage::Inbound(i) => write!(f, "parse inbound[{}]", i),
            BuildStage::Outbound(i) => write!(f, "parse outbound[{}]", i),
            BuildStage::ParseProvider(i) => write!(f, "parse proxy provider[{}]", i),
            BuildStage::UpdateProvider(i) => write!(f, "update proxy provider[{}]", i),
            BuildStage::ProviderOutbounds(i) => {
                write!(f, "get outbounds from proxy provider[{}]", i)
            }
            BuildStage::InitializeRouter => write!(f, "initialize router"),
            BuildStage::Platform => write!(f, "initialize platform interface"),
            BuildStage::ClashApi => write!(f, "create clash api server"),
            BuildStage::V2RayApi => write!(f, "create v2ray api server"),
            BuildStage::RegisterService(name) => write!(f, "register {}", name),
            BuildStage::Script(i) => write!(f, "parse script[{}]", i),
        }
    }
}

/// Construction failed. No partially built box is returned.
#[derive(Debug, Error)]
#[error("{stage}: {source}")]
pub struct BuildError {
    pub stage: BuildStage,
    #[source]
    pub source: BoxError,
}

impl BuildError {
    pub fn new(stage: BuildStage, source: impl Into<BoxError>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }
}

/// Startup phase in which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    PreStart,
    Start,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::PreStart => "pre-start",
            Phase::Start => "start",
        }
    }
}

/// Component whose start step failed, with its role, type and resolved tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Component {
    Script { tag: String, mode: ScriptMode },
    PreStartService(String),
    Service(String),
    Outbound { kind: String, tag: String },
    Router,
    Inbound { kind: String, tag: String },
    /// The box itself, refusing to start after teardown.
    Instance,
}

impl Component {
    /// Role label used in metrics.
    pub fn role(&self) -> &'static str {
        match self {
            Component::Script { .. } => "script",
            Component::PreStartService(_) | Component::Service(_) => "service",
            Component::Outbound { .. } => "outbound",
            Component::Router => "router",
            Component::Inbound { .. } => "inbound",
            Component::Instance => "box",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Script { tag, .. } => write!(f, "run script[{}]", tag),
            Component::PreStartService(name) => write!(f, "pre-start {}", name),
            Component::Service(name) => write!(f, "start {}", name),
            Component::Outbound { kind, tag } => {
                write!(f, "initialize outbound/{}[{}]", kind, tag)
            }
            Component::Router => write!(f, "start router"),
            Component::Inbound { kind, tag } => write!(f, "initialize inbound/{}[{}]", kind, tag),
            Component::Instance => write!(f, "box"),
        }
    }
}

/// Pre-start or start failed. Teardown has already run when the caller sees this.
#[derive(Debug, Error)]
#[error("{component}: {source}")]
pub struct PhaseError {
    pub phase: Phase,
    pub component: Component,
    #[source]
    pub source: BoxError,
}

impl PhaseError {
    pub fn new(phase: Phase, component: Component, source: BoxError) -> Self {
        Self {
            phase,
            component,
            source,
        }
    }
}

/// Result of `ProxyBox::close`.
#[derive(Debug, Error)]
pub enum CloseError {
    /// Teardown already ran; nothing was done.
    #[error("box already closed")]
    AlreadyClosed,

    #[error(transparent)]
    Teardown(#[from] AggregateError),
}

/// Panic payload raised when teardown panics while recovering from a phase error.
#[derive(Debug, Error)]
#[error("panic on early close: {fault} (origin error: {origin})")]
pub struct DoubleFault {
    pub origin: String,
    pub fault: String,
}

/// Render a panic payload as text.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_error_names_element() {
        let err = BuildError::new(BuildStage::UpdateProvider(0), "timed out");
        assert_eq!(err.to_string(), "update proxy provider[0]: timed out");
        let err = BuildError::new(BuildStage::Inbound(2), "bad listen address");
        assert_eq!(err.to_string(), "parse inbound[2]: bad listen address");
    }

    #[test]
    fn test_phase_error_names_component() {
        let err = PhaseError::new(
            Phase::PreStart,
            Component::Outbound {
                kind: "socks".into(),
                tag: "2".into(),
            },
            "connection refused".into(),
        );
        assert_eq!(
            err.to_string(),
            "initialize outbound/socks[2]: connection refused"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
