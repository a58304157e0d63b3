//! Configuration schema definitions.
//!
//! This module defines the top-level configuration groups for a proxy box.
//! Group internals owned by external collaborators (DNS, NTP, protocol
//! fields of adapters) are kept as free-form JSON maps and decoded by the
//! collaborator that owns them.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Root configuration for a proxy box.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Config {
    /// Logging settings.
    pub log: LogConfig,

    /// DNS options, passed through to the router.
    pub dns: DnsConfig,

    /// NTP options, passed through to the router.
    pub ntp: NtpConfig,

    /// Route options.
    pub route: RouteConfig,

    /// Inbound adapters, in start order.
    pub inbounds: Vec<AdapterConfig>,

    /// Outbound adapters, in start order.
    pub outbounds: Vec<AdapterConfig>,

    /// Dynamic proxy-list providers.
    pub proxy_providers: Vec<AdapterConfig>,

    /// Debug settings and control-plane APIs.
    pub experimental: ExperimentalConfig,

    /// Hook scripts.
    pub script: Vec<ScriptConfig>,
}

/// Output format of the log factory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Drop all log output.
    pub disabled: bool,

    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Write logs to this file instead of stdout.
    pub output: Option<String>,

    /// Prefix lines with a timestamp.
    pub timestamp: bool,

    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            level: "info".to_string(),
            output: None,
            timestamp: true,
            format: LogFormat::Compact,
        }
    }
}

/// DNS configuration. Owned by the router's DNS subsystem.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DnsConfig {
    pub servers: Vec<Value>,

    #[serde(flatten)]
    pub options: Map<String, Value>,
}

/// NTP configuration. Owned by the router's time subsystem.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct NtpConfig {
    pub enabled: bool,

    pub server: Option<String>,

    #[serde(flatten)]
    pub options: Map<String, Value>,
}

/// Route configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RouteConfig {
    /// Tag of the outbound used when no rule matches.
    #[serde(rename = "final")]
    pub final_outbound: Option<String>,

    /// Rule definitions; evaluated by the routing engine only.
    pub rules: Vec<Value>,

    #[serde(flatten)]
    pub options: Map<String, Value>,
}

/// Inbound, outbound or proxy provider definition.
///
/// Only `type` and `tag` are interpreted by the box; every other field is
/// handed to the builder registered for `type`.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AdapterConfig {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub tag: String,

    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl AdapterConfig {
    /// Create a definition with no extra options.
    pub fn new(kind: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            tag: tag.into(),
            options: Map::new(),
        }
    }

    /// Add an option field.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// The configured tag, or the positional index when no tag is set.
    pub fn resolved_tag(&self, index: usize) -> String {
        if self.tag.is_empty() {
            index.to_string()
        } else {
            self.tag.clone()
        }
    }

    /// Decode the adapter-specific fields into a typed option struct.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.options.clone()))
    }
}

/// Experimental features: debug settings and control-plane APIs.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ExperimentalConfig {
    pub debug: DebugConfig,
    pub clash_api: Option<ClashApiConfig>,
    pub v2ray_api: Option<V2RayApiConfig>,
}

impl ExperimentalConfig {
    /// The Clash API is needed iff its controller address is non-empty.
    pub fn needs_clash_api(&self) -> bool {
        self.clash_api
            .as_ref()
            .is_some_and(|c| !c.external_controller.is_empty())
    }

    /// The V2Ray API is needed iff its listen address is non-empty.
    pub fn needs_v2ray_api(&self) -> bool {
        self.v2ray_api.as_ref().is_some_and(|c| !c.listen.is_empty())
    }
}

/// Process-wide debug settings, applied once during construction.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DebugConfig {
    /// Capture backtraces on panic (sets `RUST_BACKTRACE`).
    pub trace_back: bool,

    /// Route panic messages through the log before the default hook runs.
    pub panic_log: bool,
}

/// Clash-compatible control API.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClashApiConfig {
    /// Listen address (e.g., "127.0.0.1:9090"). Empty disables the API.
    pub external_controller: String,

    /// Bearer token required on every request.
    pub secret: Option<String>,

    /// Number of log entries kept for `GET /logs`.
    pub log_buffer: usize,
}

impl Default for ClashApiConfig {
    fn default() -> Self {
        Self {
            external_controller: String::new(),
            secret: None,
            log_buffer: 256,
        }
    }
}

/// V2Ray-style stats API.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct V2RayApiConfig {
    /// Listen address. Empty disables the API.
    pub listen: String,
}

/// Lifecycle point a hook script is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScriptMode {
    StartPre,
    StartPost,
    ClosePre,
    ClosePost,
}

impl ScriptMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptMode::StartPre => "start-pre",
            ScriptMode::StartPost => "start-post",
            ScriptMode::ClosePre => "close-pre",
            ScriptMode::ClosePost => "close-post",
        }
    }
}

impl fmt::Display for ScriptMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hook script definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScriptConfig {
    #[serde(default)]
    pub tag: String,

    pub mode: ScriptMode,

    /// Run as a long-lived managed service instead of a one-shot action.
    #[serde(default)]
    pub keep: bool,

    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub work_dir: Option<String>,
}

impl ScriptConfig {
    /// The configured tag, or the positional index when no tag is set.
    pub fn resolved_tag(&self, index: usize) -> String {
        if self.tag.is_empty() {
            index.to_string()
        } else {
            self.tag.clone()
        }
    }
}
