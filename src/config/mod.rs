//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML/JSON)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → Config (validated, immutable)
//!     → handed to ProxyBox::new, which passes each group to its builder
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a new box
//! - All groups have defaults to allow minimal configs
//! - Adapter-specific fields stay opaque until the adapter's builder decodes them

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdapterConfig, ClashApiConfig, Config, DebugConfig, ExperimentalConfig, LogConfig,
    LogFormat, ScriptConfig, ScriptMode, V2RayApiConfig,
};
pub use validation::{validate_config, ValidationError};
