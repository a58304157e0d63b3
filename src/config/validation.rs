//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Every adapter names a type
//! - Explicit outbound tags are unique
//! - Proxy providers are tagged (their outbounds are grouped by tag)
//! - Scripts name a command
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Config → Result<(), Vec<ValidationError>>
//! - Protocol-specific fields are left to the adapter builders

use std::collections::HashSet;

use thiserror::Error;

use crate::config::schema::Config;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{group}[{index}]: missing type")]
    MissingType { group: &'static str, index: usize },

    #[error("outbounds[{index}]: duplicate tag {tag:?}")]
    DuplicateOutboundTag { index: usize, tag: String },

    #[error("proxy_providers[{index}]: missing tag")]
    MissingProviderTag { index: usize },

    #[error("script[{index}]: missing command")]
    MissingScriptCommand { index: usize },
}

/// Check a configuration for semantic errors.
pub fn validate_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let groups = [
        ("inbounds", &config.inbounds),
        ("outbounds", &config.outbounds),
        ("proxy_providers", &config.proxy_providers),
    ];
    for (group, adapters) in groups {
        for (index, adapter) in adapters.iter().enumerate() {
            if adapter.kind.trim().is_empty() {
                errors.push(ValidationError::MissingType { group, index });
            }
        }
    }

    // Loader-level policy: `ProxyBox::new` assumes unique tags and never checks.
    let mut seen = HashSet::new();
    for (index, outbound) in config.outbounds.iter().enumerate() {
        if !outbound.tag.is_empty() && !seen.insert(outbound.tag.as_str()) {
            errors.push(ValidationError::DuplicateOutboundTag {
                index,
                tag: outbound.tag.clone(),
            });
        }
    }

    for (index, provider) in config.proxy_providers.iter().enumerate() {
        if provider.tag.is_empty() {
            errors.push(ValidationError::MissingProviderTag { index });
        }
    }

    for (index, script) in config.script.iter().enumerate() {
        if script.command.trim().is_empty() {
            errors.push(ValidationError::MissingScriptCommand { index });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
