//! Built-in proxy providers.
//!
//! - `file`: reads a list of outbound definitions from a local JSON/TOML file
//!
//! Remote subscription providers register their own builders.

pub mod file;

use std::sync::Arc;

use crate::adapter::Builders;

/// Register the built-in proxy provider types.
pub fn register_builtin(builders: &mut Builders) {
    builders.register_provider("file", |ctx, spec| {
        let options = spec.config.decode()?;
        Ok(Arc::new(file::FileProvider::new(ctx, spec.tag, options, spec.logger)))
    });
}
