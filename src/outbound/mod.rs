//! Built-in outbound adapters.
//!
//! - `direct`: connects straight to the destination (also the default outbound)
//! - `block`: refuses every connection
//!
//! Protocol outbounds (socks, shadowsocks, ...) register their own builders.

pub mod block;
pub mod direct;

use std::sync::Arc;

use crate::adapter::Builders;

/// Register the built-in outbound types.
pub fn register_builtin(builders: &mut Builders) {
    builders.register_outbound("direct", |_ctx, spec| {
        let options = spec.config.decode()?;
        Ok(Arc::new(direct::DirectOutbound::new(spec.tag, options, spec.logger)))
    });
    builders.register_outbound("block", |_ctx, spec| {
        Ok(Arc::new(block::BlockOutbound::new(spec.tag)))
    });
}
