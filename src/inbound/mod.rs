//! Built-in inbound adapters.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → direct.rs (attach inbound metadata)
//!     → Router::route_connection
//! ```
//!
//! # Design Decisions
//! - Bounded accept prevents resource exhaustion
//! - Start binds, close stops accepting and waits for the accept loop
//! - Protocol inbounds (socks, http, tun, ...) register their own builders

pub mod direct;
pub mod listener;

use std::sync::Arc;

use crate::adapter::Builders;

/// Register the built-in inbound types.
pub fn register_builtin(builders: &mut Builders) {
    builders.register_inbound("direct", |ctx, spec| {
        let options = spec.config.decode()?;
        Ok(Arc::new(direct::DirectInbound::new(ctx, spec.tag, options, spec.logger)))
    });
}
