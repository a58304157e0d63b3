//! Experimental features: debug settings and control-plane APIs.
//!
//! # Data Flow
//! ```text
//! experimental.debug     → debug.rs (applied once per process)
//! experimental.clash_api → clash_api.rs (pre-service "clash api")
//! experimental.v2ray_api → v2ray_api.rs (pre-service "v2ray api")
//!                          server.rs (bind on pre-start, serve on start, graceful close)
//! ```

pub mod clash_api;
pub mod debug;
pub mod server;
pub mod v2ray_api;

pub use clash_api::ClashApiServer;
pub use debug::DebugSetting;
pub use v2ray_api::V2RayApiServer;
