//! Proxy box: builds a proxy platform from configuration and drives its
//! lifecycle.
//!
//! # Architecture Overview
//!
//! ```text
//!   Config ──▶ instance::ProxyBox::new ──▶ ProxyBox (built, not running)
//!                  │                          │
//!                  │ adapter::Builders        │ pre_start / start / close
//!                  ▼                          ▼
//!   ┌──────────────────────────────────────────────────────────────┐
//!   │ log factory  router  inbounds  outbounds  proxy providers    │
//!   │ control APIs (pre-services)  extra services (post-services)  │
//!   │ hook scripts                                                 │
//!   └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The box only talks to components through the traits in [`adapter`];
//! [`route`], [`inbound`], [`outbound`], [`provider`], [`experimental`] and
//! [`script`] hold the built-in implementations.

// Core
pub mod adapter;
pub mod config;
pub mod error;
pub mod instance;
pub mod lifecycle;

// Built-in collaborators
pub mod experimental;
pub mod inbound;
pub mod outbound;
pub mod provider;
pub mod route;
pub mod script;

// Cross-cutting concerns
pub mod observability;

pub use config::Config;
pub use error::{BuildError, CloseError, PhaseError};
pub use instance::{Options, ProxyBox};
