//! Adapter contracts consumed by the box.
//!
//! # Data Flow
//! ```text
//! Config
//!     → builder.rs (type → factory lookup, build each element)
//!     → registry.rs (ordered inbounds / outbounds / provider groups)
//!     → Router::initialize (snapshot + default-outbound handle)
//!     → service.rs (pre-services / post-services, ordered by registration)
//! ```
//!
//! # Design Decisions
//! - Collaborators are trait objects behind `Arc`; the box never sees concrete types
//! - Start/close are async; each component runs its own concurrency once started
//! - Failures are `BoxError` and get wrapped with positional context by the box

pub mod builder;
pub mod registry;
pub mod service;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::error::BoxError;
use crate::observability::logging::LogEntry;

pub use builder::{BuildContext, Builders};
pub use registry::{AdapterRegistry, DefaultOutbound, ProviderOutbounds};
pub use service::ServiceList;

/// Adapter that accepts incoming connections and hands them to the router.
#[async_trait]
pub trait Inbound: Send + Sync {
    fn tag(&self) -> &str;

    /// Adapter type, e.g. "direct" or "socks".
    fn kind(&self) -> &str;

    async fn start(&self) -> Result<(), BoxError>;

    async fn close(&self) -> Result<(), BoxError>;
}

/// Adapter that establishes outgoing connections.
#[async_trait]
pub trait Outbound: Send + Sync {
    fn tag(&self) -> &str;

    /// Adapter type, e.g. "direct" or "socks".
    fn kind(&self) -> &str;

    /// Whether the outbound has a start step. Only those are started.
    fn has_start(&self) -> bool {
        false
    }

    async fn start(&self) -> Result<(), BoxError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Open a TCP stream to `destination` ("host:port").
    async fn dial(&self, destination: &str) -> io::Result<TcpStream> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("outbound/{}[{}] cannot dial {}", self.kind(), self.tag(), destination),
        ))
    }
}

/// Source of dynamically fetched outbounds.
#[async_trait]
pub trait ProxyProvider: Send + Sync {
    fn tag(&self) -> &str;

    /// Refresh the proxy list.
    async fn update(&self) -> Result<(), BoxError>;

    /// Outbounds built from the current proxy list.
    async fn outbounds(&self) -> Result<Vec<Arc<dyn Outbound>>, BoxError>;
}

/// Auxiliary service started around the inbounds.
#[async_trait]
pub trait Service: Send + Sync {
    /// Lightweight step run during pre-start. Only pre-services get it.
    async fn pre_start(&self) -> Result<(), BoxError> {
        Ok(())
    }

    async fn start(&self) -> Result<(), BoxError>;

    async fn close(&self) -> Result<(), BoxError>;
}

/// Router lifecycle notifications forwarded to control APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouterEvent {
    Started,
    Closing,
    Closed,
}

/// Control-plane API server: a service that also observes the router.
pub trait ControlApi: Service {
    fn on_router_event(&self, event: RouterEvent);

    fn into_service(self: Arc<Self>) -> Arc<dyn Service>;
}

/// Everything the router receives at initialization.
#[derive(Clone, Default)]
pub struct RouterAdapters {
    pub inbounds: Vec<Arc<dyn Inbound>>,
    pub outbounds: Vec<Arc<dyn Outbound>>,
    pub providers: Vec<Arc<dyn ProxyProvider>>,
    pub provider_outbounds: ProviderOutbounds,
}

/// Metadata of a connection accepted by an inbound.
#[derive(Debug, Clone)]
pub struct InboundContext {
    pub inbound: String,
    pub source: SocketAddr,
    pub destination: String,
}

/// Traffic router. Rule evaluation lives behind this trait.
#[async_trait]
pub trait Router: Send + Sync {
    /// Receive the constructed adapters. May call `default_outbound` if no
    /// configured outbound can serve as the fallback.
    fn initialize(
        &self,
        adapters: RouterAdapters,
        default_outbound: &mut DefaultOutbound<'_>,
    ) -> Result<(), BoxError>;

    /// Attach a control API that wants router events.
    fn attach_control_api(&self, _api: Arc<dyn ControlApi>) {}

    async fn start(&self) -> Result<(), BoxError>;

    async fn close(&self) -> Result<(), BoxError>;

    /// Carry an accepted TCP connection to its destination.
    async fn route_connection(
        &self,
        _stream: TcpStream,
        metadata: InboundContext,
    ) -> Result<(), BoxError> {
        Err(format!("router cannot route connections from {}", metadata.inbound).into())
    }

    /// Every outbound known to the router, fallback included.
    fn outbounds(&self) -> Vec<Arc<dyn Outbound>> {
        Vec::new()
    }

    /// The outbound used when no rule matches.
    fn default_outbound(&self) -> Option<Arc<dyn Outbound>> {
        None
    }

    /// Outbounds grouped under a provider tag.
    fn provider_outbounds(&self, _tag: &str) -> Option<Vec<Arc<dyn Outbound>>> {
        None
    }
}

/// Host platform integration (mobile/desktop shells).
#[async_trait]
pub trait PlatformInterface: Send + Sync {
    async fn initialize(
        &self,
        context: &CancellationToken,
        router: Arc<dyn Router>,
    ) -> Result<(), BoxError>;

    /// Receives every log entry while the platform owns log output.
    fn write_log(&self, _entry: &LogEntry) {}
}
