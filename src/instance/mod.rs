//! The proxy box: a constructed, not yet running object graph.
//!
//! # Data Flow
//! ```text
//! Options (config, context, platform, builders)
//!     → construct.rs (ProxyBox::new, eleven ordered steps)
//!     → lifecycle/startup.rs (pre_start, start)
//!     → lifecycle/teardown.rs (close, exactly once)
//! ```
//!
//! # Design Decisions
//! - The box owns the registry; after construction it only lends `&`
//! - Every lifecycle method takes `&self` so `close` can run from another task
//!   (share the box through `Arc`)

mod construct;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::adapter::{AdapterRegistry, Builders, PlatformInterface, Router, Service, ServiceList};
use crate::config::Config;
use crate::lifecycle::ShutdownLatch;
use crate::observability::{LogFactory, Logger};
use crate::script::HookScript;

/// Construction input.
pub struct Options {
    pub config: Config,
    /// Ambient execution context. A fresh token is used when absent.
    pub context: Option<CancellationToken>,
    pub platform: Option<Arc<dyn PlatformInterface>>,
    pub builders: Builders,
    /// Services started after the inbounds, in this order.
    pub services: Vec<(String, Arc<dyn Service>)>,
}

impl Options {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            context: None,
            platform: None,
            builders: Builders::default(),
            services: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: CancellationToken) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_platform(mut self, platform: Arc<dyn PlatformInterface>) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn with_builders(mut self, builders: Builders) -> Self {
        self.builders = builders;
        self
    }

    pub fn with_service(mut self, name: impl Into<String>, service: Arc<dyn Service>) -> Self {
        self.services.push((name.into(), service));
        self
    }
}

/// A proxy platform assembled from configuration.
pub struct ProxyBox {
    pub(crate) id: Uuid,
    pub(crate) created_at: Instant,
    pub(crate) context: CancellationToken,
    pub(crate) router: Arc<dyn Router>,
    pub(crate) registry: AdapterRegistry,
    pub(crate) pre_services: ServiceList,
    pub(crate) post_services: ServiceList,
    pub(crate) scripts: Vec<Arc<dyn HookScript>>,
    pub(crate) log_factory: Arc<dyn LogFactory>,
    pub(crate) logger: Logger,
    pub(crate) pre_started: AtomicBool,
    pub(crate) latch: ShutdownLatch,
}

impl ProxyBox {
    /// Instance id, logged at construction.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn context(&self) -> &CancellationToken {
        &self.context
    }

    pub fn router(&self) -> &Arc<dyn Router> {
        &self.router
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    pub fn pre_services(&self) -> &ServiceList {
        &self.pre_services
    }

    pub fn post_services(&self) -> &ServiceList {
        &self.post_services
    }

    pub fn scripts(&self) -> &[Arc<dyn HookScript>] {
        &self.scripts
    }

    pub fn is_closed(&self) -> bool {
        self.latch.is_closed()
    }

    /// Resolves once a teardown has run to completion.
    pub async fn closed(&self) {
        self.latch.closed().await
    }
}
