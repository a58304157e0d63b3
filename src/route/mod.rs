//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Construction:
//!     Router::initialize(adapters, default-outbound handle)
//!     → resolve the fallback outbound (route.final, first usable, or built default)
//!     → freeze as immutable RouteTable (swapped in atomically)
//!
//! Runtime:
//!     Inbound connection → route_connection → fallback outbound → copy both ways
//! ```
//!
//! # Design Decisions
//! - Rule evaluation is not done here; every connection takes the fallback outbound
//! - The table is immutable after initialization (lock-free reads via arc-swap)
//! - Control APIs attached to the router see Started / Closing / Closed

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::adapter::builder::RouterOptions;
use crate::adapter::{
    ControlApi, DefaultOutbound, InboundContext, Outbound, ProviderOutbounds, Router,
    RouterAdapters, RouterEvent,
};
use crate::error::BoxError;
use crate::observability::Logger;

/// Routing state frozen at initialization.
#[derive(Default)]
pub struct RouteTable {
    outbounds: Vec<Arc<dyn Outbound>>,
    by_tag: HashMap<String, usize>,
    default: Option<Arc<dyn Outbound>>,
    providers: ProviderOutbounds,
    inbound_tags: Vec<String>,
}

impl RouteTable {
    pub fn outbound(&self, tag: &str) -> Option<&Arc<dyn Outbound>> {
        self.by_tag.get(tag).map(|&i| &self.outbounds[i])
    }

    pub fn inbound_tags(&self) -> &[String] {
        &self.inbound_tags
    }
}

/// Router that sends every connection to the fallback outbound.
pub struct BasicRouter {
    logger: Logger,
    final_outbound: Option<String>,
    table: ArcSwap<RouteTable>,
    apis: ArcSwap<Vec<Arc<dyn ControlApi>>>,
    started: AtomicBool,
}

impl BasicRouter {
    pub fn new(options: RouterOptions<'_>) -> Result<Self, BoxError> {
        let final_outbound = options.route.final_outbound.clone();
        if final_outbound.as_deref() == Some("") {
            return Err("route.final: empty outbound tag".into());
        }
        let logger = options.log_factory.new_logger("router");
        logger.debug(format_args!(
            "{} rules, {} dns servers, ntp {}",
            options.route.rules.len(),
            options.dns.servers.len(),
            if options.ntp.enabled { "enabled" } else { "disabled" },
        ));
        Ok(Self {
            logger,
            final_outbound,
            table: ArcSwap::from_pointee(RouteTable::default()),
            apis: ArcSwap::from_pointee(Vec::new()),
            started: AtomicBool::new(false),
        })
    }

    /// Current routing table.
    pub fn table(&self) -> Arc<RouteTable> {
        self.table.load_full()
    }

    fn emit(&self, event: RouterEvent) {
        for api in self.apis.load().iter() {
            api.on_router_event(event);
        }
    }
}

#[async_trait]
impl Router for BasicRouter {
    fn initialize(
        &self,
        adapters: RouterAdapters,
        default_outbound: &mut DefaultOutbound<'_>,
    ) -> Result<(), BoxError> {
        let mut outbounds = adapters.outbounds;
        let default = match &self.final_outbound {
            Some(tag) => outbounds
                .iter()
                .find(|o| o.tag() == tag)
                .cloned()
                .ok_or_else(|| format!("default outbound not found: {}", tag))?,
            None => match outbounds.iter().find(|o| o.kind() != "block") {
                Some(out) => out.clone(),
                None => {
                    let out = default_outbound.get_or_create()?;
                    outbounds.push(out.clone());
                    out
                }
            },
        };
        self.logger.debug(format_args!(
            "default outbound: outbound/{}[{}]",
            default.kind(),
            default.tag()
        ));

        let mut by_tag = HashMap::new();
        for (i, out) in outbounds.iter().enumerate() {
            by_tag.entry(out.tag().to_string()).or_insert(i);
        }
        self.table.store(Arc::new(RouteTable {
            outbounds,
            by_tag,
            default: Some(default),
            providers: adapters.provider_outbounds,
            inbound_tags: adapters.inbounds.iter().map(|i| i.tag().to_string()).collect(),
        }));
        Ok(())
    }

    fn attach_control_api(&self, api: Arc<dyn ControlApi>) {
        self.apis.rcu(|apis| {
            let mut apis = Vec::clone(apis);
            apis.push(api.clone());
            apis
        });
    }

    async fn start(&self) -> Result<(), BoxError> {
        if self.table.load().default.is_none() {
            return Err("router not initialized".into());
        }
        if self.started.swap(true, Ordering::AcqRel) {
            return Err("router already started".into());
        }
        self.emit(RouterEvent::Started);
        self.logger.info("router started");
        Ok(())
    }

    async fn close(&self) -> Result<(), BoxError> {
        self.emit(RouterEvent::Closing);
        // Releases providers and outbounds; they may hold the router.
        self.table.store(Arc::new(RouteTable::default()));
        self.started.store(false, Ordering::Release);
        self.emit(RouterEvent::Closed);
        self.apis.store(Arc::new(Vec::new()));
        Ok(())
    }

    async fn route_connection(
        &self,
        mut stream: TcpStream,
        metadata: InboundContext,
    ) -> Result<(), BoxError> {
        let outbound = self
            .table
            .load()
            .default
            .clone()
            .ok_or("router not initialized")?;
        self.logger.trace(format_args!(
            "[{}] {} => {} via {}",
            metadata.inbound,
            metadata.source,
            metadata.destination,
            outbound.tag()
        ));
        let mut remote = outbound.dial(&metadata.destination).await?;
        tokio::io::copy_bidirectional(&mut stream, &mut remote).await?;
        Ok(())
    }

    fn outbounds(&self) -> Vec<Arc<dyn Outbound>> {
        self.table.load().outbounds.clone()
    }

    fn default_outbound(&self) -> Option<Arc<dyn Outbound>> {
        self.table.load().default.clone()
    }

    fn provider_outbounds(&self, tag: &str) -> Option<Vec<Arc<dyn Outbound>>> {
        self.table.load().providers.get(tag).map(|g| g.to_vec())
    }
}
