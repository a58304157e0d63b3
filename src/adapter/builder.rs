//! Factory table used by the construction pipeline.
//!
//! # Responsibilities
//! - Map adapter `type` strings to builders
//! - Provide the log factory, router, control API and script builders
//! - Carry the shared handles every builder needs (`BuildContext`)
//!
//! # Design Decisions
//! - `Builders::default()` registers every built-in type; callers replace or add entries
//! - Unknown types are a construction error, reported with the element's index

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::adapter::{ControlApi, Inbound, Outbound, PlatformInterface, ProxyProvider, Router};
use crate::config::schema::{DnsConfig, NtpConfig, RouteConfig};
use crate::config::{AdapterConfig, ClashApiConfig, LogConfig, ScriptConfig, V2RayApiConfig};
use crate::error::BoxError;
use crate::observability::logging::{LogFactory, Logger, TracingLogFactory};
use crate::script::HookScript;

/// Input of the log factory builder.
#[derive(Clone)]
pub struct LogFactoryOptions {
    pub config: LogConfig,
    /// Publish log entries to subscribers (needed by the Clash API).
    pub observable: bool,
    pub platform: Option<Arc<dyn PlatformInterface>>,
}

/// Input of the router builder.
pub struct RouterOptions<'a> {
    pub context: &'a CancellationToken,
    pub log_factory: &'a Arc<dyn LogFactory>,
    pub route: &'a RouteConfig,
    pub dns: &'a DnsConfig,
    pub ntp: &'a NtpConfig,
    pub inbounds: &'a [AdapterConfig],
    pub platform: Option<&'a Arc<dyn PlatformInterface>>,
}

/// One adapter or script to build.
pub struct AdapterSpec<'a> {
    /// Configured tag, or the positional index.
    pub tag: &'a str,
    /// Logger scoped to `<role>/<type>[<tag>]`.
    pub logger: Logger,
    pub config: &'a AdapterConfig,
}

pub type LogFactoryBuilder =
    Arc<dyn Fn(LogFactoryOptions) -> Result<Arc<dyn LogFactory>, BoxError> + Send + Sync>;
pub type RouterBuilder =
    Arc<dyn Fn(RouterOptions<'_>) -> Result<Arc<dyn Router>, BoxError> + Send + Sync>;
pub type InboundBuilder =
    Arc<dyn Fn(&BuildContext, AdapterSpec<'_>) -> Result<Arc<dyn Inbound>, BoxError> + Send + Sync>;
pub type OutboundBuilder = Arc<
    dyn Fn(&BuildContext, AdapterSpec<'_>) -> Result<Arc<dyn Outbound>, BoxError> + Send + Sync,
>;
pub type ProviderBuilder = Arc<
    dyn Fn(&BuildContext, AdapterSpec<'_>) -> Result<Arc<dyn ProxyProvider>, BoxError>
        + Send
        + Sync,
>;
pub type ClashApiBuilder = Arc<
    dyn Fn(&BuildContext, &ClashApiConfig) -> Result<Arc<dyn ControlApi>, BoxError> + Send + Sync,
>;
pub type V2RayApiBuilder = Arc<
    dyn Fn(&BuildContext, &V2RayApiConfig) -> Result<Arc<dyn ControlApi>, BoxError> + Send + Sync,
>;
pub type ScriptBuilder = Arc<
    dyn Fn(&BuildContext, Logger, &str, &ScriptConfig) -> Result<Arc<dyn HookScript>, BoxError>
        + Send
        + Sync,
>;

/// Builders for every element of a box.
#[derive(Clone)]
pub struct Builders {
    log_factory: LogFactoryBuilder,
    router: RouterBuilder,
    inbounds: HashMap<String, InboundBuilder>,
    outbounds: HashMap<String, OutboundBuilder>,
    providers: HashMap<String, ProviderBuilder>,
    clash_api: ClashApiBuilder,
    v2ray_api: V2RayApiBuilder,
    script: ScriptBuilder,
}

fn default_log_factory(options: LogFactoryOptions) -> Result<Arc<dyn LogFactory>, BoxError> {
    Ok(Arc::new(TracingLogFactory::new(options)?))
}

fn default_router(options: RouterOptions<'_>) -> Result<Arc<dyn Router>, BoxError> {
    Ok(Arc::new(crate::route::BasicRouter::new(options)?))
}

fn default_clash_api(
    ctx: &BuildContext,
    config: &ClashApiConfig,
) -> Result<Arc<dyn ControlApi>, BoxError> {
    Ok(Arc::new(crate::experimental::clash_api::ClashApiServer::new(ctx, config)?))
}

fn default_v2ray_api(
    ctx: &BuildContext,
    config: &V2RayApiConfig,
) -> Result<Arc<dyn ControlApi>, BoxError> {
    Ok(Arc::new(crate::experimental::v2ray_api::V2RayApiServer::new(ctx, config)?))
}

fn default_script(
    _ctx: &BuildContext,
    logger: Logger,
    tag: &str,
    config: &ScriptConfig,
) -> Result<Arc<dyn HookScript>, BoxError> {
    Ok(Arc::new(crate::script::command::CommandScript::new(logger, tag, config)?))
}

impl Default for Builders {
    fn default() -> Self {
        let mut builders = Self {
            log_factory: Arc::new(default_log_factory),
            router: Arc::new(default_router),
            inbounds: HashMap::new(),
            outbounds: HashMap::new(),
            providers: HashMap::new(),
            clash_api: Arc::new(default_clash_api),
            v2ray_api: Arc::new(default_v2ray_api),
            script: Arc::new(default_script),
        };
        crate::inbound::register_builtin(&mut builders);
        crate::outbound::register_builtin(&mut builders);
        crate::provider::register_builtin(&mut builders);
        builders
    }
}

impl Builders {
    /// Builders with no adapter types registered.
    pub fn empty() -> Self {
        let mut builders = Self::default();
        builders.inbounds.clear();
        builders.outbounds.clear();
        builders.providers.clear();
        builders
    }

    pub fn with_log_factory<F>(mut self, f: F) -> Self
    where
        F: Fn(LogFactoryOptions) -> Result<Arc<dyn LogFactory>, BoxError> + Send + Sync + 'static,
    {
        self.log_factory = Arc::new(f);
        self
    }

    pub fn with_router<F>(mut self, f: F) -> Self
    where
        F: Fn(RouterOptions<'_>) -> Result<Arc<dyn Router>, BoxError> + Send + Sync + 'static,
    {
        self.router = Arc::new(f);
        self
    }

    pub fn with_clash_api<F>(mut self, f: F) -> Self
    where
        F: Fn(&BuildContext, &ClashApiConfig) -> Result<Arc<dyn ControlApi>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.clash_api = Arc::new(f);
        self
    }

    pub fn with_v2ray_api<F>(mut self, f: F) -> Self
    where
        F: Fn(&BuildContext, &V2RayApiConfig) -> Result<Arc<dyn ControlApi>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.v2ray_api = Arc::new(f);
        self
    }

    pub fn with_script<F>(mut self, f: F) -> Self
    where
        F: Fn(&BuildContext, Logger, &str, &ScriptConfig) -> Result<Arc<dyn HookScript>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.script = Arc::new(f);
        self
    }

    pub fn register_inbound<F>(&mut self, kind: impl Into<String>, f: F)
    where
        F: Fn(&BuildContext, AdapterSpec<'_>) -> Result<Arc<dyn Inbound>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.inbounds.insert(kind.into(), Arc::new(f));
    }

    pub fn register_outbound<F>(&mut self, kind: impl Into<String>, f: F)
    where
        F: Fn(&BuildContext, AdapterSpec<'_>) -> Result<Arc<dyn Outbound>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.outbounds.insert(kind.into(), Arc::new(f));
    }

    pub fn register_provider<F>(&mut self, kind: impl Into<String>, f: F)
    where
        F: Fn(&BuildContext, AdapterSpec<'_>) -> Result<Arc<dyn ProxyProvider>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.providers.insert(kind.into(), Arc::new(f));
    }

    pub(crate) fn build_log_factory(
        &self,
        options: LogFactoryOptions,
    ) -> Result<Arc<dyn LogFactory>, BoxError> {
        (self.log_factory)(options)
    }

    pub(crate) fn build_router(&self, options: RouterOptions<'_>) -> Result<Arc<dyn Router>, BoxError> {
        (self.router)(options)
    }
}

/// Shared handles available to every builder, and after construction to
/// anything that builds adapters lazily (proxy providers, the default outbound).
#[derive(Clone)]
pub struct BuildContext {
    pub context: CancellationToken,
    pub router: Arc<dyn Router>,
    pub log_factory: Arc<dyn LogFactory>,
    pub platform: Option<Arc<dyn PlatformInterface>>,
    builders: Arc<Builders>,
}

impl BuildContext {
    pub fn new(
        context: CancellationToken,
        router: Arc<dyn Router>,
        log_factory: Arc<dyn LogFactory>,
        platform: Option<Arc<dyn PlatformInterface>>,
        builders: Arc<Builders>,
    ) -> Self {
        Self {
            context,
            router,
            log_factory,
            platform,
            builders,
        }
    }

    pub fn build_inbound(
        &self,
        index: usize,
        config: &AdapterConfig,
    ) -> Result<Arc<dyn Inbound>, BoxError> {
        let tag = config.resolved_tag(index);
        let builder = self
            .builders
            .inbounds
            .get(&config.kind)
            .ok_or_else(|| format!("unknown inbound type: {}", config.kind))?;
        let logger = self
            .log_factory
            .new_logger(&format!("inbound/{}[{}]", config.kind, tag));
        builder(self, AdapterSpec { tag: &tag, logger, config })
    }

    /// Build an outbound with an already resolved tag.
    pub fn build_outbound(
        &self,
        tag: &str,
        config: &AdapterConfig,
    ) -> Result<Arc<dyn Outbound>, BoxError> {
        let builder = self
            .builders
            .outbounds
            .get(&config.kind)
            .ok_or_else(|| format!("unknown outbound type: {}", config.kind))?;
        let logger = self
            .log_factory
            .new_logger(&format!("outbound/{}[{}]", config.kind, tag));
        builder(self, AdapterSpec { tag, logger, config })
    }

    /// The built-in direct outbound used as the router's last-resort fallback.
    pub fn build_default_outbound(&self) -> Result<Arc<dyn Outbound>, BoxError> {
        self.build_outbound("default", &AdapterConfig::new("direct", "default"))
    }

    pub fn build_provider(
        &self,
        index: usize,
        config: &AdapterConfig,
    ) -> Result<Arc<dyn ProxyProvider>, BoxError> {
        let tag = config.resolved_tag(index);
        let builder = self
            .builders
            .providers
            .get(&config.kind)
            .ok_or_else(|| format!("unknown proxy provider type: {}", config.kind))?;
        let logger = self
            .log_factory
            .new_logger(&format!("proxy-provider/{}[{}]", config.kind, tag));
        builder(self, AdapterSpec { tag: &tag, logger, config })
    }

    pub fn build_clash_api(&self, config: &ClashApiConfig) -> Result<Arc<dyn ControlApi>, BoxError> {
        (self.builders.clash_api)(self, config)
    }

    pub fn build_v2ray_api(&self, config: &V2RayApiConfig) -> Result<Arc<dyn ControlApi>, BoxError> {
        (self.builders.v2ray_api)(self, config)
    }

    pub fn build_script(
        &self,
        index: usize,
        config: &ScriptConfig,
    ) -> Result<Arc<dyn HookScript>, BoxError> {
        let tag = config.resolved_tag(index);
        let logger = self.log_factory.new_logger(&format!("script[{}]", tag));
        (self.builders.script)(self, logger, &tag, config)
    }
}
