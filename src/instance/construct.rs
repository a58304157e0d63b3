//! Construction pipeline.
//!
//! # Data Flow
//! ```text
//! debug settings → log factory → router → inbounds → outbounds
//!     → proxy providers (build, update, outbounds) → router.initialize
//!     → platform → control APIs (pre-services) → extra services (post-services)
//!     → scripts → ProxyBox
//! ```
//!
//! # Design Decisions
//! - Nothing is started here, so a failure just drops what was built
//! - Every failure names the element that caused it (`BuildStage`)

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::adapter::builder::{LogFactoryOptions, RouterOptions};
use crate::adapter::service::{CLASH_API, V2RAY_API};
use crate::adapter::{AdapterRegistry, BuildContext, DefaultOutbound, ServiceList};
use crate::error::{BuildError, BuildStage};
use crate::experimental::debug;
use crate::instance::{Options, ProxyBox};
use crate::lifecycle::ShutdownLatch;

impl ProxyBox {
    /// Build every element of the box from `options`. Nothing is started.
    pub async fn new(options: Options) -> Result<Self, BuildError> {
        let Options {
            config,
            context,
            platform,
            builders,
            services,
        } = options;
        let context = context.unwrap_or_default();
        let created_at = Instant::now();
        let id = Uuid::new_v4();

        let experimental = &config.experimental;
        let debug_settings = debug::apply(&experimental.debug);
        let need_clash_api = experimental.needs_clash_api();
        let need_v2ray_api = experimental.needs_v2ray_api();

        let log_factory = builders
            .build_log_factory(LogFactoryOptions {
                config: config.log.clone(),
                observable: need_clash_api,
                platform: platform.clone(),
            })
            .map_err(|e| BuildError::new(BuildStage::LogFactory, e))?;
        let logger = log_factory.logger();
        logger.debug(format_args!("box {} created", id));
        if !debug_settings.is_empty() {
            logger.debug(format_args!("debug settings: {:?}", debug_settings));
        }

        let router = builders
            .build_router(RouterOptions {
                context: &context,
                log_factory: &log_factory,
                route: &config.route,
                dns: &config.dns,
                ntp: &config.ntp,
                inbounds: &config.inbounds,
                platform: platform.as_ref(),
            })
            .map_err(|e| BuildError::new(BuildStage::Route, e))?;

        let ctx = BuildContext::new(
            context.clone(),
            router.clone(),
            log_factory.clone(),
            platform.clone(),
            Arc::new(builders),
        );

        let mut registry = AdapterRegistry::new();
        for (i, inbound) in config.inbounds.iter().enumerate() {
            let inbound = ctx
                .build_inbound(i, inbound)
                .map_err(|e| BuildError::new(BuildStage::Inbound(i), e))?;
            registry.push_inbound(inbound);
        }
        for (i, outbound) in config.outbounds.iter().enumerate() {
            let outbound = ctx
                .build_outbound(&outbound.resolved_tag(i), outbound)
                .map_err(|e| BuildError::new(BuildStage::Outbound(i), e))?;
            registry.push_outbound(outbound);
        }

        for (i, provider) in config.proxy_providers.iter().enumerate() {
            let provider = ctx
                .build_provider(i, provider)
                .map_err(|e| BuildError::new(BuildStage::ParseProvider(i), e))?;
            logger.info(format_args!("init proxy provider[{}]", i));
            provider
                .update()
                .await
                .map_err(|e| BuildError::new(BuildStage::UpdateProvider(i), e))?;
            let outbounds = provider
                .outbounds()
                .await
                .map_err(|e| BuildError::new(BuildStage::ProviderOutbounds(i), e))?;
            logger.info(format_args!(
                "init proxy provider[{}] done, {} outbounds",
                i,
                outbounds.len()
            ));
            registry.push_provider(provider, outbounds);
        }

        let adapters = registry.snapshot();
        let mut default_outbound =
            DefaultOutbound::new(&mut registry, || ctx.build_default_outbound());
        router
            .initialize(adapters, &mut default_outbound)
            .map_err(|e| BuildError::new(BuildStage::InitializeRouter, e))?;
        if let Some(outbound) = default_outbound.created() {
            logger.debug(format_args!(
                "created default outbound/{}[{}]",
                outbound.kind(),
                outbound.tag()
            ));
        }
        drop(default_outbound);

        if let Some(platform) = &platform {
            platform
                .initialize(&context, router.clone())
                .await
                .map_err(|e| BuildError::new(BuildStage::Platform, e))?;
        }

        let mut pre_services = ServiceList::new();
        if let Some(config) = experimental.clash_api.as_ref().filter(|_| need_clash_api) {
            let api = ctx
                .build_clash_api(config)
                .map_err(|e| BuildError::new(BuildStage::ClashApi, e))?;
            router.attach_control_api(api.clone());
            pre_services
                .register(CLASH_API, api.into_service())
                .map_err(|e| BuildError::new(BuildStage::RegisterService(CLASH_API.into()), e))?;
        }
        if let Some(config) = experimental.v2ray_api.as_ref().filter(|_| need_v2ray_api) {
            let api = ctx
                .build_v2ray_api(config)
                .map_err(|e| BuildError::new(BuildStage::V2RayApi, e))?;
            router.attach_control_api(api.clone());
            pre_services
                .register(V2RAY_API, api.into_service())
                .map_err(|e| BuildError::new(BuildStage::RegisterService(V2RAY_API.into()), e))?;
        }

        let mut post_services = ServiceList::new();
        for (name, service) in services {
            if pre_services.contains(&name) {
                return Err(BuildError::new(
                    BuildStage::RegisterService(name.clone()),
                    crate::adapter::service::DuplicateService(name),
                ));
            }
            post_services
                .register(name.clone(), service)
                .map_err(|e| BuildError::new(BuildStage::RegisterService(name), e))?;
        }

        let scripts = config
            .script
            .iter()
            .enumerate()
            .map(|(i, script)| {
                ctx.build_script(i, script)
                    .map_err(|e| BuildError::new(BuildStage::Script(i), e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ProxyBox {
            id,
            created_at,
            context,
            router,
            registry,
            pre_services,
            post_services,
            scripts,
            log_factory,
            logger,
            pre_started: AtomicBool::new(false),
            latch: ShutdownLatch::new(),
        })
    }
}
