//! Adapter registry: the ordered inbound and outbound lists of a box.
//!
//! # Responsibilities
//! - Keep inbounds and outbounds in configuration order
//! - Append proxy-provider outbounds and record them per provider tag
//! - Hand the router a mutable handle for materializing the default outbound
//!
//! # Design Decisions
//! - Mutation needs `&mut`; once the box owns the registry it only lends `&`,
//!   so the outbound list cannot grow after construction
//! - Tags are assumed unique; lookups return the first match

use std::sync::Arc;

use crate::adapter::{Inbound, Outbound, ProxyProvider, RouterAdapters};
use crate::error::BoxError;

/// Provider tag → outbounds, in provider order.
#[derive(Clone, Default)]
pub struct ProviderOutbounds {
    groups: Vec<(String, Vec<Arc<dyn Outbound>>)>,
}

impl ProviderOutbounds {
    pub fn insert(&mut self, tag: impl Into<String>, outbounds: Vec<Arc<dyn Outbound>>) {
        let tag = tag.into();
        match self.groups.iter_mut().find(|(t, _)| *t == tag) {
            Some((_, group)) => *group = outbounds,
            None => self.groups.push((tag, outbounds)),
        }
    }

    pub fn get(&self, tag: &str) -> Option<&[Arc<dyn Outbound>]> {
        self.groups
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, group)| group.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Arc<dyn Outbound>])> {
        self.groups.iter().map(|(t, g)| (t.as_str(), g.as_slice()))
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(t, _)| t.as_str())
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Constructed adapters of a box.
#[derive(Default)]
pub struct AdapterRegistry {
    inbounds: Vec<Arc<dyn Inbound>>,
    outbounds: Vec<Arc<dyn Outbound>>,
    providers: Vec<Arc<dyn ProxyProvider>>,
    provider_outbounds: ProviderOutbounds,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_inbound(&mut self, inbound: Arc<dyn Inbound>) {
        self.inbounds.push(inbound);
    }

    pub fn push_outbound(&mut self, outbound: Arc<dyn Outbound>) {
        self.outbounds.push(outbound);
    }

    /// Register a provider and append its outbounds to the outbound list.
    pub fn push_provider(
        &mut self,
        provider: Arc<dyn ProxyProvider>,
        outbounds: Vec<Arc<dyn Outbound>>,
    ) {
        self.outbounds.extend(outbounds.iter().cloned());
        self.provider_outbounds.insert(provider.tag(), outbounds);
        self.providers.push(provider);
    }

    pub fn inbounds(&self) -> &[Arc<dyn Inbound>] {
        &self.inbounds
    }

    pub fn outbounds(&self) -> &[Arc<dyn Outbound>] {
        &self.outbounds
    }

    pub fn providers(&self) -> &[Arc<dyn ProxyProvider>] {
        &self.providers
    }

    pub fn provider_outbounds(&self) -> &ProviderOutbounds {
        &self.provider_outbounds
    }

    pub fn inbound(&self, tag: &str) -> Option<&Arc<dyn Inbound>> {
        self.inbounds.iter().find(|i| i.tag() == tag)
    }

    pub fn outbound(&self, tag: &str) -> Option<&Arc<dyn Outbound>> {
        self.outbounds.iter().find(|o| o.tag() == tag)
    }

    /// Owned copy of every list, as handed to `Router::initialize`.
    pub fn snapshot(&self) -> RouterAdapters {
        RouterAdapters {
            inbounds: self.inbounds.clone(),
            outbounds: self.outbounds.clone(),
            providers: self.providers.clone(),
            provider_outbounds: self.provider_outbounds.clone(),
        }
    }
}

type BuildOutbound<'a> = Box<dyn FnOnce() -> Result<Arc<dyn Outbound>, BoxError> + Send + 'a>;

/// Handle through which the router may grow the outbound list by exactly one
/// built-in fallback outbound.
///
/// The factory runs on the first `get_or_create` only. A successful build is
/// appended to the registry and returned by every later call; a failed build
/// is reported again without rebuilding.
pub struct DefaultOutbound<'a> {
    registry: &'a mut AdapterRegistry,
    build: Option<BuildOutbound<'a>>,
    created: Option<Arc<dyn Outbound>>,
    failure: Option<String>,
}

impl<'a> DefaultOutbound<'a> {
    pub fn new<F>(registry: &'a mut AdapterRegistry, build: F) -> Self
    where
        F: FnOnce() -> Result<Arc<dyn Outbound>, BoxError> + Send + 'a,
    {
        Self {
            registry,
            build: Some(Box::new(build)),
            created: None,
            failure: None,
        }
    }

    pub fn get_or_create(&mut self) -> Result<Arc<dyn Outbound>, BoxError> {
        if let Some(outbound) = &self.created {
            return Ok(outbound.clone());
        }
        let Some(build) = self.build.take() else {
            let reason = self.failure.as_deref().unwrap_or("not available");
            return Err(format!("create default outbound: {}", reason).into());
        };
        match build() {
            Ok(outbound) => {
                self.registry.push_outbound(outbound.clone());
                self.created = Some(outbound.clone());
                Ok(outbound)
            }
            Err(err) => {
                self.failure = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// The outbound built so far, if any.
    pub fn created(&self) -> Option<&Arc<dyn Outbound>> {
        self.created.as_ref()
    }
}
