//! Ordered auxiliary service bookkeeping.
//!
//! Services start and stop in registration order. A name index allows
//! lookup without giving up that order.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::adapter::Service;

/// Name of the Clash API pre-service.
pub const CLASH_API: &str = "clash api";

/// Name of the V2Ray API pre-service.
pub const V2RAY_API: &str = "v2ray api";

#[derive(Debug, Error)]
#[error("service {0:?} already registered")]
pub struct DuplicateService(pub String);

/// Services in registration order, addressable by name.
#[derive(Default)]
pub struct ServiceList {
    services: Vec<(String, Arc<dyn Service>)>,
    index: HashMap<String, usize>,
}

impl ServiceList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        service: Arc<dyn Service>,
    ) -> Result<(), DuplicateService> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(DuplicateService(name));
        }
        self.index.insert(name.clone(), self.services.len());
        self.services.push((name, service));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Service>> {
        self.index.get(name).map(|&i| &self.services[i].1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Service>)> {
        self.services.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
