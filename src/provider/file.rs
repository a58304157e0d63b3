//! File-backed proxy provider.
//!
//! # Responsibilities
//! - `update`: re-read the proxy list from disk
//! - `outbounds`: build one outbound per entry through the outbound builders
//!
//! # Design Decisions
//! - The last successfully read list is kept when a refresh fails
//! - Untagged entries are tagged `<provider tag>/<index>`

use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde::Deserialize;

use crate::adapter::{BuildContext, Outbound, ProxyProvider};
use crate::config::AdapterConfig;
use crate::error::BoxError;
use crate::observability::Logger;

/// Options of the `file` provider.
#[derive(Debug, Clone, Deserialize)]
pub struct FileProviderOptions {
    pub path: PathBuf,
}

/// On-disk proxy list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyList {
    #[serde(default)]
    pub outbounds: Vec<AdapterConfig>,
}

pub struct FileProvider {
    tag: String,
    path: PathBuf,
    ctx: BuildContext,
    logger: Logger,
    list: ArcSwap<ProxyList>,
}

impl FileProvider {
    pub fn new(ctx: &BuildContext, tag: &str, options: FileProviderOptions, logger: Logger) -> Self {
        Self {
            tag: tag.to_string(),
            path: options.path,
            ctx: ctx.clone(),
            logger,
            list: ArcSwap::from_pointee(ProxyList::default()),
        }
    }

    fn parse(&self, content: &str) -> Result<ProxyList, BoxError> {
        let json = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if json {
            Ok(serde_json::from_str(content)?)
        } else {
            Ok(toml::from_str(content)?)
        }
    }
}

#[async_trait]
impl ProxyProvider for FileProvider {
    fn tag(&self) -> &str {
        &self.tag
    }

    async fn update(&self) -> Result<(), BoxError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| format!("read {}: {}", self.path.display(), e))?;
        let list = self.parse(&content)?;
        self.logger
            .info(format_args!("loaded {} proxies", list.outbounds.len()));
        self.list.store(Arc::new(list));
        Ok(())
    }

    async fn outbounds(&self) -> Result<Vec<Arc<dyn Outbound>>, BoxError> {
        let list = self.list.load();
        list.outbounds
            .iter()
            .enumerate()
            .map(|(i, config)| {
                let tag = if config.tag.is_empty() {
                    format!("{}/{}", self.tag, i)
                } else {
                    config.tag.clone()
                };
                self.ctx
                    .build_outbound(&tag, config)
                    .map_err(|e| BoxError::from(format!("outbound[{}]: {}", i, e)))
            })
            .collect()
    }
}
