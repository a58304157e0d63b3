//! Direct inbound: accepts TCP connections and hands them to the router
//! with a fixed destination.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::adapter::{BuildContext, Inbound, InboundContext, Router};
use crate::error::BoxError;
use crate::inbound::listener::Listener;
use crate::observability::Logger;

/// Options of the `direct` inbound.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectInboundOptions {
    /// Bind address (e.g., "127.0.0.1:1080").
    pub listen: String,

    /// Destination every accepted connection is forwarded to.
    pub override_address: String,

    /// Maximum concurrent connections (backpressure).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_max_connections() -> usize {
    1024
}

struct Running {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct DirectInbound {
    tag: String,
    options: DirectInboundOptions,
    router: Arc<dyn Router>,
    context: CancellationToken,
    logger: Logger,
    running: Mutex<Option<Running>>,
}

impl DirectInbound {
    pub fn new(
        ctx: &BuildContext,
        tag: &str,
        options: DirectInboundOptions,
        logger: Logger,
    ) -> Self {
        Self {
            tag: tag.to_string(),
            options,
            router: ctx.router.clone(),
            context: ctx.context.clone(),
            logger,
            running: Mutex::new(None),
        }
    }

    /// Bound address while started.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|r| r.local_addr)
    }
}

/// Accept until cancelled, then wait for every connection task to end.
async fn accept_loop(
    listener: Listener,
    tag: String,
    destination: String,
    router: Arc<dyn Router>,
    cancel: CancellationToken,
    logger: Logger,
) {
    let mut connections = JoinSet::new();
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            Some(_) = connections.join_next() => continue,
            accepted = listener.accept() => accepted,
        };
        let (stream, source, permit) = match accepted {
            Ok(conn) => conn,
            Err(e) => {
                logger.warn(e);
                continue;
            }
        };
        let router = router.clone();
        let logger = logger.clone();
        let cancel = cancel.clone();
        let metadata = InboundContext {
            inbound: tag.clone(),
            source,
            destination: destination.clone(),
        };
        connections.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    logger.debug(format_args!("connection from {} dropped on close", source));
                }
                routed = router.route_connection(stream, metadata) => {
                    if let Err(e) = routed {
                        logger.debug(format_args!("connection from {} closed: {}", source, e));
                    }
                }
            }
            drop(permit);
        });
    }
    while connections.join_next().await.is_some() {}
}

#[async_trait]
impl Inbound for DirectInbound {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn kind(&self) -> &str {
        "direct"
    }

    async fn start(&self) -> Result<(), BoxError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err("inbound already started".into());
        }
        let listener = Listener::bind(&self.options.listen, self.options.max_connections).await?;
        let local_addr = listener.local_addr()?;
        let cancel = self.context.child_token();
        let task = tokio::spawn(accept_loop(
            listener,
            self.tag.clone(),
            self.options.override_address.clone(),
            self.router.clone(),
            cancel.clone(),
            self.logger.clone(),
        ));
        self.logger.info(format_args!("tcp server started at {}", local_addr));
        *running = Some(Running {
            local_addr,
            cancel,
            task,
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), BoxError> {
        let Some(running) = self.running.lock().await.take() else {
            return Ok(());
        };
        running.cancel.cancel();
        running.task.await?;
        Ok(())
    }
}
