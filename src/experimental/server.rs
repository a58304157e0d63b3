//! HTTP listener shared by the control-plane APIs.
//!
//! # Design Decisions
//! - Binding and serving are split so a port conflict fails pre-start,
//!   before any inbound accepts traffic
//! - Shutdown is graceful: in-flight requests finish, then the task exits

use std::io;
use std::net::SocketAddr;
use std::sync::OnceLock;

use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::error::BoxError;
use crate::observability::Logger;

/// Listener and serve task of one control API.
pub struct HttpServer {
    listen: String,
    shutdown: CancellationToken,
    listener: Mutex<Option<TcpListener>>,
    task: Mutex<Option<JoinHandle<io::Result<()>>>>,
    local_addr: OnceLock<SocketAddr>,
}

impl HttpServer {
    pub fn new(listen: impl Into<String>, context: &CancellationToken) -> Self {
        Self {
            listen: listen.into(),
            shutdown: context.child_token(),
            listener: Mutex::new(None),
            task: Mutex::new(None),
            local_addr: OnceLock::new(),
        }
    }

    /// Address actually bound, once `bind` succeeded.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    pub async fn bind(&self) -> Result<(), BoxError> {
        let mut slot = self.listener.lock().await;
        if slot.is_some() || self.local_addr.get().is_some() {
            return Ok(());
        }
        let listener = TcpListener::bind(&self.listen)
            .await
            .map_err(|e| format!("listen {}: {}", self.listen, e))?;
        let _ = self.local_addr.set(listener.local_addr()?);
        *slot = Some(listener);
        Ok(())
    }

    /// Serve `app` on the bound listener, binding first if needed.
    pub async fn serve(&self, app: axum::Router, logger: &Logger) -> Result<(), BoxError> {
        self.bind().await?;
        let listener = self
            .listener
            .lock()
            .await
            .take()
            .ok_or("server already running")?;
        let addr = listener.local_addr()?;
        logger.info(format_args!("api server listening at {}", addr));

        let shutdown = self.shutdown.clone();
        let app = app.layer(TraceLayer::new_for_http());
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
        });
        *self.task.lock().await = Some(task);
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<(), BoxError> {
        self.shutdown.cancel();
        self.listener.lock().await.take();
        if let Some(task) = self.task.lock().await.take() {
            task.await??;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_reports_address_and_conflicts() {
        let first = HttpServer::new("127.0.0.1:0", &CancellationToken::new());
        first.bind().await.unwrap();
        let addr = first.local_addr().unwrap();

        let second = HttpServer::new(addr.to_string(), &CancellationToken::new());
        let err = second.bind().await.unwrap_err();
        assert!(err.to_string().starts_with(&format!("listen {}", addr)));
    }

    #[tokio::test]
    async fn test_shutdown_without_serve() {
        let server = HttpServer::new("127.0.0.1:0", &CancellationToken::new());
        server.bind().await.unwrap();
        server.shutdown().await.unwrap();
    }
}
