//! V2Ray-style stats API.
//!
//! Serves the Prometheus exposition of the process metrics at `GET /stats`.
//! The first server in a process installs the global recorder; later ones
//! share its handle.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use axum::{extract::State, http::header, response::IntoResponse, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::adapter::{BuildContext, ControlApi, RouterEvent, Service};
use crate::config::V2RayApiConfig;
use crate::error::BoxError;
use crate::experimental::server::HttpServer;
use crate::observability::Logger;

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn prometheus_handle(logger: &Logger) -> PrometheusHandle {
    HANDLE
        .get_or_init(|| {
            let recorder = PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();
            if metrics::set_global_recorder(recorder).is_err() {
                logger.warn("another metrics recorder is installed, /stats will be empty");
            }
            handle
        })
        .clone()
}

async fn get_stats(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    )
}

/// V2Ray API server, registered as the "v2ray api" pre-service.
pub struct V2RayApiServer {
    server: HttpServer,
    handle: PrometheusHandle,
    logger: Logger,
}

impl V2RayApiServer {
    pub fn new(ctx: &BuildContext, config: &V2RayApiConfig) -> Result<Self, BoxError> {
        if config.listen.is_empty() {
            return Err("missing listen address".into());
        }
        let logger = ctx.log_factory.new_logger("v2ray-api");
        Ok(Self {
            server: HttpServer::new(&config.listen, &ctx.context),
            handle: prometheus_handle(&logger),
            logger,
        })
    }

    /// Bound address, once pre-started.
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.server.local_addr()
    }

    /// Current Prometheus exposition.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[async_trait]
impl Service for V2RayApiServer {
    async fn pre_start(&self) -> Result<(), BoxError> {
        self.server.bind().await
    }

    async fn start(&self) -> Result<(), BoxError> {
        let app = axum::Router::new()
            .route("/stats", get(get_stats))
            .with_state(self.handle.clone());
        self.server.serve(app, &self.logger).await
    }

    async fn close(&self) -> Result<(), BoxError> {
        self.server.shutdown().await
    }
}

impl ControlApi for V2RayApiServer {
    fn on_router_event(&self, event: RouterEvent) {
        let event = match event {
            RouterEvent::Started => "started",
            RouterEvent::Closing => "closing",
            RouterEvent::Closed => "closed",
        };
        metrics::counter!("box_router_events_total", "event" => event).increment(1);
    }

    fn into_service(self: Arc<Self>) -> Arc<dyn Service> {
        self
    }
}
