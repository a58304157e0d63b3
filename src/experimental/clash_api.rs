//! Clash-compatible control API.
//!
//! # Responsibilities
//! - Report the version, the router's outbounds, recent logs and router events
//! - Require `Authorization: Bearer <secret>` when a secret is configured
//!
//! # Data Flow
//! ```text
//! LogFactory (observable) → broadcast feed → collector task → LogBuffer → GET /logs
//! Router start / close    → on_router_event → GET /events
//! Router::outbounds()     → GET /proxies
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::get,
    Json,
};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::adapter::{BuildContext, ControlApi, Router, RouterEvent, Service};
use crate::config::ClashApiConfig;
use crate::error::BoxError;
use crate::experimental::server::HttpServer;
use crate::observability::{LogEntry, Logger};

/// Bounded buffer of recent log entries.
struct LogBuffer {
    capacity: usize,
    entries: Mutex<VecDeque<LogEntry>>,
}

impl LogBuffer {
    fn push(&self, entry: LogEntry) {
        if self.capacity == 0 {
            return;
        }
        if let Ok(mut entries) = self.entries.lock() {
            if entries.len() == self.capacity {
                entries.pop_front();
            }
            entries.push_back(entry);
        }
    }

    fn snapshot(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .map(|e| e.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[derive(Clone)]
struct ApiState {
    secret: Option<Arc<str>>,
    router: Arc<dyn Router>,
    logs: Arc<LogBuffer>,
    events: Arc<Mutex<Vec<RouterEvent>>>,
}

#[derive(Serialize)]
struct Version {
    version: &'static str,
    premium: bool,
}

#[derive(Serialize)]
struct Proxy {
    #[serde(rename = "type")]
    kind: String,
    name: String,
}

#[derive(Serialize)]
struct Proxies {
    proxies: BTreeMap<String, Proxy>,
    default: Option<String>,
}

async fn get_version() -> Json<Version> {
    Json(Version {
        version: env!("CARGO_PKG_VERSION"),
        premium: false,
    })
}

async fn get_proxies(State(state): State<ApiState>) -> Json<Proxies> {
    let proxies = state
        .router
        .outbounds()
        .iter()
        .map(|o| {
            (
                o.tag().to_string(),
                Proxy {
                    kind: o.kind().to_string(),
                    name: o.tag().to_string(),
                },
            )
        })
        .collect();
    Json(Proxies {
        proxies,
        default: state.router.default_outbound().map(|o| o.tag().to_string()),
    })
}

async fn get_logs(State(state): State<ApiState>) -> Json<Vec<LogEntry>> {
    Json(state.logs.snapshot())
}

async fn get_events(State(state): State<ApiState>) -> Json<Vec<RouterEvent>> {
    Json(state.events.lock().map(|e| e.clone()).unwrap_or_default())
}

async fn auth(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(secret) = &state.secret else {
        return Ok(next.run(request).await);
    };
    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if provided == Some(&**secret) {
        Ok(next.run(request).await)
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

/// Clash API server, registered as the "clash api" pre-service.
pub struct ClashApiServer {
    server: HttpServer,
    state: ApiState,
    logger: Logger,
    collector: LogCollector,
}

impl ClashApiServer {
    pub fn new(ctx: &BuildContext, config: &ClashApiConfig) -> Result<Self, BoxError> {
        if config.external_controller.is_empty() {
            return Err("missing external_controller".into());
        }
        Ok(Self {
            server: HttpServer::new(&config.external_controller, &ctx.context),
            state: ApiState {
                secret: config.secret.as_deref().filter(|s| !s.is_empty()).map(Arc::from),
                router: ctx.router.clone(),
                logs: Arc::new(LogBuffer {
                    capacity: config.log_buffer,
                    entries: Mutex::new(VecDeque::new()),
                }),
                events: Arc::new(Mutex::new(Vec::new())),
            },
            logger: ctx.log_factory.new_logger("clash-api"),
            collector: LogCollector::new(ctx.log_factory.subscribe()),
        })
    }

    /// Bound address, once pre-started.
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.server.local_addr()
    }

    fn app(&self) -> axum::Router {
        axum::Router::new()
            .route("/version", get(get_version))
            .route("/proxies", get(get_proxies))
            .route("/logs", get(get_logs))
            .route("/events", get(get_events))
            .layer(middleware::from_fn_with_state(self.state.clone(), auth))
            .with_state(self.state.clone())
    }
}

/// Task copying the log feed into the `/logs` buffer.
struct LogCollector {
    feed: Mutex<Option<broadcast::Receiver<LogEntry>>>,
    stop: CancellationToken,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl LogCollector {
    fn new(feed: Option<broadcast::Receiver<LogEntry>>) -> Self {
        Self {
            feed: Mutex::new(feed),
            stop: CancellationToken::new(),
            task: tokio::sync::Mutex::new(None),
        }
    }

    async fn spawn(&self, logs: Arc<LogBuffer>) {
        let Some(mut feed) = self.feed.lock().ok().and_then(|mut f| f.take()) else {
            return;
        };
        let stop = self.stop.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    entry = feed.recv() => match entry {
                        Ok(entry) => logs.push(entry),
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });
        *self.task.lock().await = Some(task);
    }

    async fn stop(&self) -> Result<(), BoxError> {
        self.stop.cancel();
        if let Some(task) = self.task.lock().await.take() {
            task.await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Service for ClashApiServer {
    async fn pre_start(&self) -> Result<(), BoxError> {
        self.server.bind().await
    }

    async fn start(&self) -> Result<(), BoxError> {
        self.collector.spawn(self.state.logs.clone()).await;
        self.server.serve(self.app(), &self.logger).await
    }

    async fn close(&self) -> Result<(), BoxError> {
        let collected = self.collector.stop().await;
        self.server.shutdown().await?;
        collected
    }
}

impl ControlApi for ClashApiServer {
    fn on_router_event(&self, event: RouterEvent) {
        self.logger.debug(format_args!("router event: {:?}", event));
        if let Ok(mut events) = self.state.events.lock() {
            events.push(event);
        }
    }

    fn into_service(self: Arc<Self>) -> Arc<dyn Service> {
        self
    }
}
