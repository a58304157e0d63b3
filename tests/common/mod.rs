//! Shared mock collaborators for integration tests.
//!
//! Every mock appends `"<action> <label>"` to a shared journal so tests can
//! check call counts and ordering. Mock behaviour is driven by adapter
//! options:
//!
//! - `has_start` (bool): outbound exposes a start step
//! - `fail_start` / `fail_close` (string): the step fails with this message
//! - `panic_close` (bool): close panics
//! - `count` (number): outbounds produced by a `mock` proxy provider
//! - `fail_update` / `fail_outbounds` (string): provider step fails
//!
//! The mock router reads the same keys from `route` plus `default_calls`
//! (how many times `initialize` asks for the default outbound).

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use proxy_box::adapter::{
    Builders, ControlApi, DefaultOutbound, Inbound, Outbound, PlatformInterface, ProxyProvider,
    Router, RouterAdapters, RouterEvent, Service,
};
use proxy_box::config::{AdapterConfig, Config, LogConfig, ScriptConfig, ScriptMode};
use proxy_box::error::BoxError;
use proxy_box::observability::{LogFactory, Logger};
use proxy_box::script::HookScript;

/// Ordered record of calls made on mocks.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == entry).count()
    }

    /// Entries starting with `prefix`, in order.
    pub fn with_prefix(&self, prefix: &str) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

/// Failure knobs read from adapter options.
#[derive(Clone, Default)]
pub struct Behaviour {
    pub has_start: bool,
    pub fail_start: Option<String>,
    pub fail_close: Option<String>,
    pub panic_close: bool,
}

impl Behaviour {
    pub fn from_options(options: &Map<String, Value>) -> Self {
        let text = |key: &str| options.get(key).and_then(Value::as_str).map(String::from);
        let flag = |key: &str| options.get(key).and_then(Value::as_bool).unwrap_or(false);
        Self {
            has_start: flag("has_start"),
            fail_start: text("fail_start"),
            fail_close: text("fail_close"),
            panic_close: flag("panic_close"),
        }
    }
}

/// Journals an action and applies the configured outcome.
fn step(journal: &Journal, action: &str, label: &str, fail: &Option<String>) -> Result<(), BoxError> {
    journal.push(format!("{} {}", action, label));
    match fail {
        Some(message) => Err(message.clone().into()),
        None => Ok(()),
    }
}

pub struct MockInbound {
    tag: String,
    kind: String,
    behaviour: Behaviour,
    journal: Journal,
}

#[async_trait]
impl Inbound for MockInbound {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    async fn start(&self) -> Result<(), BoxError> {
        step(&self.journal, "start", &self.label(), &self.behaviour.fail_start)
    }

    async fn close(&self) -> Result<(), BoxError> {
        if self.behaviour.panic_close {
            panic!("inbound close panicked");
        }
        step(&self.journal, "close", &self.label(), &self.behaviour.fail_close)
    }
}

impl MockInbound {
    fn label(&self) -> String {
        format!("inbound/{}[{}]", self.kind, self.tag)
    }
}

pub struct MockOutbound {
    tag: String,
    kind: String,
    behaviour: Behaviour,
    journal: Journal,
}

impl MockOutbound {
    fn label(&self) -> String {
        format!("outbound/{}[{}]", self.kind, self.tag)
    }
}

#[async_trait]
impl Outbound for MockOutbound {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    fn has_start(&self) -> bool {
        self.behaviour.has_start
    }

    async fn start(&self) -> Result<(), BoxError> {
        step(&self.journal, "start", &self.label(), &self.behaviour.fail_start)
    }

    async fn close(&self) -> Result<(), BoxError> {
        if self.behaviour.panic_close {
            panic!("outbound close panicked");
        }
        step(&self.journal, "close", &self.label(), &self.behaviour.fail_close)
    }
}

pub struct MockProvider {
    tag: String,
    count: usize,
    fail_update: Option<String>,
    fail_outbounds: Option<String>,
    journal: Journal,
}

#[async_trait]
impl ProxyProvider for MockProvider {
    fn tag(&self) -> &str {
        &self.tag
    }

    async fn update(&self) -> Result<(), BoxError> {
        step(&self.journal, "update", &format!("provider[{}]", self.tag), &self.fail_update)
    }

    async fn outbounds(&self) -> Result<Vec<Arc<dyn Outbound>>, BoxError> {
        step(&self.journal, "outbounds", &format!("provider[{}]", self.tag), &self.fail_outbounds)?;
        Ok((0..self.count)
            .map(|i| {
                Arc::new(MockOutbound {
                    tag: format!("{}/{}", self.tag, i),
                    kind: "mock".into(),
                    behaviour: Behaviour::default(),
                    journal: self.journal.clone(),
                }) as Arc<dyn Outbound>
            })
            .collect())
    }
}

/// What the mock router received at initialization.
#[derive(Clone, Default)]
pub struct Initialized {
    pub inbounds: Vec<String>,
    pub outbounds: Vec<String>,
    pub providers: Vec<String>,
    pub groups: Vec<(String, Vec<String>)>,
    pub default: Option<String>,
}

pub struct MockRouter {
    behaviour: Behaviour,
    default_calls: u64,
    journal: Journal,
    recorded: Arc<Mutex<Option<Initialized>>>,
    events: Mutex<Vec<Arc<dyn ControlApi>>>,
}

impl MockRouter {
    fn emit(&self, event: RouterEvent) {
        for api in self.events.lock().unwrap().iter() {
            api.on_router_event(event);
        }
    }
}

#[async_trait]
impl Router for MockRouter {
    fn initialize(
        &self,
        adapters: RouterAdapters,
        default_outbound: &mut DefaultOutbound<'_>,
    ) -> Result<(), BoxError> {
        self.journal.push("initialize router");
        let mut default = None;
        for _ in 0..self.default_calls {
            default = Some(default_outbound.get_or_create()?.tag().to_string());
        }
        *self.recorded.lock().unwrap() = Some(Initialized {
            inbounds: adapters.inbounds.iter().map(|i| i.tag().to_string()).collect(),
            outbounds: adapters.outbounds.iter().map(|o| o.tag().to_string()).collect(),
            providers: adapters.providers.iter().map(|p| p.tag().to_string()).collect(),
            groups: adapters
                .provider_outbounds
                .iter()
                .map(|(tag, group)| {
                    (tag.to_string(), group.iter().map(|o| o.tag().to_string()).collect())
                })
                .collect(),
            default,
        });
        Ok(())
    }

    fn attach_control_api(&self, api: Arc<dyn ControlApi>) {
        self.events.lock().unwrap().push(api);
    }

    async fn start(&self) -> Result<(), BoxError> {
        step(&self.journal, "start", "router", &self.behaviour.fail_start)?;
        self.emit(RouterEvent::Started);
        Ok(())
    }

    async fn close(&self) -> Result<(), BoxError> {
        if self.behaviour.panic_close {
            panic!("router close panicked");
        }
        self.emit(RouterEvent::Closing);
        step(&self.journal, "close", "router", &self.behaviour.fail_close)
    }
}

/// Service journaled under its name. Also usable as a control API.
pub struct MockService {
    name: String,
    behaviour: Behaviour,
    journal: Journal,
}

impl MockService {
    pub fn new(name: &str, journal: &Journal) -> Arc<Self> {
        Self::with_behaviour(name, Behaviour::default(), journal)
    }

    pub fn with_behaviour(name: &str, behaviour: Behaviour, journal: &Journal) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            behaviour,
            journal: journal.clone(),
        })
    }
}

#[async_trait]
impl Service for MockService {
    async fn pre_start(&self) -> Result<(), BoxError> {
        step(&self.journal, "pre-start", &self.name, &None)
    }

    async fn start(&self) -> Result<(), BoxError> {
        step(&self.journal, "start", &self.name, &self.behaviour.fail_start)
    }

    async fn close(&self) -> Result<(), BoxError> {
        step(&self.journal, "close", &self.name, &self.behaviour.fail_close)
    }
}

impl ControlApi for MockService {
    fn on_router_event(&self, event: RouterEvent) {
        self.journal.push(format!("event {} {:?}", self.name, event));
    }

    fn into_service(self: Arc<Self>) -> Arc<dyn Service> {
        self
    }
}

/// Script whose outcome is driven by its `command`: "ok" or "fail".
/// One-shot runs fail when their context is already cancelled.
pub struct MockScript {
    tag: String,
    mode: ScriptMode,
    keep: bool,
    fail: bool,
    journal: Journal,
}

impl MockScript {
    fn outcome(&self, action: &str) -> Result<(), BoxError> {
        self.journal.push(format!("{} script[{}]", action, self.tag));
        if self.fail {
            Err("exit status: 1".into())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl HookScript for MockScript {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn mode(&self) -> ScriptMode {
        self.mode
    }

    fn keep(&self) -> bool {
        self.keep
    }

    async fn start(&self) -> Result<(), BoxError> {
        self.outcome("start")
    }

    async fn close(&self) -> Result<(), BoxError> {
        self.journal.push(format!("stop script[{}]", self.tag));
        Ok(())
    }

    async fn run_once(&self, context: CancellationToken) -> Result<(), BoxError> {
        if context.is_cancelled() {
            self.journal.push(format!("cancelled script[{}]", self.tag));
            return Err("context cancelled".into());
        }
        self.outcome("run")
    }
}

/// Log factory that only records scopes and its own close.
pub struct MockLogFactory {
    journal: Journal,
    scopes: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl LogFactory for MockLogFactory {
    fn new_logger(&self, scope: &str) -> Logger {
        self.scopes.lock().unwrap().push(scope.to_string());
        Logger::new(scope)
    }

    async fn close(&self) -> Result<(), BoxError> {
        self.journal.push("close log factory");
        Ok(())
    }
}

pub struct MockPlatform {
    pub journal: Journal,
    pub fail: Option<String>,
}

#[async_trait]
impl PlatformInterface for MockPlatform {
    async fn initialize(
        &self,
        _context: &CancellationToken,
        _router: Arc<dyn Router>,
    ) -> Result<(), BoxError> {
        step(&self.journal, "initialize", "platform", &self.fail)
    }
}

/// Mock builders plus the recorded calls they report into.
pub struct Harness {
    pub journal: Journal,
    pub recorded: Arc<Mutex<Option<Initialized>>>,
    pub scopes: Arc<Mutex<Vec<String>>>,
    pub builders: Builders,
}

impl Harness {
    pub fn new() -> Self {
        let journal = Journal::default();
        let recorded = Arc::new(Mutex::new(None));
        let scopes = Arc::new(Mutex::new(Vec::new()));
        let mut builders = Builders::default();

        for kind in ["mock", "socks", "direct"] {
            let j = journal.clone();
            builders.register_outbound(kind, move |_ctx, spec| {
                Ok(Arc::new(MockOutbound {
                    tag: spec.tag.to_string(),
                    kind: spec.config.kind.clone(),
                    behaviour: Behaviour::from_options(&spec.config.options),
                    journal: j.clone(),
                }))
            });
            let j = journal.clone();
            builders.register_inbound(kind, move |_ctx, spec| {
                Ok(Arc::new(MockInbound {
                    tag: spec.tag.to_string(),
                    kind: spec.config.kind.clone(),
                    behaviour: Behaviour::from_options(&spec.config.options),
                    journal: j.clone(),
                }))
            });
        }

        let j = journal.clone();
        builders.register_provider("mock", move |_ctx, spec| {
            let options = &spec.config.options;
            let text = |key: &str| options.get(key).and_then(Value::as_str).map(String::from);
            Ok(Arc::new(MockProvider {
                tag: spec.tag.to_string(),
                count: options.get("count").and_then(Value::as_u64).unwrap_or(0) as usize,
                fail_update: text("fail_update"),
                fail_outbounds: text("fail_outbounds"),
                journal: j.clone(),
            }))
        });

        let (j, p) = (journal.clone(), recorded.clone());
        let builders = builders.with_router(move |options| {
            let route = &options.route.options;
            Ok(Arc::new(MockRouter {
                behaviour: Behaviour::from_options(route),
                default_calls: route.get("default_calls").and_then(Value::as_u64).unwrap_or(0),
                journal: j.clone(),
                recorded: p.clone(),
                events: Mutex::new(Vec::new()),
            }))
        });

        let (j, s) = (journal.clone(), scopes.clone());
        let builders = builders.with_log_factory(move |_options| {
            Ok(Arc::new(MockLogFactory {
                journal: j.clone(),
                scopes: s.clone(),
            }))
        });

        let j = journal.clone();
        let builders = builders.with_clash_api(move |_ctx, config| {
            let behaviour = Behaviour {
                fail_close: config.secret.clone().filter(|s| s.starts_with("fail")),
                ..Default::default()
            };
            Ok(MockService::with_behaviour("clash api", behaviour, &j) as Arc<dyn ControlApi>)
        });

        let j = journal.clone();
        let builders = builders.with_v2ray_api(move |_ctx, _config| {
            Ok(MockService::new("v2ray api", &j) as Arc<dyn ControlApi>)
        });

        let j = journal.clone();
        let builders = builders.with_script(move |_ctx, _logger, tag, config| {
            Ok(Arc::new(MockScript {
                tag: tag.to_string(),
                mode: config.mode,
                keep: config.keep,
                fail: config.command == "fail",
                journal: j.clone(),
            }))
        });

        Self {
            journal,
            recorded,
            scopes,
            builders,
        }
    }

    pub fn initialized(&self) -> Initialized {
        self.recorded.lock().unwrap().clone().unwrap_or_default()
    }

    pub fn scopes(&self) -> Vec<String> {
        self.scopes.lock().unwrap().clone()
    }
}

/// Config with logging disabled.
pub fn quiet_config() -> Config {
    Config {
        log: LogConfig {
            disabled: true,
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn adapter(kind: &str, tag: &str) -> AdapterConfig {
    AdapterConfig::new(kind, tag)
}

pub fn script(tag: &str, mode: ScriptMode, keep: bool, command: &str) -> ScriptConfig {
    ScriptConfig {
        tag: tag.into(),
        mode,
        keep,
        command: command.into(),
        args: Vec::new(),
        env: Default::default(),
        work_dir: None,
    }
}

/// A local address nothing is listening on right now.
pub fn free_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}
