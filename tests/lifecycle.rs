//! Startup, rollback and teardown of a box built from mock collaborators.

mod common;

use std::sync::Arc;

use proxy_box::config::{ClashApiConfig, ScriptMode, V2RayApiConfig};
use proxy_box::error::{CloseError, Component, DoubleFault, Phase};
use proxy_box::{Config, Options, ProxyBox};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use common::{adapter, quiet_config, script, Harness, MockService};

async fn build(harness: &Harness, config: Config) -> ProxyBox {
    let options = Options::new(config).with_builders(harness.builders.clone());
    ProxyBox::new(options).await.unwrap()
}

fn with_clash_api(mut config: Config, secret: Option<&str>) -> Config {
    config.experimental.clash_api = Some(ClashApiConfig {
        external_controller: "127.0.0.1:0".into(),
        secret: secret.map(String::from),
        ..Default::default()
    });
    config
}

#[tokio::test]
async fn test_built_in_direct_box_starts_and_closes() {
    let mut config = quiet_config();
    config.outbounds.push(adapter("direct", ""));
    let instance = ProxyBox::new(Options::new(config)).await.unwrap();

    instance.start().await.unwrap();
    instance.close().await.unwrap();
    assert!(instance.is_closed());
    assert!(matches!(
        instance.close().await,
        Err(CloseError::AlreadyClosed)
    ));
}

#[tokio::test]
async fn test_second_close_does_no_work() {
    let harness = Harness::new();
    let mut config = quiet_config();
    config.inbounds.push(adapter("mock", "in"));
    config.outbounds.push(adapter("mock", "out"));
    let instance = build(&harness, config).await;

    instance.start().await.unwrap();
    instance.close().await.unwrap();
    let after_first = harness.journal.entries();

    let err = instance.close().await.unwrap_err();
    assert!(matches!(err, CloseError::AlreadyClosed));
    assert_eq!(err.to_string(), "box already closed");
    assert_eq!(harness.journal.entries(), after_first);
}

#[tokio::test]
async fn test_outbound_start_failure_rolls_back() {
    let harness = Harness::new();
    let mut config = with_clash_api(quiet_config(), None);
    config.inbounds.push(adapter("mock", "in"));
    config
        .outbounds
        .push(adapter("mock", "").with_option("has_start", true));
    config
        .outbounds
        .push(adapter("mock", "").with_option("has_start", true));
    config.outbounds.push(
        adapter("socks", "")
            .with_option("has_start", true)
            .with_option("fail_start", "connection refused"),
    );
    config.outbounds.push(adapter("mock", "").with_option("has_start", true));
    config
        .script
        .push(script("keeper", ScriptMode::StartPre, true, "ok"));
    let instance = build(&harness, config).await;

    let err = instance.start().await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("outbound/socks[2]"), "{}", message);
    assert!(message.contains("connection refused"), "{}", message);
    assert_eq!(err.phase, Phase::PreStart);
    assert_eq!(
        err.component,
        Component::Outbound {
            kind: "socks".into(),
            tag: "2".into()
        }
    );

    let journal = &harness.journal;
    assert_eq!(journal.count("close outbound/mock[0]"), 1);
    assert_eq!(journal.count("close outbound/mock[1]"), 1);
    assert_eq!(journal.count("start outbound/mock[3]"), 0);
    assert_eq!(journal.count("pre-start clash api"), 1);
    assert_eq!(journal.count("close clash api"), 1);
    assert_eq!(journal.count("start script[keeper]"), 1);
    assert_eq!(journal.count("stop script[keeper]"), 1);
    assert_eq!(journal.count("start inbound/mock[in]"), 0);
    assert_eq!(journal.count("start router"), 0);
    assert!(instance.is_closed());
}

#[tokio::test]
async fn test_start_pre_script_failure_starts_nothing() {
    let harness = Harness::new();
    let mut config = quiet_config();
    config.inbounds.push(adapter("mock", "in"));
    config
        .outbounds
        .push(adapter("mock", "out").with_option("has_start", true));
    config
        .script
        .push(script("setup", ScriptMode::StartPre, false, "fail"));
    let instance = build(&harness, config).await;

    let err = instance.start().await.unwrap_err();
    assert_eq!(err.to_string(), "run script[setup]: exit status: 1");
    assert!(matches!(err.component, Component::Script { ref tag, .. } if tag == "setup"));
    assert!(harness.journal.with_prefix("start inbound").is_empty());
    assert!(harness.journal.with_prefix("start outbound").is_empty());
    assert!(matches!(
        instance.close().await,
        Err(CloseError::AlreadyClosed)
    ));
}

#[tokio::test]
async fn test_start_after_failed_pre_start_is_refused() {
    let harness = Harness::new();
    let mut config = quiet_config();
    config.inbounds.push(adapter("mock", "in"));
    config
        .script
        .push(script("setup", ScriptMode::StartPre, false, "fail"));
    let instance = build(&harness, config).await;

    let err = instance.pre_start().await.unwrap_err();
    assert_eq!(err.to_string(), "run script[setup]: exit status: 1");
    let before = harness.journal.entries();

    let err = instance.start().await.unwrap_err();
    assert_eq!(err.phase, Phase::Start);
    assert_eq!(err.component, Component::Instance);
    assert_eq!(err.to_string(), "box: already closed");
    assert_eq!(harness.journal.entries(), before);
    assert!(harness.journal.with_prefix("start inbound").is_empty());
}

#[tokio::test]
async fn test_phases_refused_after_close() {
    let harness = Harness::new();
    let mut config = quiet_config();
    config.inbounds.push(adapter("mock", "in"));
    config.outbounds.push(adapter("mock", "out"));
    let instance = build(&harness, config).await;

    instance.close().await.unwrap();
    let before = harness.journal.entries();

    let err = instance.pre_start().await.unwrap_err();
    assert_eq!(err.phase, Phase::PreStart);
    assert_eq!(err.component, Component::Instance);
    let err = instance.start().await.unwrap_err();
    assert_eq!(err.phase, Phase::Start);
    assert_eq!(harness.journal.entries(), before);
    assert_eq!(harness.journal.count("start inbound/mock[in]"), 0);
    assert_eq!(harness.journal.count("start router"), 0);
}

#[tokio::test]
async fn test_teardown_order() {
    let harness = Harness::new();
    let mut config = with_clash_api(quiet_config(), None);
    config.inbounds.push(adapter("mock", "in"));
    config.outbounds.push(adapter("mock", "out"));
    config
        .script
        .push(script("before", ScriptMode::ClosePre, false, "ok"));
    config
        .script
        .push(script("after", ScriptMode::ClosePost, false, "ok"));
    let post = MockService::new("post", &harness.journal);
    let options = Options::new(config)
        .with_builders(harness.builders.clone())
        .with_service("post", post);
    let instance = ProxyBox::new(options).await.unwrap();

    instance.start().await.unwrap();
    harness.journal.clear();
    instance.close().await.unwrap();

    let closing: Vec<String> = harness
        .journal
        .entries()
        .into_iter()
        .filter(|e| !e.starts_with("event"))
        .collect();
    assert_eq!(
        closing,
        vec![
            "run script[before]",
            "close post",
            "close inbound/mock[in]",
            "close outbound/mock[out]",
            "close router",
            "close clash api",
            "run script[after]",
            "close log factory",
        ]
    );
}

#[tokio::test]
async fn test_start_order() {
    let harness = Harness::new();
    let mut config = with_clash_api(quiet_config(), None);
    config.experimental.v2ray_api = Some(V2RayApiConfig {
        listen: "127.0.0.1:0".into(),
    });
    config.inbounds.push(adapter("mock", "in"));
    config
        .outbounds
        .push(adapter("mock", "out").with_option("has_start", true));
    config
        .script
        .push(script("first", ScriptMode::StartPre, false, "ok"));
    config
        .script
        .push(script("last", ScriptMode::StartPost, false, "ok"));
    let options = Options::new(config)
        .with_builders(harness.builders.clone())
        .with_service("post", MockService::new("post", &harness.journal));
    let instance = ProxyBox::new(options).await.unwrap();
    harness.journal.clear();

    instance.start().await.unwrap();

    let starting: Vec<String> = harness
        .journal
        .entries()
        .into_iter()
        .filter(|e| !e.starts_with("event"))
        .collect();
    assert_eq!(
        starting,
        vec![
            "run script[first]",
            "pre-start clash api",
            "pre-start v2ray api",
            "start outbound/mock[out]",
            "start router",
            "start clash api",
            "start v2ray api",
            "start inbound/mock[in]",
            "start post",
            "run script[last]",
        ]
    );
    let names: Vec<&str> = instance.pre_services().names().collect();
    assert_eq!(names, vec!["clash api", "v2ray api"]);
    instance.close().await.unwrap();
}

#[tokio::test]
async fn test_pre_start_runs_once() {
    let harness = Harness::new();
    let mut config = quiet_config();
    config
        .outbounds
        .push(adapter("mock", "out").with_option("has_start", true));
    let instance = build(&harness, config).await;

    instance.pre_start().await.unwrap();
    instance.start().await.unwrap();

    assert_eq!(harness.journal.count("start outbound/mock[out]"), 1);
    assert_eq!(harness.journal.count("start router"), 1);
    instance.close().await.unwrap();
}

#[tokio::test]
async fn test_close_aggregates_every_failure() {
    let harness = Harness::new();
    let mut config = quiet_config();
    config.route.options.insert("fail_close".into(), Value::from("router stuck"));
    config
        .inbounds
        .push(adapter("mock", "").with_option("fail_close", "listener busy"));
    config.outbounds.push(adapter("mock", "out"));
    let instance = build(&harness, config).await;
    instance.start().await.unwrap();

    let err = instance.close().await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("close inbound/mock[0]: listener busy"), "{}", message);
    assert!(message.contains("close router: router stuck"), "{}", message);

    let CloseError::Teardown(errors) = err else {
        panic!("expected teardown errors");
    };
    let labels: Vec<&str> = errors.errors().map(|(label, _)| label).collect();
    assert_eq!(labels, vec!["close inbound/mock[0]", "close router"]);
    // Later steps still ran.
    assert_eq!(harness.journal.count("close outbound/mock[out]"), 1);
    assert_eq!(harness.journal.count("close log factory"), 1);
}

#[tokio::test]
async fn test_rollback_discards_teardown_errors() {
    let harness = Harness::new();
    let mut config = with_clash_api(quiet_config(), Some("fail-on-close"));
    config.route.options.insert("fail_start".into(), Value::from("no rules"));
    let instance = build(&harness, config).await;

    let err = instance.start().await.unwrap_err();
    assert_eq!(err.to_string(), "start router: no rules");
    assert_eq!(harness.journal.count("close clash api"), 1);
}

#[tokio::test]
async fn test_close_post_script_runs_after_context_cancelled() {
    let harness = Harness::new();
    let mut config = quiet_config();
    config
        .script
        .push(script("before", ScriptMode::ClosePre, false, "ok"));
    config
        .script
        .push(script("after", ScriptMode::ClosePost, false, "ok"));
    let context = CancellationToken::new();
    let options = Options::new(config)
        .with_builders(harness.builders.clone())
        .with_context(context.clone());
    let instance = ProxyBox::new(options).await.unwrap();
    instance.start().await.unwrap();

    context.cancel();
    let err = instance.close().await.unwrap_err();

    assert_eq!(err.to_string(), "run script[before]: context cancelled");
    assert_eq!(harness.journal.count("cancelled script[before]"), 1);
    assert_eq!(harness.journal.count("run script[after]"), 1);
}

#[tokio::test]
async fn test_kept_scripts_started_and_stopped() {
    let harness = Harness::new();
    let mut config = quiet_config();
    config
        .script
        .push(script("daemon", ScriptMode::StartPost, true, "ok"));
    config
        .script
        .push(script("watcher", ScriptMode::ClosePre, true, "ok"));
    let instance = build(&harness, config).await;

    instance.start().await.unwrap();
    assert_eq!(harness.journal.count("start script[daemon]"), 1);
    assert_eq!(harness.journal.count("start script[watcher]"), 0);

    instance.close().await.unwrap();
    assert_eq!(harness.journal.count("stop script[daemon]"), 1);
    assert_eq!(harness.journal.count("stop script[watcher]"), 1);
}

#[tokio::test]
async fn test_concurrent_close_runs_teardown_once() {
    let harness = Harness::new();
    let mut config = quiet_config();
    config.outbounds.push(adapter("mock", "out"));
    let instance = Arc::new(build(&harness, config).await);
    instance.start().await.unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let instance = instance.clone();
            tokio::spawn(async move { instance.close().await })
        })
        .collect();
    let mut succeeded = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) => succeeded += 1,
            Err(CloseError::AlreadyClosed) => {}
            Err(e) => panic!("unexpected close error: {}", e),
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(harness.journal.count("close outbound/mock[out]"), 1);
    assert_eq!(harness.journal.count("close log factory"), 1);
    instance.closed().await;
}

#[tokio::test]
async fn test_panic_during_rollback_is_a_double_fault() {
    let harness = Harness::new();
    let mut config = quiet_config();
    config.route.options.insert("panic_close".into(), Value::from(true));
    config.outbounds.push(
        adapter("socks", "")
            .with_option("has_start", true)
            .with_option("fail_start", "connection refused"),
    );
    let instance = Arc::new(build(&harness, config).await);

    let task = {
        let instance = instance.clone();
        tokio::spawn(async move { instance.start().await })
    };
    let err = task.await.unwrap_err();
    assert!(err.is_panic());
    let payload = err.into_panic();
    let fault = payload
        .downcast_ref::<DoubleFault>()
        .expect("double fault payload");
    assert_eq!(fault.origin, "initialize outbound/socks[0]: connection refused");
    assert_eq!(fault.fault, "router close panicked");

    // The latch stays closed and waiters are released.
    assert!(instance.is_closed());
    instance.closed().await;
}
