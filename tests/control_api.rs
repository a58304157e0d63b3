//! Built-in control APIs served by a running box.

mod common;

use proxy_box::config::{ClashApiConfig, V2RayApiConfig};
use proxy_box::{Options, ProxyBox};
use serde_json::Value;

use common::{adapter, free_addr, quiet_config};

#[tokio::test]
async fn test_clash_api_serves_box_state() {
    let addr = free_addr();
    let mut config = quiet_config();
    config.outbounds.push(adapter("direct", "out"));
    config.outbounds.push(adapter("block", "deny"));
    config.experimental.clash_api = Some(ClashApiConfig {
        external_controller: addr.to_string(),
        secret: Some("s3cret".into()),
        ..Default::default()
    });
    let instance = ProxyBox::new(Options::new(config)).await.unwrap();
    assert!(instance.pre_services().contains("clash api"));
    instance.start().await.unwrap();

    let client = reqwest::Client::new();
    let base = format!("http://{}", addr);

    let res = client.get(format!("{}/version", base)).send().await.unwrap();
    assert_eq!(res.status(), 401);

    let res = client
        .get(format!("{}/version", base))
        .bearer_auth("s3cret")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

    let body: Value = client
        .get(format!("{}/proxies", base))
        .bearer_auth("s3cret")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["proxies"]["out"]["type"], "direct");
    assert_eq!(body["proxies"]["deny"]["type"], "block");
    assert_eq!(body["default"], "out");

    let events: Value = client
        .get(format!("{}/events", base))
        .bearer_auth("s3cret")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(events, serde_json::json!(["started"]));

    instance.close().await.unwrap();
    assert!(client.get(format!("{}/version", base)).send().await.is_err());
}

#[tokio::test]
async fn test_clash_api_port_conflict_fails_pre_start() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let mut config = quiet_config();
    config.outbounds.push(adapter("direct", "out"));
    config.experimental.clash_api = Some(ClashApiConfig {
        external_controller: taken.local_addr().unwrap().to_string(),
        ..Default::default()
    });
    let instance = ProxyBox::new(Options::new(config)).await.unwrap();

    let err = instance.pre_start().await.unwrap_err();
    assert!(err.to_string().starts_with("pre-start clash api: listen"), "{}", err);
    assert!(instance.is_closed());
}

#[tokio::test]
async fn test_v2ray_api_serves_metrics() {
    let addr = free_addr();
    let mut config = quiet_config();
    config.outbounds.push(adapter("direct", "out"));
    config.experimental.v2ray_api = Some(V2RayApiConfig {
        listen: addr.to_string(),
    });
    let instance = ProxyBox::new(Options::new(config)).await.unwrap();
    instance.start().await.unwrap();

    let res = reqwest::get(format!("http://{}/stats", addr)).await.unwrap();
    assert_eq!(res.status(), 200);
    let body = res.text().await.unwrap();
    assert!(body.contains("box_phase_duration_seconds"), "{}", body);

    instance.close().await.unwrap();
}
