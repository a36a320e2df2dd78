//! End-to-end coverage over the assembled gateway: a real `GatewaySettings`
//! parsed from YAML, wired through `build_app_state` exactly as `main.rs`
//! does, driven over HTTP via `sgateway_test::TestApp`.

use std::collections::HashMap;
use std::sync::Arc;

use sgateway::bootstrap::{build_app_state, BootstrapInputs};
use sgateway_cache::InMemoryStore;
use sgateway_core::config::{GatewayConfig, GatewaySettings};
use sgateway_data::InMemoryIdempotencyStore;
use sgateway_events::LocalBus;
use sgateway_ratelimit::InMemoryRateLimitBackend;
use sgateway_test::{TestApp, TestJwt, TestRequest};
use serde_json::json;

fn app_from_yaml(yaml: &str) -> TestApp {
    let config = GatewayConfig::from_yaml_str(yaml, "test").and_then(|c| c.with_typed::<GatewaySettings>()).unwrap();
    let settings: &GatewaySettings = config.typed();

    let bootstrapped = build_app_state(
        settings,
        BootstrapInputs {
            vendor_config: HashMap::new(),
            idempotency_store: Arc::new(InMemoryIdempotencyStore::new()),
            cache_store: Arc::new(InMemoryStore::new()),
            rate_limit_backend: Arc::new(InMemoryRateLimitBackend::new()),
            bus: None,
            domains_bus: Arc::new(LocalBus::new()),
        },
    );

    let state = Arc::try_unwrap(bootstrapped.state).unwrap_or_else(|_| panic!("AppState has more than one owner"));
    TestApp::new(state)
}

const LOCAL_YAML: &str = "internal_gateway_key: test-secret\ndb_config: postgres://localhost/gw\nredis_config: redis://localhost\nis_local: true\n";

fn send_email_body() -> serde_json::Value {
    json!({"to": "dest@example.com", "subject": "hi", "body_plain_text": "hello"})
}

#[tokio::test]
async fn catalog_lists_every_installed_service() {
    let app = app_from_yaml(LOCAL_YAML);
    let response = app.get("/services/_schema").await.assert_ok();
    let services: Vec<String> = response
        .json::<serde_json::Value>()
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap().to_string())
        .collect();
    for name in ["email", "sms", "currency_exchange", "domains"] {
        assert!(services.contains(&name.to_string()), "catalog is missing `{name}`: {services:?}");
    }
}

#[tokio::test]
async fn installed_services_narrows_the_registry() {
    let yaml = "internal_gateway_key: k\ndb_config: d\nredis_config: r\nis_local: true\ninstalled_services:\n  - email\n";
    let app = app_from_yaml(yaml);
    app.post_json("/email/v1/send", &send_email_body()).await.assert_ok();
    app.get("/sms/v1/send").await.assert_not_found();
}

#[tokio::test]
async fn unauthenticated_call_is_rejected_outside_local_mode() {
    let yaml = "internal_gateway_key: k\ndb_config: d\nredis_config: r\nis_local: false\n";
    let app = app_from_yaml(yaml);
    app.post_json("/email/v1/send", &send_email_body()).await.assert_unauthorized();
}

#[tokio::test]
async fn a_real_bearer_token_authenticates_outside_local_mode() {
    let yaml = "internal_gateway_key: shared-secret\ndb_config: d\nredis_config: r\nis_local: false\n";
    let app = app_from_yaml(yaml);
    let token = TestJwt::new("shared-secret").token(42);
    app.post_json_authenticated("/email/v1/send", &send_email_body(), &token).await.assert_ok();
}

#[tokio::test]
async fn is_local_skips_auth_and_runs_the_call() {
    let app = app_from_yaml(LOCAL_YAML);
    let response = app.post_json("/email/v1/send", &send_email_body()).await.assert_ok();
    assert_eq!(response.at("sent"), json!(true));
}

#[tokio::test]
async fn a_reused_idempotency_key_is_rejected_on_the_second_call() {
    let app = app_from_yaml(LOCAL_YAML);
    let request = || TestRequest::post("/email/v1/send").header("X-Idempotency-Key", "dup-1").json(&send_email_body());

    app.send(request()).await.assert_ok();
    app.send(request()).await.assert_bad_request();
}

#[tokio::test]
async fn distinct_idempotency_keys_both_succeed() {
    let app = app_from_yaml(LOCAL_YAML);
    app.send(TestRequest::post("/email/v1/send").header("X-Idempotency-Key", "a").json(&send_email_body())).await.assert_ok();
    app.send(TestRequest::post("/email/v1/send").header("X-Idempotency-Key", "b").json(&send_email_body())).await.assert_ok();
}

#[tokio::test]
async fn total_quota_exhaustion_returns_too_many_requests() {
    let yaml = format!("{LOCAL_YAML}rate_limits:\n  total_per_hour: 1\n");
    let app = app_from_yaml(&yaml);

    let first = app.post_json("/email/v1/send", &send_email_body()).await.assert_ok();
    assert_eq!(first.header("X-Total-Quota"), Some("0"));

    app.post_json("/email/v1/send", &send_email_body())
        .await
        .assert_status(axum::http::StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn per_service_quota_is_independent_of_the_total_quota() {
    let yaml = format!("{LOCAL_YAML}rate_limits:\n  total_per_hour: 100\n  per_service:\n    email: 1\n");
    let app = app_from_yaml(&yaml);

    app.post_json("/email/v1/send", &send_email_body()).await.assert_ok();
    app.post_json("/email/v1/send", &send_email_body())
        .await
        .assert_status(axum::http::StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn priced_calls_carry_a_request_cost_header() {
    let yaml = format!("{LOCAL_YAML}price_list:\n  email:\n    send: 0.05\n");
    let app = app_from_yaml(&yaml);

    let response = app.post_json("/email/v1/send", &send_email_body()).await.assert_ok();
    assert_eq!(response.header("X-Request-Cost"), Some("0.05"));
    assert_eq!(response.header("X-Request-Cost-Currency"), Some("USD"));
}

#[tokio::test]
async fn unpriced_calls_carry_no_cost_header() {
    let app = app_from_yaml(LOCAL_YAML);
    let response = app.post_json("/email/v1/send", &send_email_body()).await.assert_ok();
    assert_eq!(response.header("X-Request-Cost"), None);
}

#[tokio::test]
async fn currency_rates_are_cacheable_get_responses() {
    let app = app_from_yaml(LOCAL_YAML);
    let first = app.get("/currency_exchange/v1/rates").await.assert_ok();
    let second = app.get("/currency_exchange/v1/rates").await.assert_ok();
    assert_eq!(first.json::<serde_json::Value>(), second.json::<serde_json::Value>());
}

#[tokio::test]
async fn no_route_matches_is_a_404() {
    let app = app_from_yaml(LOCAL_YAML);
    app.get("/not_a_service/v1/whatever").await.assert_not_found();
}
