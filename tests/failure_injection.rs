//! Failure injection: retries, breaker trips, probes.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use serde_json::Value;

mod common;

use common::{base_config, closed_port, reply, route, service, start_gateway, start_programmable_backend, start_programmable_backend_at};

#[tokio::test]
async fn test_retry_on_failure() {
    let call_count = Arc::new(AtomicU32::new(0));
    let cc = call_count.clone();
    let backend = start_programmable_backend(move |_| {
        let cc = cc.clone();
        async move {
            if cc.fetch_add(1, Ordering::SeqCst) < 2 {
                reply(503, "")
            } else {
                reply(200, r#"{"success":true}"#)
            }
        }
    })
    .await;

    let mut config = base_config();
    config.retries.max_attempts = 3;
    config.services.push(service("feed", &backend.base_url()));
    config.routes.push(route("/v1/feed/*", "feed"));

    let gateway = start_gateway(config).await;
    let res = common::client().get(gateway.url("/v1/feed/posts")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::OK, "Should eventually succeed after retries");
    assert_eq!(call_count.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_persistent_500_exhausts_attempts() {
    let backend = start_programmable_backend(|_| async { reply(500, "oops") }).await;

    let mut config = base_config();
    config.retries.max_attempts = 3;
    config.services.push(service("feed", &backend.base_url()));
    config.routes.push(route("/v1/feed/*", "feed"));

    let gateway = start_gateway(config).await;
    let res = common::client().get(gateway.url("/v1/feed")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
    assert_eq!(backend.hits(), 3);
}

#[tokio::test]
async fn test_refused_connections_trip_breaker_then_single_probe() {
    let addr = closed_port().await;

    let mut config = base_config();
    config.retries.max_attempts = 1;
    config.circuit_breaker.failure_threshold = 3;
    config.circuit_breaker.reset_timeout_ms = 500;
    config.services.push(service("feed", &format!("http://{addr}")));
    config.routes.push(route("/v1/feed/*", "feed"));

    let gateway = start_gateway(config).await;
    let client = common::client();

    for i in 0..3 {
        let res = client.get(gateway.url("/v1/feed")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE, "call {i}");
        let body: Value = res.json().await.unwrap();
        assert!(body["error"]["message"].as_str().unwrap().contains("unreachable"));
    }

    tokio::time::sleep(Duration::from_millis(1)).await;
    let res = client.get(gateway.url("/v1/feed")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(!res.headers().contains_key("retry-after"));
    let body: Value = res.json().await.unwrap();
    assert!(body["error"]["message"].as_str().unwrap().contains("temporarily unavailable"));
    assert_eq!(body["error"]["details"]["retryAfter"], 1);

    // Service comes back on the same address.
    let backend = start_programmable_backend_at(addr, |_| async { reply(200, "{}") }).await;
    tokio::time::sleep(Duration::from_millis(600)).await;

    let res = client.get(gateway.url("/v1/feed")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(backend.hits(), 1);

    // Closed again: traffic flows normally.
    let res = client.get(gateway.url("/v1/feed")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(backend.hits(), 2);
}

#[tokio::test]
async fn test_slow_downstream_times_out() {
    let backend = start_programmable_backend(|_| async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        reply(200, "{}")
    })
    .await;

    let mut config = base_config();
    config.retries.max_attempts = 2;
    let mut feed = service("feed", &backend.base_url());
    feed.timeout_ms = 100;
    config.services.push(feed);
    config.routes.push(route("/v1/feed/*", "feed"));

    let gateway = start_gateway(config).await;
    let res = common::client().get(gateway.url("/v1/feed")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    assert!(!res.headers().contains_key("retry-after"));
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], "GATEWAY_TIMEOUT");
    assert!(body["error"]["details"]["retryAfter"].as_u64().unwrap() >= 1);
    assert_eq!(backend.hits(), 2);
}

#[tokio::test]
async fn test_request_budget_expiry_is_enveloped_and_trips_breaker() {
    let backend = start_programmable_backend(|_| async {
        tokio::time::sleep(Duration::from_millis(600)).await;
        reply(500, "slow failure")
    })
    .await;

    let mut config = base_config();
    config.timeouts.request_secs = 1;
    config.retries.max_attempts = 3;
    config.circuit_breaker.failure_threshold = 1;
    let mut feed = service("feed", &backend.base_url());
    feed.timeout_ms = 900;
    config.services.push(feed);
    config.routes.push(route("/v1/feed/*", "feed"));

    let gateway = start_gateway(config).await;
    let client = common::client();

    let res = client.get(gateway.url("/v1/feed")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(res.headers()["content-type"], "application/json");
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "GATEWAY_TIMEOUT");
    assert!(body["error"]["details"]["retryAfter"].as_u64().unwrap() >= 1);
    assert_eq!(backend.hits(), 2);

    // The expired request counted as a failure and opened the circuit.
    let res = client.get(gateway.url("/v1/feed")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = res.json().await.unwrap();
    assert!(body["error"]["message"].as_str().unwrap().contains("temporarily unavailable"));
    assert_eq!(backend.hits(), 2);
}

#[tokio::test]
async fn test_exhausted_503_carries_retry_hint() {
    let backend = start_programmable_backend(|_| async { reply(503, "<html>down</html>") }).await;

    let mut config = base_config();
    config.retries.max_attempts = 2;
    config.services.push(service("feed", &backend.base_url()));
    config.routes.push(route("/v1/feed/*", "feed"));

    let gateway = start_gateway(config).await;
    let res = common::client().get(gateway.url("/v1/feed")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(!res.headers().contains_key("retry-after"));
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
    assert_eq!(body["error"]["details"]["retryAfter"], 1);
    assert_eq!(backend.hits(), 2);
}
