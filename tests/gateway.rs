//! End-to-end dispatch tests: routing, rate limits, headers, envelopes.

use axum::http::StatusCode;
use edge_gateway::config::RouteRateLimit;
use serde_json::Value;

mod common;

use common::{base_config, reply, route, service, start_gateway, start_mock_backend, start_programmable_backend};

#[tokio::test]
async fn test_method_mismatch_is_404_and_post_matches() {
    let auth = start_mock_backend(r#"{"success":true}"#).await;

    let mut config = base_config();
    config.services.push(service("auth", &auth.base_url()));
    let mut login = route("/v1/auth/login", "auth");
    login.methods = Some(vec!["POST".into()]);
    config.routes.push(login);

    let gateway = start_gateway(config).await;
    let client = common::client();

    let res = client.get(gateway.url("/v1/auth/login")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert_eq!(auth.hits(), 0);

    let res = client.post(gateway.url("/v1/auth/login")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(auth.hits(), 1);
    assert_eq!(auth.last().unwrap().method, "POST");
}

#[tokio::test]
async fn test_sixth_rapid_post_is_rate_limited() {
    let auth = start_mock_backend(r#"{"success":true}"#).await;

    let mut config = base_config();
    config.services.push(service("auth", &auth.base_url()));
    let mut login = route("/v1/auth/login", "auth");
    login.methods = Some(vec!["POST".into()]);
    login.rate_limit = Some(RouteRateLimit {
        limit: 5,
        window_ms: 60_000,
    });
    config.routes.push(login);

    let gateway = start_gateway(config).await;
    let client = common::client();

    for i in 0..5 {
        let res = client.post(gateway.url("/v1/auth/login")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK, "request {i}");
        assert_eq!(res.headers()["x-rate-limit-limit"], "5");
        let remaining: u32 = res.headers()["x-rate-limit-remaining"].to_str().unwrap().parse().unwrap();
        assert_eq!(remaining, 4 - i);
    }

    let res = client.post(gateway.url("/v1/auth/login")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = res.headers()["retry-after"].to_str().unwrap().parse().unwrap();
    assert!((58..=60).contains(&retry_after), "retry-after {retry_after}");
    assert!(res.headers().contains_key("x-rate-limit-reset"));
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], "RATE_LIMITED");
    assert_eq!(body["error"]["details"]["retryAfter"], retry_after);

    assert_eq!(auth.hits(), 5);
}

#[tokio::test]
async fn test_rewrite_query_and_curated_headers() {
    let feed = start_mock_backend(r#"{"success":true,"data":[]}"#).await;

    let mut config = base_config();
    config.services.push(service("feed", &format!("{}/internal", feed.base_url())));
    let mut posts = route("/v1/users/:id/posts", "feed");
    posts.rewrite = Some("/posts/by-user/:id".into());
    config.routes.push(posts);
    config.auth.tokens.insert("tok-42".into(), "user-42".into());

    let gateway = start_gateway(config).await;
    let res = common::client()
        .get(gateway.url("/v1/users/7/posts?page=2"))
        .header("authorization", "Bearer tok-42")
        .header("x-user-id", "spoofed")
        .header("x-device-id", "device-1")
        .header("x-platform", "ios")
        .header("accept-language", "fi")
        .header("cookie", "session=abc")
        .header("x-request-id", "req-abc")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-request-id"], "req-abc");

    let seen = feed.last().unwrap();
    assert_eq!(seen.target, "/internal/posts/by-user/7?page=2");
    assert_eq!(seen.header("x-user-id"), Some("user-42"));
    assert_eq!(seen.header("x-device-id"), Some("device-1"));
    assert_eq!(seen.header("x-platform"), Some("ios"));
    assert_eq!(seen.header("accept-language"), Some("fi"));
    assert_eq!(seen.header("x-request-id"), Some("req-abc"));
    assert_eq!(seen.header("authorization"), None);
    assert_eq!(seen.header("cookie"), None);
}

#[tokio::test]
async fn test_request_id_generated_when_absent() {
    let feed = start_mock_backend("{}").await;
    let mut config = base_config();
    config.services.push(service("feed", &feed.base_url()));
    config.routes.push(route("/v1/feed/*", "feed"));

    let gateway = start_gateway(config).await;
    let res = common::client().get(gateway.url("/v1/feed")).send().await.unwrap();

    let id = res.headers()["x-request-id"].to_str().unwrap().to_string();
    assert!(!id.is_empty());
    assert_eq!(feed.last().unwrap().header("x-request-id"), Some(id.as_str()));
}

#[tokio::test]
async fn test_downstream_envelope_passes_through() {
    let envelope = r#"{"success":false,"error":{"code":"USERNAME_TAKEN","message":"Username already exists"}}"#;
    let auth = start_programmable_backend(move |_| async move { reply(409, envelope) }).await;

    let mut config = base_config();
    config.services.push(service("auth", &auth.base_url()));
    config.routes.push(route("/v1/auth/*", "auth"));

    let gateway = start_gateway(config).await;
    let res = common::client()
        .post(gateway.url("/v1/auth/register"))
        .body(r#"{"username":"taken"}"#)
        .header("content-type", "application/json")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(res.text().await.unwrap(), envelope);
    let seen = auth.last().unwrap();
    assert_eq!(seen.body, br#"{"username":"taken"}"#);
    assert_eq!(seen.header("content-type"), Some("application/json"));
    // 4xx is not retried.
    assert_eq!(auth.hits(), 1);
}

#[tokio::test]
async fn test_disabled_service_and_protected_route() {
    let media = start_mock_backend("{}").await;

    let mut config = base_config();
    let mut disabled = service("media", &media.base_url());
    disabled.enabled = false;
    config.services.push(disabled);
    config.services.push(service("account", &media.base_url()));
    config.routes.push(route("/v1/media/*", "media"));
    let mut me = route("/v1/me", "account");
    me.requires_auth = true;
    config.routes.push(me);

    let gateway = start_gateway(config).await;
    let client = common::client();

    let res = client.get(gateway.url("/v1/media/a.png")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], "SERVICE_DISABLED");

    let res = client.get(gateway.url("/v1/me")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(media.hits(), 0);
}

#[tokio::test]
async fn test_liveness_endpoint() {
    let gateway = start_gateway(base_config()).await;
    let res = common::client().get(gateway.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["status"], "ok");
}
