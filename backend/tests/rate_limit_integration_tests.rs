use axum::{http::StatusCode, routing::post, Router};
use std::{net::SocketAddr, time::Duration};
use tokio::net::TcpListener;

use gatekeeper_backend::{config::Config, middleware::rate_limit::create_auth_rate_limiter};

mod support;

use support::TestApp;

fn limited_config(max_requests: u32, window_seconds: u64) -> Config {
    Config::from_lookup(move |key| match key {
        "JWT_SECRET" => Some("test-jwt-secret-32-chars-minimum!".into()),
        "RATE_LIMIT_ENABLED" => Some("true".into()),
        "RATE_LIMIT_AUTH_MAX_REQUESTS" => Some(max_requests.to_string()),
        "RATE_LIMIT_AUTH_WINDOW_SECONDS" => Some(window_seconds.to_string()),
        _ => None,
    })
}

async fn serve(app: Router) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );
    let handle = tokio::spawn(async move {
        server.await.expect("server should run");
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    (addr, handle)
}

async fn spawn_rate_limited_app(config: Config) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let limiter = create_auth_rate_limiter(&config).expect("limiter enabled");
    let app = Router::new()
        .route("/login", post(|| async { StatusCode::OK }))
        .route_layer(limiter);
    serve(app).await
}

#[tokio::test]
async fn rate_limit_blocks_after_burst() {
    let (addr, handle) = spawn_rate_limited_app(limited_config(2, 2)).await;

    let client = reqwest::Client::new();
    let url = format!("http://{}/login", addr);

    for _ in 0..2 {
        let resp = client.post(&url).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let resp = client.post(&url).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

    handle.abort();
}

#[tokio::test]
async fn rate_limit_response_is_an_envelope_with_headers() {
    let (addr, handle) = spawn_rate_limited_app(limited_config(1, 2)).await;

    let client = reqwest::Client::new();
    let url = format!("http://{}/login", addr);

    let _ = client.post(&url).send().await.unwrap();
    let resp = client.post(&url).send().await.unwrap();

    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(resp.headers().contains_key("x-ratelimit-limit"));
    assert!(resp.headers().contains_key("x-ratelimit-remaining"));
    assert!(resp.headers().contains_key("x-ratelimit-after"));
    assert!(resp.headers().contains_key("retry-after"));

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], 429);
    assert_eq!(body["status"], "Failed");
    assert_eq!(body["title"], "Too many requests");

    handle.abort();
}

#[tokio::test]
async fn disabled_rate_limit_builds_no_layer() {
    assert!(create_auth_rate_limiter(&support::test_config()).is_none());
}

#[tokio::test]
async fn login_route_is_limited_but_health_is_not() {
    let app = TestApp::with_config(limited_config(2, 60));
    let (addr, handle) = serve(app.router()).await;

    let client = reqwest::Client::new();
    let login = format!("http://{}/api/secure-auth/v1/login", addr);
    let body = serde_json::json!({"username": "nobody", "password": "wrong"});

    for _ in 0..2 {
        let resp = client.post(&login).json(&body).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
    let resp = client.post(&login).json(&body).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

    for _ in 0..5 {
        let resp = client
            .get(format!("http://{}/v1", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let ledger = app.store.snapshot().await;
    assert_eq!(ledger.login_attempts.len(), 2, "limited requests never reach the store");

    handle.abort();
}

#[tokio::test]
async fn secure_auth_routes_share_one_quota() {
    let app = TestApp::with_config(limited_config(2, 60));
    let (addr, handle) = serve(app.router()).await;

    let client = reqwest::Client::new();
    for _ in 0..2 {
        let resp = client
            .post(format!("http://{}/api/secure-auth/v1/logout", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let resp = client
        .post(format!("http://{}/api/secure-auth/v1/change-password", addr))
        .json(&serde_json::json!({"userId": 2, "newPassword": "Whatever1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

    let resp = client
        .post(format!("http://{}/api/secure-auth/v1/login", addr))
        .json(&serde_json::json!({"username": "nobody", "password": "wrong"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(app.store.snapshot().await.login_attempts.is_empty());

    handle.abort();
}
