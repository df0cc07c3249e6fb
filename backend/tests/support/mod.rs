#![allow(dead_code)]
use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use gatekeeper_backend::{
    config::Config,
    models::{
        auth::{LoginOutcome, LoginRequest},
        permission::Actor,
        security::ClientInfo,
        user::User,
    },
    repositories::MemoryStore,
    routes::{build_router, permission_registry},
    services::password_policy::ConfiguredPasswordPolicy,
    state::AppState,
    types::{BranchId, RoleId, UserId},
    utils::password::hash_password,
};
use serde_json::Value;
use tower::ServiceExt;

pub mod postgres;

pub const PASSWORD: &str = "Str0ngPassw0rd";
pub const CLIENT_IP: &str = "198.51.100.7";
pub const ADMIN_ROLE: RoleId = RoleId(1);
pub const STAFF_ROLE: RoleId = RoleId(2);

pub fn test_config() -> Config {
    Config::from_lookup(|key| match key {
        "JWT_SECRET" => Some("a_secure_token_that_is_long_enough_123".into()),
        "RATE_LIMIT_ENABLED" => Some("false".into()),
        _ => None,
    })
}

pub fn client() -> ClientInfo {
    ClientInfo::new(CLIENT_IP, Some("integration-test".to_string()))
}

pub struct TestApp {
    pub store: MemoryStore,
    pub state: AppState,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let store = MemoryStore::new();
        let policy = Arc::new(ConfiguredPasswordPolicy::from_config(&config));
        let registry = permission_registry().expect("build permission registry");
        let state = AppState::new(Arc::new(store.clone()), config, registry, policy);
        Self { store, state }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Seeds an enabled user whose password is [`PASSWORD`].
    pub async fn seed_user(&self, id: i32, username: &str, role: RoleId) -> User {
        let hash = hash_password(PASSWORD).expect("hash password");
        let user = User::new(UserId(id), username, hash, role, BranchId(1));
        self.store.insert_user(user.clone()).await;
        user
    }

    pub async fn login(&self, username: &str) -> LoginOutcome {
        self.state
            .auth_service()
            .login(
                &LoginRequest {
                    username: username.to_string(),
                    password: PASSWORD.to_string(),
                    branch_name: None,
                },
                &client(),
            )
            .await
            .expect("login should succeed")
    }

    pub async fn grant(&self, role: RoleId, path: &str) {
        let actor = Actor {
            user_id: UserId(1),
            branch_id: BranchId(1),
            session_id: gatekeeper_backend::types::SessionId(1),
            role_id: ADMIN_ROLE,
        };
        let mut paths = self
            .state
            .permission_service()
            .role_permissions(role)
            .await
            .expect("read role permissions");
        paths.push(path.to_string());
        self.state
            .permission_service()
            .save(&actor, role, &paths, &client())
            .await
            .expect("grant permission");
    }
}

pub fn json_request(method: Method, uri: &str, body: Value, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", CLIENT_IP);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("build request")
}

pub fn get_request(uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).expect("build request")
}

pub async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.expect("call router");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}
