use std::sync::{Arc, OnceLock};

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use gatekeeper_backend::{
    db::connection::DbPool,
    models::{
        auth::LoginRequest, permission::Actor, token::BlacklistedToken, user::PasswordUpdate,
    },
    repositories::{CredentialStore, PgSecurityStore, SecurityStore, TokenStore, UnitOfWork},
    routes::permission_registry,
    services::password_policy::ConfiguredPasswordPolicy,
    state::AppState,
    types::{BranchId, RoleId, SessionId, UserId},
    utils::password::hash_password,
};
use tokio::sync::Mutex;

mod support;

use support::{client, postgres, test_config, CLIENT_IP, PASSWORD, STAFF_ROLE};

async fn integration_guard() -> tokio::sync::MutexGuard<'static, ()> {
    static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
    GUARD.get_or_init(|| Mutex::new(())).lock().await
}

/// Migrated database with an empty ledger, the root admin and role 2.
async fn test_pool() -> DbPool {
    let pool = postgres::connect().await;
    sqlx::migrate!("./migrations")
        .run(&*pool)
        .await
        .expect("run migrations");
    sqlx::query(
        "TRUNCATE login_attempts, account_lockouts, security_events, refresh_tokens, \
         blacklisted_tokens, sessions, user_role_permissions, user_role_permission_history, \
         ip_blacklist, ip_whitelist RESTART IDENTITY CASCADE",
    )
    .execute(&*pool)
    .await
    .expect("truncate ledger tables");
    sqlx::query("DELETE FROM users WHERE id <> 1")
        .execute(&*pool)
        .await
        .expect("reset users");
    sqlx::query("INSERT INTO roles (id, name) VALUES (2, 'Staff') ON CONFLICT (id) DO NOTHING")
        .execute(&*pool)
        .await
        .expect("seed staff role");
    pool
}

async fn seed_staff(pool: &DbPool, id: i32, username: &str) {
    sqlx::query(
        "INSERT INTO users (id, username, password_hash, role_id, branch_id) \
         VALUES ($1, $2, $3, 2, 1)",
    )
    .bind(id)
    .bind(username)
    .bind(hash_password(PASSWORD).expect("hash"))
    .execute(&**pool)
    .await
    .expect("seed user");
}

fn state(pool: &DbPool) -> AppState {
    let config = test_config();
    let policy = Arc::new(ConfiguredPasswordPolicy::from_config(&config));
    AppState::new(
        Arc::new(PgSecurityStore::new(pool.clone())),
        config,
        permission_registry().expect("registry"),
        policy,
    )
}

fn root_actor() -> Actor {
    Actor {
        user_id: UserId(1),
        branch_id: BranchId(1),
        session_id: SessionId(1),
        role_id: RoleId(1),
    }
}

#[tokio::test]
async fn permission_save_archives_removed_grants_in_postgres() {
    let _guard = integration_guard().await;
    let pool = test_pool().await;
    let service = state(&pool).permission_service();
    let first = vec![
        "/api/permissions/v1".to_string(),
        "/api/user/v1/lock".to_string(),
    ];
    let second = vec!["/api/user/v1/lock".to_string()];

    service
        .save(&root_actor(), STAFF_ROLE, &first, &client())
        .await
        .expect("first save");
    let summary = service
        .save(&root_actor(), STAFF_ROLE, &second, &client())
        .await
        .expect("second save");
    assert_eq!(summary.removed, vec!["/api/permissions/v1".to_string()]);

    assert_eq!(service.role_permissions(STAFF_ROLE).await.unwrap(), second);
    let archived: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM user_role_permission_history WHERE role_level_id = 2",
    )
    .fetch_one(&*pool)
    .await
    .unwrap();
    assert_eq!(archived, 1);
}

#[tokio::test]
async fn login_and_refresh_round_trip_in_postgres() {
    let _guard = integration_guard().await;
    let pool = test_pool().await;
    seed_staff(&pool, 2, "alice").await;
    let auth = state(&pool).auth_service();

    let outcome = auth
        .login(
            &LoginRequest {
                username: "alice".to_string(),
                password: PASSWORD.to_string(),
                branch_name: None,
            },
            &client(),
        )
        .await
        .expect("login");
    let rotated = auth
        .refresh_token(&outcome.refresh_token, &client())
        .await
        .expect("refresh");
    assert!(auth
        .refresh_token(&outcome.refresh_token, &client())
        .await
        .is_err());

    auth.logout(
        Some(outcome.access_token.as_str()),
        Some(rotated.refresh_token.as_str()),
        &client(),
    )
    .await;

    let open: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions WHERE end_time IS NULL")
        .fetch_one(&*pool)
        .await
        .unwrap();
    assert_eq!(open, 0);
    let blacklisted: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blacklisted_tokens")
        .fetch_one(&*pool)
        .await
        .unwrap();
    assert_eq!(blacklisted, 1);
}

#[tokio::test]
async fn repeated_failures_lock_the_account_in_postgres() {
    let _guard = integration_guard().await;
    let pool = test_pool().await;
    seed_staff(&pool, 2, "alice").await;
    let app = state(&pool);
    let auth = app.auth_service();

    for _ in 0..app.config.login_failure_threshold {
        let _ = auth
            .login(
                &LoginRequest {
                    username: "alice".to_string(),
                    password: "wrong-password".to_string(),
                    branch_name: None,
                },
                &client(),
            )
            .await;
    }

    let active: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM account_lockouts WHERE username = 'alice' AND is_active",
    )
    .fetch_one(&*pool)
    .await
    .unwrap();
    assert_eq!(active, 1);
}

#[tokio::test]
async fn stale_user_version_is_not_written_in_postgres() {
    let _guard = integration_guard().await;
    let pool = test_pool().await;
    seed_staff(&pool, 2, "alice").await;
    let store = PgSecurityStore::new(pool.clone());

    let mut tx = store.begin().await.unwrap();
    let user = tx.find_user_by_id(UserId(2)).await.unwrap().expect("seeded user");
    let update = PasswordUpdate {
        password_hash: hash_password("An0therGoodOne").unwrap(),
        must_change_password: false,
        change_password_required_before: None,
    };
    assert!(!tx
        .update_password(user.id, user.version + 1, &update)
        .await
        .unwrap());
    assert!(tx.update_password(user.id, user.version, &update).await.unwrap());
    assert!(!tx.update_password(user.id, user.version, &update).await.unwrap());
    tx.commit().await.unwrap();

    let version: i32 = sqlx::query_scalar("SELECT version FROM users WHERE id = 2")
        .fetch_one(&*pool)
        .await
        .unwrap();
    assert_eq!(version, user.version + 1);
}

#[tokio::test]
async fn blacklisting_the_same_jti_twice_keeps_one_row() {
    let _guard = integration_guard().await;
    let pool = test_pool().await;
    let store = PgSecurityStore::new(pool.clone());
    let now = Utc::now();
    let entry = BlacklistedToken {
        jti: "jti-twice".to_string(),
        expires_at: now + Duration::minutes(5),
        blacklisted_at: now,
        reason: Some("Logout".to_string()),
    };

    let mut tx = store.begin().await.unwrap();
    tx.blacklist_token(&entry).await.unwrap();
    tx.blacklist_token(&entry).await.unwrap();
    assert!(tx.is_token_blacklisted("jti-twice").await.unwrap());
    tx.commit().await.unwrap();

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blacklisted_tokens")
        .fetch_one(&*pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn concurrent_failures_crossing_the_threshold_share_one_lockout() {
    let _guard = integration_guard().await;
    let pool = test_pool().await;
    seed_staff(&pool, 2, "alice").await;
    let app = state(&pool);
    let threshold = app.config.login_failure_threshold;

    for _ in 1..threshold {
        sqlx::query(
            "INSERT INTO login_attempts (username, ip_address, attempted_at, success, \
             failure_reason) VALUES ('alice', $1, NOW(), FALSE, 'Invalid password')",
        )
        .bind(CLIENT_IP)
        .execute(&*pool)
        .await
        .expect("seed failed attempt");
    }

    let auth = app.auth_service();
    let wrong = LoginRequest {
        username: "alice".to_string(),
        password: "wrong-password".to_string(),
        branch_name: None,
    };
    let (client_a, client_b) = (client(), client());
    let (first, second) = tokio::join!(
        auth.login(&wrong, &client_a),
        auth.login(&wrong, &client_b)
    );

    for result in [first, second] {
        let err = result.expect_err("wrong password never signs in");
        assert!(
            matches!(err.status(), StatusCode::UNAUTHORIZED | StatusCode::BAD_REQUEST),
            "unexpected {}: {err}",
            err.status()
        );
    }

    let active: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM account_lockouts WHERE username = 'alice' AND is_active",
    )
    .fetch_one(&*pool)
    .await
    .unwrap();
    assert_eq!(active, 1);
    let attempts: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM login_attempts WHERE username = 'alice'")
            .fetch_one(&*pool)
            .await
            .unwrap();
    assert!(attempts >= i64::from(threshold));
}
