use std::{net::SocketAddr, sync::Arc};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gatekeeper_backend::{
    config::Config,
    db::connection::{create_pool, DbPool},
    repositories::PgSecurityStore,
    routes::{build_router, permission_registry},
    services::{password_policy::ConfiguredPasswordPolicy, user_admin::ensure_root_admin_password},
    state::AppState,
};

fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "<empty>".into();
    }
    let prefix = s.chars().take(4).collect::<String>();
    format!("{}*** (len={})", prefix, s.len())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatekeeper_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;
    tracing::info!(
        database_url = %config.database_url,
        bind_address = %config.bind_address,
        jwt_secret = %mask_secret(&config.jwt_secret),
        access_token_expiration_minutes = config.access_token_expiration_minutes,
        refresh_token_expiration_days = config.refresh_token_expiration_days,
        login_failure_threshold = config.login_failure_threshold,
        ip_allowlist_enforced = config.ip_allowlist_enforced,
        behind_proxy = config.behind_proxy,
        rate_limit_enabled = config.rate_limit_enabled,
        "Loaded configuration from environment/.env"
    );

    // Initialize database
    let pool: DbPool = create_pool(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&*pool).await?;

    let store = Arc::new(PgSecurityStore::new(pool));
    let installed = ensure_root_admin_password(store.as_ref(), &config)
        .await
        .map_err(|err| anyhow::anyhow!("root admin bootstrap failed: {err}"))?;
    if installed {
        tracing::info!(
            user_id = %config.root_admin_user_id,
            "Installed initial root admin password"
        );
    }

    let policy = Arc::new(ConfiguredPasswordPolicy::from_config(&config));
    let registry = permission_registry()?;
    tracing::debug!(operations = registry.len(), "Permission registry built");

    let addr: SocketAddr = config.bind_address.parse()?;
    let app = build_router(AppState::new(store, config, registry, policy));

    // Start server
    tracing::info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
