use chrono::Utc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gatekeeper_backend::{
    config::Config, db::connection::create_pool, repositories::PgSecurityStore,
    services::retention,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatekeeper_backend=info,token_cleanup=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    let pool = create_pool(&config.database_url).await?;
    let store = PgSecurityStore::new(pool.clone());

    let report = retention::purge(&store, &config, Utc::now())
        .await
        .map_err(|err| anyhow::anyhow!("token retention failed: {err}"))?;

    if report.blacklist_purged > 0 {
        tracing::info!("Deleted {} expired blacklist entries", report.blacklist_purged);
    }
    if report.refresh_tokens_purged > 0 {
        tracing::info!(
            retention_days = config.token_retention_days,
            "Deleted {} stale refresh tokens",
            report.refresh_tokens_purged
        );
    }

    sqlx::query("VACUUM (ANALYZE) blacklisted_tokens")
        .execute(&*pool)
        .await?;
    sqlx::query("VACUUM (ANALYZE) refresh_tokens")
        .execute(&*pool)
        .await?;

    Ok(())
}
