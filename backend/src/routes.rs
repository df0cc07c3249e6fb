use axum::{
    http::Method,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    handlers, middleware,
    middleware::rate_limit::create_auth_rate_limiter,
    services::permission_registry::PermissionRegistry,
    state::AppState,
};

/// Operations gated by role permissions, with the path stored in grants.
pub fn permission_registry() -> anyhow::Result<PermissionRegistry> {
    let mut registry = PermissionRegistry::new();
    registry.register("users.lock", "/api/user/v1/lock", "Lock or unlock users")?;
    registry.register(
        "users.change-password",
        "/api/secure-auth/v1/change-password",
        "Change another user's password",
    )?;
    registry.register("permissions.list", "/api/permissions/v1", "List permissions")?;
    registry.register(
        "permissions.save",
        "/api/permissions/v1/save",
        "Save role permissions",
    )?;
    registry.register(
        "permissions.role",
        "/api/permissions/v1/role/{id}",
        "View role permissions",
    )?;
    Ok(registry)
}

pub fn build_router(state: AppState) -> Router {
    let limiter = create_auth_rate_limiter(&state.config);

    // Public secure-auth routes
    let mut auth_routes = Router::new()
        .route("/api/secure-auth/v1/login", post(handlers::auth::login))
        .route(
            "/api/secure-auth/v1/refresh-token",
            post(handlers::auth::refresh),
        )
        .route("/api/secure-auth/v1/logout", post(handlers::auth::logout));

    // Bearer-protected secure-auth routes; share the limiter quota above
    let mut secure_auth_routes = Router::new()
        .route(
            "/api/secure-auth/v1/change-password",
            post(handlers::auth::change_password),
        )
        .route(
            "/api/secure-auth/v1/secure-change-password",
            post(handlers::auth::secure_change_password),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth,
        ));

    if let Some(limiter) = limiter {
        auth_routes = auth_routes.route_layer(limiter.clone());
        secure_auth_routes = secure_auth_routes.route_layer(limiter);
    }

    // Public routes without limits
    let public_routes = Router::new()
        .route("/v1", get(handlers::health::liveness))
        .route("/health/db", get(handlers::health::database));

    // Bearer-protected routes
    let protected_routes = Router::new()
        .route("/api/user/v1/lock", post(handlers::users::lock_user))
        .route(
            "/api/user/v1/reset-pwrd",
            post(handlers::users::reset_password),
        )
        .route(
            "/api/permissions/v1",
            get(handlers::permissions::list_registered),
        )
        .route("/api/permissions/v1/save", post(handlers::permissions::save))
        .route(
            "/api/permissions/v1/role",
            get(handlers::permissions::own_permissions),
        )
        .route(
            "/api/permissions/v1/role/{id}",
            get(handlers::permissions::role_permissions),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth,
        ));

    Router::new()
        .merge(auth_routes)
        .merge(secure_auth_routes)
        .merge(public_routes)
        .merge(protected_routes)
        .layer(
            ServiceBuilder::new()
                .layer(axum_middleware::from_fn(middleware::request_id))
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods([
                            Method::GET,
                            Method::POST,
                            Method::PUT,
                            Method::DELETE,
                            Method::OPTIONS,
                        ])
                        .allow_headers(Any)
                        .max_age(std::time::Duration::from_secs(24 * 60 * 60)),
                ),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_every_gated_operation() {
        let registry = permission_registry().expect("registry");
        for operation in [
            "users.lock",
            "users.change-password",
            "permissions.list",
            "permissions.save",
            "permissions.role",
        ] {
            assert!(registry.path_for(operation).is_some(), "{operation}");
        }
        assert_eq!(registry.len(), 5);
    }
}
