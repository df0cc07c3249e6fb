use std::sync::Arc;

use crate::{
    config::Config,
    repositories::SecurityStore,
    services::{
        auth::AuthService, password_policy::PasswordPolicy, permission_registry::PermissionRegistry,
        permissions::PermissionService, user_admin::UserAdminService,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SecurityStore>,
    pub config: Arc<Config>,
    pub registry: Arc<PermissionRegistry>,
    pub policy: Arc<dyn PasswordPolicy>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn SecurityStore>,
        config: Config,
        registry: PermissionRegistry,
        policy: Arc<dyn PasswordPolicy>,
    ) -> Self {
        Self {
            store,
            config: Arc::new(config),
            registry: Arc::new(registry),
            policy,
        }
    }

    pub fn auth_service(&self) -> AuthService {
        AuthService::new(self.store.clone(), self.config.clone(), self.policy.clone())
    }

    pub fn permission_service(&self) -> PermissionService {
        PermissionService::new(
            self.store.clone(),
            self.config.clone(),
            self.registry.clone(),
        )
    }

    pub fn user_admin_service(&self) -> UserAdminService {
        UserAdminService::new(self.store.clone(), self.config.clone(), self.policy.clone())
    }
}
