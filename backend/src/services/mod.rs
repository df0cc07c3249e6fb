pub mod auth;
pub mod credentials;
pub mod ip_gate;
pub mod lockout;
pub mod password_policy;
pub mod permission_registry;
pub mod permissions;
pub mod retention;
pub mod sessions;
pub mod tokens;
pub mod user_admin;
