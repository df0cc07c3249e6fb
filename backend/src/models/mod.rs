//! Data models shared across database access and API handlers.

pub mod auth;
pub mod envelope;
pub mod permission;
pub mod security;
pub mod session;
pub mod token;
pub mod user;
