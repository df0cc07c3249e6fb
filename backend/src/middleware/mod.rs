pub mod auth;
pub mod client;
pub mod rate_limit;
pub mod request_id;

pub use auth::*;
pub use rate_limit::*;
pub use request_id::*;
