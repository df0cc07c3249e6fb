#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod permissions;
pub mod postgres;
pub mod security_ledger;
pub mod sessions;
pub mod tokens;
pub mod transaction;
pub mod unit_of_work;
pub mod users;

#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryStore;
pub use postgres::PgSecurityStore;
pub use transaction::{finish, CommitPolicy};
pub use unit_of_work::{
    CredentialStore, PermissionStore, SecurityLedger, SecurityStore, SessionStore, TokenStore,
    UnitOfWork,
};
