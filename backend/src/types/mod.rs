pub mod id;

pub use id::{BranchId, RoleId, SessionId, UserId};
