pub mod jwt;
pub mod password;
pub mod refresh;

pub use jwt::*;
pub use password::*;
pub use refresh::*;
