//! Typed ID wrappers for compile-time type safety.
//!
//! The ledger keys users, roles and branches by 32-bit integers and sessions by
//! 64-bit integers. Wrapping them keeps a role id from being passed where a user
//! id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Macro to generate integer-backed ID wrappers with common trait implementations.
macro_rules! typed_id {
    ($name:ident, $inner:ty, $doc:literal) => {
        #[doc = $doc]
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
        )]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(pub $inner);

        impl $name {
            /// Returns the raw integer value.
            pub fn get(self) -> $inner {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<$inner>().map(Self)
            }
        }

        impl From<$inner> for $name {
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }

        impl From<$name> for $inner {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

typed_id!(UserId, i32, "Unique identifier for a user account.");
typed_id!(RoleId, i32, "Identifier of a role level sharing one permission set.");
typed_id!(BranchId, i32, "Identifier of a business branch.");
typed_id!(SessionId, i64, "Identifier of a login session.");
