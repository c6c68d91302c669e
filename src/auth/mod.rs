//! Authentication and authorization: password hashing, bearer tokens,
//! the revocation list, and role checks.

pub mod access;
mod password;
pub mod revocation;
pub mod token;

pub use access::{authorize, AccessError, Caller, Role};
pub use password::{hash_password, verify_password};
pub use revocation::{MemoryRevocationStore, RevocationStore, SqliteRevocationStore};
pub use token::{IssuedToken, TokenError, TokenService};
