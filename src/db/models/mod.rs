//! Database models split into domain-specific modules.

pub mod analysis_request;
pub mod modeling;
pub mod user;

pub use analysis_request::*;
pub use modeling::*;
pub use user::*;
