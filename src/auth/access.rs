//! Role checks applied before catalog and request operations.
//!
//! `authorize` is a pure function of the caller and the required roles, so
//! the transport only has to turn its result into a status code.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A caller whose token has been validated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: i64,
    pub is_admin: bool,
}

impl Caller {
    pub fn role(&self) -> Role {
        if self.is_admin {
            Role::Admin
        } else {
            Role::Client
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Client => write!(f, "client"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("authentication required")]
    Unauthorized,

    #[error("{role} role is not allowed to perform this operation")]
    Forbidden { role: Role },
}

/// Decide whether `caller` may run an operation gated on `required`.
///
/// An empty role set admits any authenticated caller. Authentication is
/// checked before the role.
pub fn authorize(caller: Option<&Caller>, required: &[Role]) -> Result<Caller, AccessError> {
    let caller = caller.ok_or(AccessError::Unauthorized)?;
    if required.is_empty() || required.contains(&caller.role()) {
        Ok(*caller)
    } else {
        Err(AccessError::Forbidden {
            role: caller.role(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT: Caller = Caller {
        user_id: 1,
        is_admin: false,
    };
    const ADMIN: Caller = Caller {
        user_id: 2,
        is_admin: true,
    };

    #[test]
    fn test_unauthenticated_is_rejected_before_roles() {
        assert_eq!(authorize(None, &[]), Err(AccessError::Unauthorized));
        assert_eq!(authorize(None, &[Role::Admin]), Err(AccessError::Unauthorized));
    }

    #[test]
    fn test_empty_set_admits_any_authenticated_caller() {
        assert_eq!(authorize(Some(&CLIENT), &[]), Ok(CLIENT));
        assert_eq!(authorize(Some(&ADMIN), &[]), Ok(ADMIN));
    }

    #[test]
    fn test_admin_only() {
        assert_eq!(authorize(Some(&ADMIN), &[Role::Admin]), Ok(ADMIN));
        assert_eq!(
            authorize(Some(&CLIENT), &[Role::Admin]),
            Err(AccessError::Forbidden { role: Role::Client })
        );
    }

    #[test]
    fn test_client_only() {
        assert_eq!(authorize(Some(&CLIENT), &[Role::Client]), Ok(CLIENT));
        assert_eq!(
            authorize(Some(&ADMIN), &[Role::Client]),
            Err(AccessError::Forbidden { role: Role::Admin })
        );
    }

    #[test]
    fn test_either_role() {
        for caller in [CLIENT, ADMIN] {
            assert!(authorize(Some(&caller), &[Role::Admin, Role::Client]).is_ok());
        }
    }
}
