//! User model and credential store.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;

use crate::auth::{hash_password, verify_password};
use crate::db::{is_unique_violation, now_timestamp};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub login: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    pub is_admin: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub login: String,
    pub name: String,
    pub is_admin: bool,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            login: user.login,
            name: user.name,
            is_admin: user.is_admin,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    pub login: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: String,
    pub user: UserResponse,
}

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("login is already taken")]
    DuplicateLogin,

    #[error("invalid login or password")]
    InvalidCredentials,

    #[error("user {0} not found")]
    NotFound(i64),

    #[error("failed to hash password: {0}")]
    Hash(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl User {
    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<User, CredentialError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or(CredentialError::NotFound(id))
    }

    pub async fn find_by_login(pool: &SqlitePool, login: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE login = ?")
            .bind(login)
            .fetch_optional(pool)
            .await
    }

    /// Look a user up by login and check the password against the stored hash.
    ///
    /// Unknown logins and wrong passwords are indistinguishable to the caller.
    pub async fn find_by_credentials(
        pool: &SqlitePool,
        login: &str,
        password: &str,
    ) -> Result<User, CredentialError> {
        let user = Self::find_by_login(pool, login)
            .await?
            .ok_or(CredentialError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash) {
            return Err(CredentialError::InvalidCredentials);
        }
        Ok(user)
    }

    pub async fn create(
        pool: &SqlitePool,
        login: &str,
        password: &str,
        name: &str,
        is_admin: bool,
    ) -> Result<User, CredentialError> {
        let password_hash =
            hash_password(password).map_err(|e| CredentialError::Hash(e.to_string()))?;
        let now = now_timestamp();

        let result = sqlx::query(
            "INSERT INTO users (login, password_hash, name, is_admin, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(login)
        .bind(&password_hash)
        .bind(name)
        .bind(is_admin)
        .bind(&now)
        .execute(pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                CredentialError::DuplicateLogin
            } else {
                CredentialError::Database(e)
            }
        })?;

        Ok(User {
            id: result.last_insert_rowid(),
            login: login.to_string(),
            password_hash,
            name: name.to_string(),
            is_admin,
            created_at: now,
        })
    }
}
