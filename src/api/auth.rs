use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, StatusCode},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::sync::Arc;
use tracing::info;

use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_login, validate_name, validate_password};
use crate::auth::{authorize, Caller, Role, TokenError};
use crate::db::{format_timestamp, LoginRequest, LoginResponse, SignUpRequest, User, UserResponse};
use crate::AppState;

/// Extract the bearer token from the Authorization header, falling back to the auth cookie
pub fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    if let Some(header) = headers.get(AUTHORIZATION).and_then(|h| h.to_str().ok()) {
        if let Some(token) = header.strip_prefix("Bearer ") {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    // The cookie may carry the token with or without the scheme prefix
    CookieJar::from_headers(headers)
        .get(cookie_name)
        .map(|c| {
            let value = c.value();
            value.strip_prefix("Bearer ").unwrap_or(value).trim().to_string()
        })
        .filter(|token| !token.is_empty())
}

/// The validated caller, or `None` for a missing or rejected token
async fn resolve_caller(parts: &Parts, state: &AppState) -> Result<Option<Caller>, ApiError> {
    let Some(token) = extract_token(&parts.headers, &state.config.auth.cookie_name) else {
        return Ok(None);
    };

    match state.tokens.validate(&token).await {
        Ok(caller) => Ok(Some(caller)),
        Err(TokenError::Invalid) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Any authenticated caller
#[async_trait]
impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let caller = resolve_caller(parts, state).await?;
        Ok(authorize(caller.as_ref(), &[])?)
    }
}

/// A caller holding the admin role
pub struct AdminCaller(pub Caller);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminCaller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let caller = resolve_caller(parts, state).await?;
        Ok(Self(authorize(caller.as_ref(), &[Role::Admin])?))
    }
}

/// A caller holding the client role; carts belong to clients
pub struct ClientCaller(pub Caller);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for ClientCaller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let caller = resolve_caller(parts, state).await?;
        Ok(Self(authorize(caller.as_ref(), &[Role::Client])?))
    }
}

/// The caller if a valid token was presented; public endpoints use this
pub struct OptionalCaller(pub Option<Caller>);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for OptionalCaller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self(resolve_caller(parts, state).await?))
    }
}

/// POST /api/auth/sign-up
pub async fn sign_up(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("login", validate_login(&request.login))
        .check("password", validate_password(&request.password))
        .check("name", validate_name(&request.name));
    errors.finish()?;

    let user = User::create(
        &state.db,
        &request.login,
        &request.password,
        request.name.trim(),
        false,
    )
    .await?;

    info!(user_id = user.id, login = %user.login, "User signed up");
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// POST /api/auth/login
///
/// Returns the token in the body and also sets it as an HttpOnly cookie.
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let user = User::find_by_credentials(&state.db, &request.login, &request.password).await?;
    let issued = state.tokens.issue(user.id, user.is_admin)?;

    let cookie = Cookie::build((state.config.auth.cookie_name.clone(), issued.token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);

    info!(user_id = user.id, "User logged in");
    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            token: issued.token,
            expires_at: format_timestamp(issued.expires_at),
            user: user.into(),
        }),
    ))
}

/// POST /api/auth/logout
///
/// Revokes the presented token until its own expiry and clears the cookie.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<(CookieJar, StatusCode), ApiError> {
    let cookie_name = state.config.auth.cookie_name.clone();
    let token = extract_token(&headers, &cookie_name)
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    state.tokens.revoke(&token).await?;

    info!(user_id = caller.user_id, "User logged out");
    Ok((
        jar.remove(Cookie::build((cookie_name, "")).path("/")),
        StatusCode::NO_CONTENT,
    ))
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<UserResponse>, ApiError> {
    let user = User::find_by_id(&state.db, caller.user_id).await?;
    Ok(Json(user.into()))
}
