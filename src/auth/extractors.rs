use std::marker::PhantomData;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::warn;

use crate::{
    auth::repo_types::{Role, User},
    error::ApiError,
    state::AppState,
};

const NOT_AUTHORIZED: &str = "Not authorized to access this route";

/// Authentication gate: a verified bearer token whose subject still exists.
/// The loaded user is cached in request extensions for later gates.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let token = bearer_token(parts)?;

        let claims = state.jwt.verify(token).map_err(|e| {
            warn!(error = %e, "invalid or expired token");
            ApiError::Unauthorized(NOT_AUTHORIZED.into())
        })?;

        let user = state
            .users
            .find_by_id(claims.sub)
            .await?
            .ok_or_else(|| {
                warn!(user_id = %claims.sub, "token subject no longer exists");
                ApiError::Unauthorized(NOT_AUTHORIZED.into())
            })?;

        let auth = AuthUser(user);
        parts.extensions.insert(auth.clone());
        Ok(auth)
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, ApiError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized(NOT_AUTHORIZED.into()))?;

    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Unauthorized(NOT_AUTHORIZED.into()))
}

/// Role gate. Must only be evaluated for an authenticated user.
pub fn require_role(user: &User, allowed: &[Role]) -> Result<(), ApiError> {
    if allowed.contains(&user.role) {
        Ok(())
    } else {
        warn!(user_id = %user.id, role = %user.role, "role not allowed");
        Err(ApiError::Forbidden(format!(
            "User role {} is not authorized to access this route",
            user.role
        )))
    }
}

/// A fixed set of roles accepted by [`Authorized`].
pub trait RoleSet: Send + Sync + 'static {
    const ALLOWED: &'static [Role];
}

#[derive(Debug, Clone, Copy)]
pub struct AdminOnly;

impl RoleSet for AdminOnly {
    const ALLOWED: &'static [Role] = &[Role::Admin];
}

/// Authentication followed by a role check against `R`.
#[derive(Debug, Clone)]
pub struct Authorized<R: RoleSet> {
    pub user: User,
    _roles: PhantomData<R>,
}

#[async_trait]
impl<R: RoleSet> FromRequestParts<AppState> for Authorized<R> {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        require_role(&user, R::ALLOWED)?;
        Ok(Self {
            user,
            _roles: PhantomData,
        })
    }
}

pub type AdminUser = Authorized<AdminOnly>;
