use tracing::{info, warn};

use crate::{
    auth::{
        dto::{AuthResponse, RegisterRequest},
        repo_types::NewUser,
    },
    error::ApiError,
    state::AppState,
};

const INVALID_CREDENTIALS: &str = "Invalid credentials";

/// Creates the account and signs a token for it.
pub async fn register_user(state: &AppState, req: RegisterRequest) -> Result<AuthResponse, ApiError> {
    if state
        .users
        .exists_by_email_or_username(&req.email, &req.username)
        .await?
    {
        warn!(email = %req.email, username = %req.username, "user already exists");
        return Err(ApiError::Conflict(
            "User with this email or username already exists".into(),
        ));
    }

    let password_hash = state.hasher.hash_async(req.password).await?;
    let user = state
        .users
        .create(NewUser {
            username: req.username,
            email: req.email,
            password_hash,
            role: req.role,
        })
        .await?;

    let token = state.jwt.sign(user.id)?;
    info!(user_id = %user.id, email = %user.email, role = %user.role, "user registered");
    Ok(AuthResponse { user, token })
}

/// Unknown email and wrong password are indistinguishable to the caller.
pub async fn login(state: &AppState, email: &str, password: String) -> Result<AuthResponse, ApiError> {
    let email = email.trim().to_lowercase();

    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.into()));
    };

    if !state
        .hasher
        .verify_async(password, user.password_hash.clone())
        .await?
    {
        warn!(email = %email, user_id = %user.id, "login invalid password");
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.into()));
    }

    let token = state.jwt.sign(user.id)?;
    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(AuthResponse { user, token })
}
