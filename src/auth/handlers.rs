use axum::{
    extract::State,
    routing::{get, post},
    Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, RegisterRequest},
        extractors::AuthUser,
        repo_types::User,
        services,
    },
    error::ApiError,
    extract::ApiJson,
    response::{ApiResponse, ApiResult},
    state::AppState,
    validation::Valid,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/auth/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Valid(payload): Valid<RegisterRequest>,
) -> ApiResult<AuthResponse> {
    let auth = services::register_user(&state, payload).await?;
    Ok(ApiResponse::created(auth).with_message("User registered successfully"))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> ApiResult<AuthResponse> {
    let (Some(email), Some(password)) = (
        payload.email.filter(|e| !e.trim().is_empty()),
        payload.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(ApiError::BadRequest(
            "Please provide an email and password".into(),
        ));
    };

    let auth = services::login(&state, &email, password).await?;
    Ok(ApiResponse::ok(auth).with_message("User logged in successfully"))
}

#[instrument(skip(user), fields(user_id = %user.id))]
pub async fn get_me(AuthUser(user): AuthUser) -> ApiResult<User> {
    Ok(ApiResponse::ok(user))
}
