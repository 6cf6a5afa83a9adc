use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::{
    auth::repo_types::{Role, User},
    validation::{Field, Mode, Schema, Validate},
};

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Role,
}

lazy_static! {
    static ref REGISTER_SCHEMA: Schema = Schema::new(vec![
        Field::string("username").trim().required(),
        Field::string("email").trim().lowercase().email().required(),
        Field::string("password").min_len(8).required(),
        Field::one_of("role", Role::NAMES),
    ]);
}

impl Validate for RegisterRequest {
    const MODE: Mode = Mode::Create;

    fn schema() -> &'static Schema {
        &REGISTER_SCHEMA
    }
}

/// Request body for login; presence is checked by the handler.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Response returned after login or register.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}
