//! Authentication endpoints.

use axum::{Router, extract::State, routing::post};
use khidmat_common::AppResult;
use khidmat_core::user::{LoginInput, RegisterInput};
use serde::Serialize;

use super::users::UserResponse;
use crate::{extractors::JsonBody, middleware::AppState, response::ApiResponse};

/// Login response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
}

/// Registration response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub user: UserResponse,
}

/// Exchange ITS ID and password for a bearer token.
async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LoginInput>,
) -> AppResult<ApiResponse<LoginResponse>> {
    let output = state.user_service.login(req).await?;

    Ok(ApiResponse::ok(LoginResponse {
        token: output.token,
        user: output.user.into(),
    })
    .with_message("Login successful"))
}

/// Self-registration as a member.
async fn register(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RegisterInput>,
) -> AppResult<ApiResponse<RegisterResponse>> {
    let user = state.user_service.register(req).await?;

    Ok(ApiResponse::created(RegisterResponse { user: user.into() })
        .with_message("Registration successful"))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/register", post(register))
}
