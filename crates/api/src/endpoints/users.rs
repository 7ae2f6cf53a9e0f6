//! User endpoints.

use axum::{
    Router,
    extract::{Path, Query, State},
    routing::{get, put},
};
use chrono::{DateTime, FixedOffset};
use khidmat_common::{AppError, AppResult};
use khidmat_core::user::{ChangePasswordInput, CreateMemberInput, UpdateUserInput};
use khidmat_db::{
    entities::user::{self, Role, UserStatus},
    repositories::UserFilter,
};
use serde::{Deserialize, Serialize};

use crate::{
    extractors::{AuthUser, JsonBody},
    middleware::AppState,
    response::{ApiResponse, Empty},
};

/// A user as returned by the API. The password hash never leaves the server.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub its_id: String,
    pub name: String,
    pub surname: Option<String>,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub zone: Option<String>,
    pub designation: Option<String>,
    pub status: UserStatus,
    pub created_at: DateTime<FixedOffset>,
}

impl From<user::Model> for UserResponse {
    fn from(u: user::Model) -> Self {
        Self {
            id: u.id,
            its_id: u.its_id,
            name: u.name,
            surname: u.surname,
            email: u.email,
            phone: u.phone,
            role: u.role,
            zone: u.zone,
            designation: u.designation,
            status: u.status,
            created_at: u.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct SingleUserResponse {
    pub user: UserResponse,
}

#[derive(Serialize)]
pub struct UserListResponse {
    pub users: Vec<UserResponse>,
}

/// Member creation response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedMemberResponse {
    pub user: UserResponse,
    /// Present when the welcome email could not be sent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_error: Option<String>,
}

/// Member directory query.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUsersQuery {
    pub role: Option<Role>,
    pub zone: Option<String>,
    pub status: Option<UserStatus>,
    pub search: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub offset: u64,
}

const fn default_limit() -> u64 {
    100
}

const MAX_LIMIT: u64 = 500;

async fn list_users(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
) -> AppResult<ApiResponse<UserListResponse>> {
    caller.require(Role::STAFF)?;

    let filter = UserFilter {
        role: query.role,
        zone: query.zone,
        status: query.status,
        search: query.search,
    };
    let users = state
        .user_service
        .list(&filter, query.limit.min(MAX_LIMIT), query.offset)
        .await?;

    Ok(ApiResponse::ok(UserListResponse {
        users: users.into_iter().map(Into::into).collect(),
    }))
}

async fn create_member(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateMemberInput>,
) -> AppResult<ApiResponse<CreatedMemberResponse>> {
    caller.require(Role::ADMINS)?;

    let created = state.user_service.create_member(&caller, req).await?;
    let message = if created.email_error.is_some() {
        "Member created, but the welcome email could not be sent"
    } else {
        "Member created"
    };

    Ok(ApiResponse::created(CreatedMemberResponse {
        user: created.user.into(),
        email_error: created.email_error,
    })
    .with_message(message))
}

async fn me(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<SingleUserResponse>> {
    let user = state.user_service.get(&caller.sub).await?;
    Ok(ApiResponse::ok(SingleUserResponse { user: user.into() }))
}

async fn change_password(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ChangePasswordInput>,
) -> AppResult<ApiResponse<Empty>> {
    state.user_service.change_password(&caller.sub, req).await?;
    Ok(ApiResponse::message("Password updated"))
}

async fn show_user(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<SingleUserResponse>> {
    if !caller.is_self_or_admin(&id) {
        return Err(AppError::Forbidden(
            "You may only view your own profile".to_string(),
        ));
    }

    let user = state.user_service.get(&id).await?;
    Ok(ApiResponse::ok(SingleUserResponse { user: user.into() }))
}

async fn update_user(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UpdateUserInput>,
) -> AppResult<ApiResponse<SingleUserResponse>> {
    caller.require(Role::ADMINS)?;

    let user = state.user_service.update(&caller, &id, req).await?;
    Ok(ApiResponse::ok(SingleUserResponse { user: user.into() }).with_message("User updated"))
}

async fn delete_user(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Empty>> {
    caller.require(Role::ADMINS)?;

    state.user_service.delete(&caller, &id).await?;
    Ok(ApiResponse::message("User deleted"))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).post(create_member))
        .route("/me", get(me))
        .route("/me/password", put(change_password))
        .route("/{id}", get(show_user).put(update_user).delete(delete_user))
}
