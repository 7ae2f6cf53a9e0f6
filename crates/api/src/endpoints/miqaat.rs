//! Miqaat endpoints.

use axum::{
    Router,
    extract::{Path, Query, State},
    routing::{get, post, put},
};
use khidmat_common::AppResult;
use khidmat_core::miqaat::{
    CreateMiqaatInput, MiqaatQuery, MiqaatView, SetAttendanceInput, UpdateMiqaatInput,
};
use khidmat_db::entities::{miqaat::AttendanceEntry, user::Role};
use serde::Serialize;

use crate::{
    extractors::{AuthUser, JsonBody},
    middleware::AppState,
    response::{ApiResponse, Empty},
};

#[derive(Serialize)]
pub struct MiqaatResponse {
    pub miqaat: MiqaatView,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMiqaatResponse {
    pub miqaat: MiqaatView,
    pub notification_sent: bool,
}

#[derive(Serialize)]
pub struct MiqaatListResponse {
    pub count: usize,
    pub miqaats: Vec<MiqaatView>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceResponse {
    pub attendance: AttendanceEntry,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub already_registered: Option<bool>,
}

async fn create_miqaat(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateMiqaatInput>,
) -> AppResult<ApiResponse<CreateMiqaatResponse>> {
    caller.require(Role::ADMINS)?;

    let created = state.miqaat_service.create(&caller, req).await?;
    Ok(ApiResponse::created(CreateMiqaatResponse {
        miqaat: created.miqaat,
        notification_sent: created.notification_sent,
    })
    .with_message("Miqaat created"))
}

async fn list_miqaats(
    AuthUser(_caller): AuthUser,
    State(state): State<AppState>,
    Query(query): Query<MiqaatQuery>,
) -> AppResult<ApiResponse<MiqaatListResponse>> {
    let miqaats = state.miqaat_service.list(&query).await?;
    Ok(ApiResponse::ok(MiqaatListResponse {
        count: miqaats.len(),
        miqaats,
    }))
}

async fn show_miqaat(
    AuthUser(_caller): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<MiqaatResponse>> {
    let miqaat = state.miqaat_service.get(&id).await?;
    Ok(ApiResponse::ok(MiqaatResponse { miqaat }))
}

async fn update_miqaat(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UpdateMiqaatInput>,
) -> AppResult<ApiResponse<MiqaatResponse>> {
    caller.require(Role::ADMINS)?;

    let miqaat = state.miqaat_service.update(&caller, &id, req).await?;
    Ok(ApiResponse::ok(MiqaatResponse { miqaat }).with_message("Miqaat updated"))
}

async fn delete_miqaat(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Empty>> {
    caller.require(Role::ADMINS)?;

    state.miqaat_service.delete(&caller, &id).await?;
    Ok(ApiResponse::message("Miqaat deleted"))
}

/// Self-registration. Repeating it is harmless.
async fn register_attendance(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<AttendanceResponse>> {
    let registration = state
        .miqaat_service
        .register_attendance(&caller, &id)
        .await?;

    let message = if registration.already_registered {
        "Already registered for this miqaat"
    } else {
        "Attendance registered"
    };
    Ok(ApiResponse::ok(AttendanceResponse {
        attendance: registration.entry,
        already_registered: Some(registration.already_registered),
    })
    .with_message(message))
}

async fn set_attendance(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    Path((id, member_id)): Path<(String, String)>,
    JsonBody(req): JsonBody<SetAttendanceInput>,
) -> AppResult<ApiResponse<AttendanceResponse>> {
    caller.require(Role::ATTENDANCE_STAFF)?;

    let entry = state
        .miqaat_service
        .set_attendance(&caller, &id, &member_id, req)
        .await?;
    Ok(ApiResponse::ok(AttendanceResponse {
        attendance: entry,
        already_registered: None,
    })
    .with_message("Attendance updated"))
}

async fn checkout(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<AttendanceResponse>> {
    let entry = state.miqaat_service.checkout(&caller, &id).await?;
    Ok(ApiResponse::ok(AttendanceResponse {
        attendance: entry,
        already_registered: None,
    })
    .with_message("Checked out"))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_miqaats).post(create_miqaat))
        .route(
            "/{id}",
            get(show_miqaat).put(update_miqaat).delete(delete_miqaat),
        )
        .route("/{id}/attendance", post(register_attendance))
        .route("/{id}/attendance/{member_id}", put(set_attendance))
        .route("/{id}/checkout", post(checkout))
}
