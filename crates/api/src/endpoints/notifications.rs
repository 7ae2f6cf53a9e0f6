//! Notification endpoints. Every route is scoped to the caller's own
//! notifications except the broadcast.

use axum::{
    Router,
    extract::{Path, State},
    routing::{get, patch},
};
use khidmat_common::AppResult;
use khidmat_core::notification::{BroadcastInput, NotificationView};
use khidmat_db::entities::user::Role;
use serde::Serialize;

use crate::{
    extractors::{AuthUser, JsonBody},
    middleware::AppState,
    response::{ApiResponse, Empty},
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationListResponse {
    pub notifications: Vec<NotificationView>,
    pub unread_count: usize,
}

#[derive(Serialize)]
pub struct NotificationResponse {
    pub notification: NotificationView,
}

#[derive(Serialize)]
pub struct CountResponse {
    pub count: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastResponse {
    /// Absent when there was nobody to notify
    pub notification_id: Option<String>,
    pub recipients: usize,
}

async fn list_notifications(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<NotificationListResponse>> {
    let notifications = state.notification_service.list_for_user(&caller.sub).await?;
    let unread_count = notifications.iter().filter(|n| !n.read).count();
    Ok(ApiResponse::ok(NotificationListResponse {
        notifications,
        unread_count,
    }))
}

async fn unread_count(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<CountResponse>> {
    let count = state.notification_service.unread_count(&caller.sub).await?;
    Ok(ApiResponse::ok(CountResponse { count }))
}

async fn broadcast(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<BroadcastInput>,
) -> AppResult<ApiResponse<BroadcastResponse>> {
    caller.require(Role::ADMINS)?;

    let created = state
        .notification_service
        .broadcast_input(req, &caller.sub)
        .await?;

    Ok(match created {
        Some(n) => {
            let recipients = n.recipients()?.len();
            ApiResponse::created(BroadcastResponse {
                notification_id: Some(n.id),
                recipients,
            })
            .with_message("Notification sent")
        }
        None => ApiResponse::ok(BroadcastResponse {
            notification_id: None,
            recipients: 0,
        })
        .with_message("No active users to notify"),
    })
}

async fn mark_read(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<NotificationResponse>> {
    let notification = state.notification_service.mark_read(&id, &caller.sub).await?;
    Ok(ApiResponse::ok(NotificationResponse { notification })
        .with_message("Notification marked as read"))
}

async fn mark_all_read(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<CountResponse>> {
    let count = state.notification_service.mark_all_read(&caller.sub).await?;
    Ok(ApiResponse::ok(CountResponse { count })
        .with_message("All notifications marked as read"))
}

async fn clear(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Empty>> {
    state.notification_service.clear(&id, &caller.sub).await?;
    Ok(ApiResponse::message("Notification cleared"))
}

async fn clear_all(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<CountResponse>> {
    let count = state.notification_service.clear_all(&caller.sub).await?;
    Ok(ApiResponse::ok(CountResponse { count })
        .with_message("All notifications cleared"))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notifications).post(broadcast))
        .route("/unread-count", get(unread_count))
        .route("/read/{id}", patch(mark_read))
        .route("/read-all", patch(mark_all_read))
        .route("/clear/{id}", patch(clear))
        .route("/clear-all", patch(clear_all))
}
