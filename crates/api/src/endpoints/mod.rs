//! API endpoints.

mod auth;
mod duty_charts;
mod finance;
mod miqaat;
mod notifications;
mod users;

use axum::Router;

use crate::middleware::AppState;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .nest("/users", users::router())
        .nest("/dutychart", duty_charts::router())
        .nest("/miqaat", miqaat::router())
        .nest("/notifications", notifications::router())
        .nest("/finance", finance::router())
}
