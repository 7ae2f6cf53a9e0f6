//! API middleware.

use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use khidmat_core::{
    AuthService, DutyChartService, FinanceService, MiqaatService, NotificationService,
    UserService,
};

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub auth_service: AuthService,
    pub user_service: UserService,
    pub duty_chart_service: DutyChartService,
    pub miqaat_service: MiqaatService,
    pub notification_service: NotificationService,
    pub finance_service: FinanceService,
}

/// Authentication middleware.
///
/// Attaches the decoded [`khidmat_core::Claims`] to the request when a valid
/// bearer token is present. Requests without one pass through untouched and
/// are rejected by the `AuthUser` extractor on protected routes, so a missing
/// and an invalid token produce the same 401.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|value| value.trim().to_string());

    match token {
        Some(token) => match state.auth_service.verify(&token) {
            Ok(claims) => {
                req.extensions_mut().insert(claims);
            }
            Err(_) => {
                tracing::warn!(path = %req.uri().path(), "Invalid or expired bearer token");
            }
        },
        None => {
            tracing::debug!(path = %req.uri().path(), "No bearer token");
        }
    }

    next.run(req).await
}
