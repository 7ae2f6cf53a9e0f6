//! Duty chart endpoints.

use axum::{
    Router,
    extract::{Path, Query, State},
    routing::get,
};
use khidmat_common::AppResult;
use khidmat_core::duty_chart::{
    CreateDutyChartInput, DutyChartQuery, DutyChartView, UpdateDutyChartInput,
};
use khidmat_db::entities::user::Role;
use serde::Serialize;

use crate::{
    extractors::{AuthUser, JsonBody},
    middleware::AppState,
    response::{ApiResponse, Empty},
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DutyChartResponse {
    pub duty_chart: DutyChartView,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DutyChartListResponse {
    pub count: usize,
    pub duty_charts: Vec<DutyChartView>,
}

async fn create_chart(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateDutyChartInput>,
) -> AppResult<ApiResponse<DutyChartResponse>> {
    caller.require(Role::ADMINS)?;

    let chart = state.duty_chart_service.create(&caller, req).await?;
    Ok(ApiResponse::created(DutyChartResponse { duty_chart: chart })
        .with_message("Duty chart created"))
}

/// Members only see the charts they are assigned to.
async fn list_charts(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    Query(query): Query<DutyChartQuery>,
) -> AppResult<ApiResponse<DutyChartListResponse>> {
    let charts = state.duty_chart_service.list(&caller, &query).await?;
    Ok(ApiResponse::ok(DutyChartListResponse {
        count: charts.len(),
        duty_charts: charts,
    }))
}

async fn show_chart(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<DutyChartResponse>> {
    let chart = state.duty_chart_service.get(&caller, &id).await?;
    Ok(ApiResponse::ok(DutyChartResponse { duty_chart: chart }))
}

async fn update_chart(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UpdateDutyChartInput>,
) -> AppResult<ApiResponse<DutyChartResponse>> {
    caller.require(Role::ADMINS)?;

    let chart = state.duty_chart_service.update(&caller, &id, req).await?;
    Ok(ApiResponse::ok(DutyChartResponse { duty_chart: chart })
        .with_message("Duty chart updated"))
}

async fn delete_chart(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Empty>> {
    caller.require(Role::ADMINS)?;

    state.duty_chart_service.delete(&caller, &id).await?;
    Ok(ApiResponse::message("Duty chart deleted"))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_charts).post(create_chart))
        .route(
            "/{id}",
            get(show_chart).put(update_chart).delete(delete_chart),
        )
}
