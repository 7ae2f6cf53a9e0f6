//! Finance endpoints.

use axum::{
    Router,
    extract::{Path, Query, State},
    routing::{get, patch, post},
};
use khidmat_common::{AppError, AppResult};
use khidmat_core::finance::{
    AutoGenerateReport, BulkAssignInput, BulkMarkPaidInput, BulkReport, CreatePaymentInput,
    FinanceOverview, MarkPaidInput, MemberDues, PaymentQuery, PaymentView,
};
use khidmat_db::entities::user::Role;
use serde::Serialize;

use crate::{
    extractors::{AuthUser, JsonBody},
    middleware::AppState,
    response::ApiResponse,
};

#[derive(Serialize)]
pub struct OverviewResponse {
    pub overview: FinanceOverview,
}

#[derive(Serialize)]
pub struct DuesResponse {
    pub dues: MemberDues,
}

#[derive(Serialize)]
pub struct PaymentResponse {
    pub payment: PaymentView,
}

#[derive(Serialize)]
pub struct PaymentListResponse {
    pub count: usize,
    pub payments: Vec<PaymentView>,
}

#[derive(Serialize)]
pub struct BulkResponse {
    pub results: BulkReport,
}

#[derive(Serialize)]
pub struct AutoGenerateResponse {
    pub results: AutoGenerateReport,
}

#[derive(Serialize)]
pub struct CountResponse {
    pub count: u64,
}

async fn overview(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<OverviewResponse>> {
    caller.require(Role::FINANCE_STAFF)?;

    let overview = state.finance_service.overview().await?;
    Ok(ApiResponse::ok(OverviewResponse { overview }))
}

/// Finance staff may read anyone's dues; members only their own.
async fn member_dues(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    Path(member_id): Path<String>,
) -> AppResult<ApiResponse<DuesResponse>> {
    if caller.sub != member_id && !caller.has_role(Role::FINANCE_STAFF) {
        return Err(AppError::Forbidden(
            "You may only view your own dues".to_string(),
        ));
    }

    let dues = state.finance_service.member_dues(&member_id).await?;
    Ok(ApiResponse::ok(DuesResponse { dues }))
}

async fn list_payments(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    Query(query): Query<PaymentQuery>,
) -> AppResult<ApiResponse<PaymentListResponse>> {
    caller.require(Role::FINANCE_STAFF)?;

    let payments = state.finance_service.list_payments(query).await?;
    Ok(ApiResponse::ok(PaymentListResponse {
        count: payments.len(),
        payments,
    }))
}

async fn create_payment(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreatePaymentInput>,
) -> AppResult<ApiResponse<PaymentResponse>> {
    caller.require(Role::FINANCE_STAFF)?;

    let payment = state.finance_service.create_payment(&caller, req).await?;
    Ok(ApiResponse::created(PaymentResponse { payment }).with_message("Payment recorded"))
}

async fn mark_paid(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<JsonBody<MarkPaidInput>>,
) -> AppResult<ApiResponse<PaymentResponse>> {
    caller.require(Role::FINANCE_STAFF)?;

    let input = body.map(|JsonBody(input)| input).unwrap_or_default();
    let payment = state.finance_service.mark_paid(&caller, &id, input).await?;
    Ok(ApiResponse::ok(PaymentResponse { payment }).with_message("Payment marked as paid"))
}

async fn bulk_assign(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<BulkAssignInput>,
) -> AppResult<ApiResponse<BulkResponse>> {
    caller.require(Role::FINANCE_STAFF)?;

    let results = state.finance_service.bulk_assign(&caller, req).await?;
    let message = format!(
        "Assigned {} dues, {} failed",
        results.succeeded.len(),
        results.failed.len()
    );
    Ok(ApiResponse::ok(BulkResponse { results }).with_message(message))
}

async fn bulk_mark_paid(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<BulkMarkPaidInput>,
) -> AppResult<ApiResponse<BulkResponse>> {
    caller.require(Role::FINANCE_STAFF)?;

    let results = state.finance_service.bulk_mark_paid(&caller, req).await?;
    let message = format!(
        "Marked {} payments as paid, {} failed",
        results.succeeded.len(),
        results.failed.len()
    );
    Ok(ApiResponse::ok(BulkResponse { results }).with_message(message))
}

async fn auto_generate(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<AutoGenerateResponse>> {
    caller.require(Role::FINANCE_STAFF)?;

    let results = state.finance_service.auto_generate(&caller).await?;
    let message = format!(
        "Generated {} annual dues, skipped {}, {} failed",
        results.generated.len(),
        results.skipped.len(),
        results.failed.len()
    );
    Ok(ApiResponse::ok(AutoGenerateResponse { results }).with_message(message))
}

async fn refresh_overdue(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<CountResponse>> {
    caller.require(Role::FINANCE_STAFF)?;

    let count = state.finance_service.refresh_overdue().await?;
    Ok(ApiResponse::ok(CountResponse { count }).with_message("Overdue payments refreshed"))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/overview", get(overview))
        .route("/members/{id}/dues", get(member_dues))
        .route("/payments", get(list_payments).post(create_payment))
        .route("/payments/{id}/pay", patch(mark_paid))
        .route("/bulk-assign", post(bulk_assign))
        .route("/bulk-mark-paid", post(bulk_mark_paid))
        .route("/auto-generate", post(auto_generate))
        .route("/refresh-overdue", post(refresh_overdue))
}
