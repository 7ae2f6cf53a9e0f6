//! API integration tests.
//!
//! Each test drives the full router (auth middleware included) against a
//! mock database primed with exactly the rows the request needs.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
    middleware,
};
use chrono::{NaiveDate, Utc};
use khidmat_api::{
    middleware::{AppState, auth_middleware},
    router as api_router,
};
use khidmat_common::config::{AuthConfig, FinanceConfig};
use khidmat_core::{
    AuthService, DutyChartService, FinanceService, LogMailer, MiqaatService, NotificationService,
    UserService,
};
use khidmat_db::{
    entities::{
        duty_chart::{self, Assignment, MemberRef},
        notification::{self, NotificationType},
        payment::{self, PaymentStatus, PaymentType},
        user::{self, Role, UserStatus},
    },
    repositories::{
        DutyChartRepository, MiqaatRepository, NotificationRepository, PaymentRepository,
        UserRepository,
    },
};
use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
use serde_json::{Value, json};
use tower::ServiceExt;

const ADMIN: &str = "01hv5z8k00000000000000adm1";
const MEMBER: &str = "01hv5z8k00000000000000mem1";
const OTHER: &str = "01hv5z8k00000000000000mem2";
const GHOST: &str = "01hv5z8k00000000000000zzzz";

fn auth_config() -> AuthConfig {
    AuthConfig {
        jwt_secret: "integration-secret".to_string(),
        token_ttl_days: 7,
    }
}

/// Build the router over a primed mock database.
fn create_test_router(db: MockDatabase) -> Router {
    let db = Arc::new(db.into_connection());
    let user_repo = UserRepository::new(Arc::clone(&db));
    let auth_service = AuthService::new(&auth_config());
    let notification_service = NotificationService::new(
        NotificationRepository::new(Arc::clone(&db)),
        user_repo.clone(),
    );

    let state = AppState {
        auth_service: auth_service.clone(),
        user_service: UserService::new(
            user_repo.clone(),
            auth_service,
            Arc::new(LogMailer),
            None,
        ),
        duty_chart_service: DutyChartService::new(
            DutyChartRepository::new(Arc::clone(&db)),
            user_repo.clone(),
            notification_service.clone(),
        ),
        miqaat_service: MiqaatService::new(
            MiqaatRepository::new(Arc::clone(&db)),
            user_repo.clone(),
            notification_service.clone(),
        ),
        notification_service,
        finance_service: FinanceService::new(
            PaymentRepository::new(Arc::clone(&db)),
            user_repo,
            FinanceConfig::default(),
        ),
    };

    api_router()
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}

fn mock_db() -> MockDatabase {
    MockDatabase::new(DatabaseBackend::Postgres)
}

fn create_test_user(id: &str, role: Role) -> user::Model {
    user::Model {
        id: id.to_string(),
        its_id: format!("its-{}", &id[id.len() - 4..]),
        name: "Test".to_string(),
        surname: Some("User".to_string()),
        email: format!("{}@example.com", &id[id.len() - 4..]),
        phone: None,
        password_hash: "hash".to_string(),
        role,
        zone: None,
        designation: None,
        status: UserStatus::Active,
        created_at: NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
            .and_utc()
            .into(),
        updated_at: None,
    }
}

fn token_for(id: &str, role: Role) -> String {
    AuthService::new(&auth_config())
        .issue(&create_test_user(id, role))
        .unwrap()
}

fn create_test_chart(id: &str, members: &[&str]) -> duty_chart::Model {
    let assignments = vec![Assignment {
        location: "Gate 1".to_string(),
        area: Some("North".to_string()),
        task: Some("Crowd control".to_string()),
        officer: Some(MemberRef::Unresolved("Shabbir Bhai".to_string())),
        sub_officer: None,
        team: None,
        members: members
            .iter()
            .map(|m| MemberRef::Resolved((*m).to_string()))
            .collect(),
    }];
    duty_chart::Model {
        id: id.to_string(),
        event_name: "Urs Mubarak".to_string(),
        title: None,
        date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
        reporting_time: "17:30".to_string(),
        dress_code: "White".to_string(),
        in_charge: json!({"kind": "unresolved", "value": "Shaikh Saheb"}),
        captain: None,
        vice_captain: None,
        assignments: serde_json::to_value(assignments).unwrap(),
        remarks: None,
        created_by: ADMIN.to_string(),
        created_at: Utc::now().into(),
        updated_at: None,
    }
}

fn create_test_payment(id: &str, member_id: &str) -> payment::Model {
    payment::Model {
        id: id.to_string(),
        member_id: member_id.to_string(),
        amount: 120_000,
        payment_type: PaymentType::AnnualSubscription,
        status: PaymentStatus::Pending,
        subscription_year: Some("2026-2027".to_string()),
        due_date: NaiveDate::from_ymd_opt(2026, 11, 14).unwrap(),
        paid_date: None,
        receipt_number: None,
        payment_method: None,
        notes: None,
        recorded_by: ADMIN.to_string(),
        created_at: Utc::now().into(),
        updated_at: None,
    }
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let (status, body) = send(
        create_test_router(mock_db()),
        request("GET", "/notifications", None, None),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_invalid_token_matches_missing_token() {
    let (status, body) = send(
        create_test_router(mock_db()),
        request("GET", "/notifications", Some("not-a-jwt"), None),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_member_cannot_create_duty_chart() {
    let token = token_for(MEMBER, Role::Member);
    let (status, body) = send(
        create_test_router(mock_db()),
        request(
            "POST",
            "/dutychart",
            Some(&token),
            Some(json!({
                "eventName": "Urs Mubarak",
                "date": "2026-03-14",
                "reportingTime": "17:30",
                "dressCode": "White",
                "inCharge": "Shaikh Saheb"
            })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_duty_chart_with_unknown_officer_is_rejected() {
    let token = token_for(ADMIN, Role::Admin);
    // The existence check finds the member but not the officer; no insert is primed
    let db = mock_db().append_query_results([[create_test_user(MEMBER, Role::Member)]]);

    let (status, body) = send(
        create_test_router(db),
        request(
            "POST",
            "/dutychart",
            Some(&token),
            Some(json!({
                "eventName": "Urs Mubarak",
                "date": "2026-03-14",
                "reportingTime": "17:30",
                "dressCode": "White",
                "inCharge": "Shaikh Saheb",
                "assignments": [{
                    "location": "Gate 1",
                    "officer": GHOST,
                    "members": [MEMBER]
                }]
            })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MISSING_REFERENCES");
    assert_eq!(body["missing"], json!([GHOST]));
}

#[tokio::test]
async fn test_member_fetching_unassigned_chart_is_forbidden() {
    let token = token_for(MEMBER, Role::Member);
    let db = mock_db().append_query_results([[create_test_chart("c1", &[OTHER])]]);

    let (status, _) = send(
        create_test_router(db),
        request("GET", "/dutychart/c1", Some(&token), None),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_member_fetching_assigned_chart_sees_themself() {
    let token = token_for(MEMBER, Role::Member);
    let db = mock_db()
        .append_query_results([[create_test_chart("c1", &[MEMBER])]])
        .append_query_results([[create_test_user(MEMBER, Role::Member)]]);

    let (status, body) = send(
        create_test_router(db),
        request("GET", "/dutychart/c1", Some(&token), None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let members = &body["dutyChart"]["assignments"][0]["members"];
    assert_eq!(members[0]["id"], MEMBER);
    assert_eq!(body["dutyChart"]["assignments"][0]["officer"], "Shabbir Bhai");
}

#[tokio::test]
async fn test_register_without_required_fields_is_bad_request() {
    let (status, body) = send(
        create_test_router(mock_db()),
        request("POST", "/register", None, Some(json!({"itsId": "1001"}))),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_login_with_unknown_its_id_is_unauthorized() {
    let db = mock_db().append_query_results([Vec::<user::Model>::new()]);

    let (status, _) = send(
        create_test_router(db),
        request(
            "POST",
            "/login",
            None,
            Some(json!({"itsId": "9999", "password": "whatever1"})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bulk_assign_with_one_unknown_member() {
    let token = token_for(ADMIN, Role::Finance);
    let ids = ["m0000001", "m0000002", "m0000003", "m0000004"];

    let mut db = mock_db().append_query_results([ids
        .iter()
        .map(|id| create_test_user(id, Role::Member))
        .collect::<Vec<_>>()]);
    for (i, id) in ids.iter().enumerate() {
        db = db.append_query_results([[create_test_payment(&format!("p{i}"), id)]]);
    }

    let (status, body) = send(
        create_test_router(db),
        request(
            "POST",
            "/finance/bulk-assign",
            Some(&token),
            Some(json!({
                "memberIds": ["m0000001", "m0000002", "ghost", "m0000003", "m0000004"]
            })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"]["succeeded"].as_array().unwrap().len(), 4);
    assert_eq!(
        body["results"]["failed"],
        json!([{"id": "ghost", "reason": "Member not found"}])
    );
}

#[tokio::test]
async fn test_member_cannot_read_finance_overview() {
    let token = token_for(MEMBER, Role::Member);

    let (status, _) = send(
        create_test_router(mock_db()),
        request("GET", "/finance/overview", Some(&token), None),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_mark_read_twice_is_idempotent() {
    let token = token_for(MEMBER, Role::Member);
    let already_read = notification::Model {
        id: "n1".to_string(),
        message: "Gathering tonight".to_string(),
        notification_type: NotificationType::General,
        miqaat_id: None,
        created_by: ADMIN.to_string(),
        for_users: json!([MEMBER, OTHER]),
        read_by: json!([MEMBER]),
        created_at: Utc::now().into(),
    };
    // The guarded update matches no row; the reload shows it read
    let db = mock_db()
        .append_exec_results([MockExecResult {
            last_insert_id: 0,
            rows_affected: 0,
        }])
        .append_query_results([[already_read]]);

    let (status, body) = send(
        create_test_router(db),
        request("PATCH", "/notifications/read/n1", Some(&token), None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["notification"]["read"], true);
}

#[tokio::test]
async fn test_broadcast_without_active_users_reports_nothing_created() {
    let token = token_for(ADMIN, Role::Admin);
    let db = mock_db().append_query_results([Vec::<BTreeMap<&str, sea_orm::Value>>::new()]);

    let (status, body) = send(
        create_test_router(db),
        request(
            "POST",
            "/notifications",
            Some(&token),
            Some(json!({"message": "Hello"})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["notificationId"], Value::Null);
    assert_eq!(body["recipients"], 0);
}

#[tokio::test]
async fn test_unknown_endpoint_returns_404() {
    let response = create_test_router(mock_db())
        .oneshot(request("GET", "/nonexistent/endpoint", None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
