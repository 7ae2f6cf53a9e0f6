//! Database integration tests.
//!
//! These tests require a running `PostgreSQL` instance.
//! Run with: `cargo test --test db_integration -- --ignored`
//!
//! Environment variables:
//!   `TEST_DB_HOST` (default: localhost)
//!   `TEST_DB_PORT` (default: 5433)
//!   `TEST_DB_USER` (default: `khidmat_test`)
//!   `TEST_DB_PASSWORD` (default: `khidmat_test`)
//!   `TEST_DB_NAME` (default: `khidmat_test`)

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{NaiveDate, Utc};
use khidmat_common::{AppError, IdGenerator};
use khidmat_db::entities::{duty_chart, notification, user};
use khidmat_db::repositories::{DutyChartRepository, NotificationRepository, UserRepository};
use khidmat_db::test_utils::{TestDatabase, TestDbConfig};
use sea_orm::Set;
use serde_json::json;

fn new_user(ids: &IdGenerator, its_id: &str) -> user::ActiveModel {
    user::ActiveModel {
        id: Set(ids.generate()),
        its_id: Set(its_id.to_string()),
        name: Set("Test".to_string()),
        surname: Set(None),
        email: Set(format!("{its_id}@example.com")),
        phone: Set(None),
        password_hash: Set("hash".to_string()),
        role: Set(user::Role::Member),
        zone: Set(None),
        designation: Set(None),
        status: Set(user::UserStatus::Active),
        created_at: Set(Utc::now().into()),
        updated_at: Set(None),
    }
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_database_connection_and_migrations() {
    let result = TestDatabase::with_config(TestDbConfig::default()).await;
    assert!(result.is_ok(), "Failed to connect: {:?}", result.err());
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_duty_chart_missing_reference_rolls_back() {
    let db = TestDatabase::create_unique().await.expect("Failed to create db");
    let conn = db.shared_connection().await.expect("Failed to connect");
    let ids = IdGenerator::new();

    let users = UserRepository::new(conn.clone());
    let admin = users.create(new_user(&ids, "9001")).await.unwrap();

    let charts = DutyChartRepository::new(conn.clone());
    let ghost = ids.generate();
    let chart_id = ids.generate();
    let result = charts
        .insert_checked(
            duty_chart::ActiveModel {
                id: Set(chart_id.clone()),
                event_name: Set("Urs".to_string()),
                title: Set(None),
                date: Set(NaiveDate::from_ymd_opt(2026, 4, 1).unwrap()),
                reporting_time: Set("18:00".to_string()),
                dress_code: Set("White".to_string()),
                in_charge: Set(json!({"kind": "resolved", "value": admin.id})),
                captain: Set(None),
                vice_captain: Set(None),
                assignments: Set(json!([])),
                remarks: Set(None),
                created_by: Set(admin.id.clone()),
                created_at: Set(Utc::now().into()),
                updated_at: Set(None),
            },
            &[admin.id.clone(), ghost.clone()],
        )
        .await;

    assert!(matches!(result, Err(AppError::MissingReferences(ref m)) if m == &vec![ghost]));
    assert!(charts.find_by_id(&chart_id).await.unwrap().is_none());

    db.drop_database().await.unwrap();
}

fn new_notification(
    ids: &IdGenerator,
    created_by: &str,
    audience: &[String],
) -> notification::ActiveModel {
    notification::ActiveModel {
        id: Set(ids.generate()),
        message: Set("Hello".to_string()),
        notification_type: Set(notification::NotificationType::General),
        miqaat_id: Set(None),
        created_by: Set(created_by.to_string()),
        for_users: Set(json!(audience)),
        read_by: Set(json!([])),
        created_at: Set(Utc::now().into()),
    }
}

async fn create_users(users: &UserRepository, ids: &IdGenerator, count: usize) -> Vec<String> {
    let mut created = Vec::with_capacity(count);
    for n in 0..count {
        let user = users
            .create(new_user(ids, &format!("{}", 10_000 + n)))
            .await
            .unwrap();
        created.push(user.id);
    }
    created
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_notification_audience_queries() {
    let db = TestDatabase::create_unique().await.expect("Failed to create db");
    let conn = db.shared_connection().await.expect("Failed to connect");
    let ids = IdGenerator::new();

    let users = UserRepository::new(conn.clone());
    let audience = create_users(&users, &ids, 2).await;
    let (a, b) = (&audience[0], &audience[1]);

    let repo = NotificationRepository::new(conn.clone());
    let created = repo
        .create(new_notification(&ids, a, &audience))
        .await
        .unwrap();

    assert_eq!(repo.find_for_user(a).await.unwrap().len(), 1);
    assert_eq!(repo.count_unread(a).await.unwrap(), 1);

    assert!(repo.add_reader(&created.id, a).await.unwrap());
    assert!(!repo.add_reader(&created.id, a).await.unwrap());
    assert_eq!(repo.count_unread(a).await.unwrap(), 0);

    assert!(repo.remove_recipient(&created.id, a).await.unwrap());
    assert!(repo.find_for_user(a).await.unwrap().is_empty());
    assert_eq!(repo.find_for_user(b).await.unwrap().len(), 1);

    let stored = repo.get_by_id(&created.id).await.unwrap();
    assert_eq!(stored.recipients().unwrap(), vec![b.clone()]);
    assert!(stored.readers().unwrap().is_empty());

    // Not a recipient any more: reading is a no-op
    assert!(!repo.add_reader(&created.id, a).await.unwrap());

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_concurrent_reads_are_all_kept() {
    let db = TestDatabase::create_unique().await.expect("Failed to create db");
    let conn = db.shared_connection().await.expect("Failed to connect");
    let ids = IdGenerator::new();

    let users = UserRepository::new(conn.clone());
    let audience = create_users(&users, &ids, 40).await;

    let repo = NotificationRepository::new(conn.clone());
    let created = repo
        .create(new_notification(&ids, &audience[0], &audience))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for user_id in audience.clone() {
        let repo = repo.clone();
        let id = created.id.clone();
        handles.push(tokio::spawn(async move { repo.add_reader(&id, &user_id).await }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().unwrap());
    }

    let stored = repo.get_by_id(&created.id).await.unwrap();
    let mut readers = stored.readers().unwrap();
    readers.sort();
    let mut expected = audience;
    expected.sort();
    assert_eq!(readers, expected);

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_concurrent_clears_and_reads_keep_subset() {
    let db = TestDatabase::create_unique().await.expect("Failed to create db");
    let conn = db.shared_connection().await.expect("Failed to connect");
    let ids = IdGenerator::new();

    let users = UserRepository::new(conn.clone());
    let audience = create_users(&users, &ids, 40).await;
    let (clearing, reading) = audience.split_at(20);

    let repo = NotificationRepository::new(conn.clone());
    let created = repo
        .create(new_notification(&ids, &audience[0], &audience))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for (n, user_id) in audience.iter().cloned().enumerate() {
        let repo = repo.clone();
        let id = created.id.clone();
        let clears = n < clearing.len();
        handles.push(tokio::spawn(async move {
            if clears {
                repo.add_reader(&id, &user_id).await?;
                repo.remove_recipient(&id, &user_id).await
            } else {
                repo.add_reader(&id, &user_id).await
            }
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().unwrap());
    }

    let stored = repo.get_by_id(&created.id).await.unwrap();
    let mut recipients = stored.recipients().unwrap();
    recipients.sort();
    let mut readers = stored.readers().unwrap();
    readers.sort();
    let mut expected = reading.to_vec();
    expected.sort();

    assert_eq!(recipients, expected);
    assert_eq!(readers, expected);

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_concurrent_duplicate_registration_is_bad_request() {
    let db = TestDatabase::create_unique().await.expect("Failed to create db");
    let conn = db.shared_connection().await.expect("Failed to connect");
    let ids = IdGenerator::new();

    let users = UserRepository::new(conn.clone());
    let (first, second) = tokio::join!(
        users.create(new_user(&ids, "7001")),
        users.create(new_user(&ids, "7001")),
    );

    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .any(|r| matches!(r, Err(AppError::BadRequest(m)) if m.contains("already exists")))
    );

    db.drop_database().await.unwrap();
}

#[test]
fn test_database_url_format() {
    let config = TestDbConfig {
        host: "testhost".to_string(),
        port: 5432,
        username: "testuser".to_string(),
        password: "testpass".to_string(),
        database: "testdb".to_string(),
    };
    let url = config.database_url();
    assert!(url.starts_with("postgres://"));
    assert!(url.contains("testhost"));
    assert!(url.contains("testdb"));
}
