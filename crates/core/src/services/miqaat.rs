//! Miqaat service: events and their attendance lists.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use sea_orm::{IntoActiveModel, Set};
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

use super::auth::Claims;
use super::notification::{NotificationMessage, NotificationService};
use khidmat_common::{AppError, AppResult, IdGenerator};
use khidmat_db::{
    entities::{
        miqaat::{self, AttendanceEntry, AttendanceStatus},
        notification::NotificationType,
    },
    repositories::{MiqaatRepository, UserRepository},
};

/// Input for creating a miqaat.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateMiqaatInput {
    #[validate(length(min = 1, max = 256))]
    pub name: String,

    #[validate(length(min = 1, max = 256))]
    pub location: String,

    pub date: NaiveDate,

    #[validate(length(max = 32))]
    pub start_time: Option<String>,

    #[validate(length(max = 4000))]
    pub description: Option<String>,
}

/// Input for updating a miqaat. Absent fields are left alone.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMiqaatInput {
    #[validate(length(min = 1, max = 256))]
    pub name: Option<String>,

    #[validate(length(min = 1, max = 256))]
    pub location: Option<String>,

    pub date: Option<NaiveDate>,

    #[validate(length(max = 32))]
    pub start_time: Option<String>,

    #[validate(length(max = 4000))]
    pub description: Option<String>,
}

/// Staff-side attendance edit.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAttendanceInput {
    pub status: AttendanceStatus,
    #[serde(default)]
    pub check_out: Option<DateTime<Utc>>,
}

/// Listing filters.
#[derive(Debug, Default, Deserialize)]
pub struct MiqaatQuery {
    pub search: Option<String>,
}

/// A miqaat with its attendance list decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MiqaatView {
    pub id: String,
    pub name: String,
    pub location: String,
    pub date: NaiveDate,
    pub start_time: Option<String>,
    pub description: Option<String>,
    pub created_by: String,
    pub attendance: Vec<AttendanceEntry>,
    pub created_at: DateTime<FixedOffset>,
    pub updated_at: Option<DateTime<FixedOffset>>,
}

impl TryFrom<miqaat::Model> for MiqaatView {
    type Error = AppError;

    fn try_from(model: miqaat::Model) -> AppResult<Self> {
        let attendance = model.attendance_list()?;
        Ok(Self {
            id: model.id,
            name: model.name,
            location: model.location,
            date: model.date,
            start_time: model.start_time,
            description: model.description,
            created_by: model.created_by,
            attendance,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

/// Result of creating a miqaat.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedMiqaat {
    pub miqaat: MiqaatView,
    /// Whether the announcement reached anyone
    pub notification_sent: bool,
}

/// Result of a self-registration.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub entry: AttendanceEntry,
    pub already_registered: bool,
}

/// Miqaat service for business logic.
#[derive(Clone)]
pub struct MiqaatService {
    miqaat_repo: MiqaatRepository,
    user_repo: UserRepository,
    notifications: NotificationService,
    id_gen: IdGenerator,
}

impl MiqaatService {
    /// Create a new miqaat service.
    #[must_use]
    pub const fn new(
        miqaat_repo: MiqaatRepository,
        user_repo: UserRepository,
        notifications: NotificationService,
    ) -> Self {
        Self {
            miqaat_repo,
            user_repo,
            notifications,
            id_gen: IdGenerator::new(),
        }
    }

    /// Create a miqaat and announce it. The announcement is best effort.
    pub async fn create(&self, actor: &Claims, input: CreateMiqaatInput) -> AppResult<CreatedMiqaat> {
        input.validate()?;

        let model = miqaat::ActiveModel {
            id: Set(self.id_gen.generate()),
            name: Set(input.name.trim().to_string()),
            location: Set(input.location.trim().to_string()),
            date: Set(input.date),
            start_time: Set(input.start_time),
            description: Set(input.description),
            created_by: Set(actor.sub.clone()),
            attendance: Set(json!([])),
            created_at: Set(Utc::now().into()),
            updated_at: Set(None),
        };

        let created = self.miqaat_repo.create(model).await?;
        tracing::info!(miqaat_id = %created.id, created_by = %actor.sub, "Miqaat created");

        let message = NotificationMessage::Structured {
            text: format!(
                "New miqaat: {} at {} on {}",
                created.name, created.location, created.date
            ),
            miqaat_id: Some(created.id.clone()),
        };
        let notification_sent = self
            .notifications
            .broadcast_best_effort(NotificationType::Miqaat, message, &actor.sub)
            .await
            .is_some();

        Ok(CreatedMiqaat {
            miqaat: created.try_into()?,
            notification_sent,
        })
    }

    /// List miqaats, latest first.
    pub async fn list(&self, query: &MiqaatQuery) -> AppResult<Vec<MiqaatView>> {
        self.miqaat_repo
            .list(query.search.as_deref())
            .await?
            .into_iter()
            .map(MiqaatView::try_from)
            .collect()
    }

    pub async fn get(&self, id: &str) -> AppResult<MiqaatView> {
        self.miqaat_repo.get_by_id(id).await?.try_into()
    }

    /// Update event details. Attendance is never touched here.
    pub async fn update(
        &self,
        actor: &Claims,
        id: &str,
        input: UpdateMiqaatInput,
    ) -> AppResult<MiqaatView> {
        input.validate()?;

        let mut active = self.miqaat_repo.get_by_id(id).await?.into_active_model();

        if let Some(name) = input.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(location) = input.location {
            active.location = Set(location.trim().to_string());
        }
        if let Some(date) = input.date {
            active.date = Set(date);
        }
        if let Some(start_time) = input.start_time {
            active.start_time = Set(Some(start_time));
        }
        if let Some(description) = input.description {
            active.description = Set(Some(description));
        }
        active.updated_at = Set(Some(Utc::now().into()));

        let updated = self.miqaat_repo.update(active).await?;
        tracing::info!(miqaat_id = %id, updated_by = %actor.sub, "Miqaat updated");
        updated.try_into()
    }

    pub async fn delete(&self, actor: &Claims, id: &str) -> AppResult<()> {
        if !self.miqaat_repo.delete(id).await? {
            return Err(AppError::NotFound(format!("Miqaat {id}")));
        }
        tracing::info!(miqaat_id = %id, deleted_by = %actor.sub, "Miqaat deleted");
        Ok(())
    }

    /// Register the caller as present. Registering twice is not an error and
    /// never adds a second entry.
    pub async fn register_attendance(&self, caller: &Claims, id: &str) -> AppResult<Registration> {
        let member_id = caller.sub.clone();
        let (_, registration) = self
            .miqaat_repo
            .modify_attendance(id, move |list| {
                if let Some(existing) = list.iter().find(|a| a.member_id == member_id) {
                    return Ok(Registration {
                        entry: existing.clone(),
                        already_registered: true,
                    });
                }

                let entry = AttendanceEntry {
                    member_id,
                    status: AttendanceStatus::Present,
                    check_in: Some(Utc::now()),
                    check_out: None,
                };
                list.push(entry.clone());
                Ok(Registration {
                    entry,
                    already_registered: false,
                })
            })
            .await?;

        if registration.already_registered {
            tracing::debug!(miqaat_id = %id, member_id = %caller.sub, "Attendance already registered");
        } else {
            tracing::info!(miqaat_id = %id, member_id = %caller.sub, "Attendance registered");
        }
        Ok(registration)
    }

    /// Set a member's attendance status, creating the entry if needed.
    pub async fn set_attendance(
        &self,
        actor: &Claims,
        id: &str,
        member_id: &str,
        input: SetAttendanceInput,
    ) -> AppResult<AttendanceEntry> {
        self.user_repo.get_by_id(member_id).await?;

        let target = member_id.to_string();
        let (_, entry) = self
            .miqaat_repo
            .modify_attendance(id, move |list| {
                let position = list.iter().position(|a| a.member_id == target);
                let entry = match position {
                    Some(i) => &mut list[i],
                    None => {
                        list.push(AttendanceEntry {
                            member_id: target,
                            status: input.status,
                            check_in: None,
                            check_out: None,
                        });
                        let last = list.len() - 1;
                        &mut list[last]
                    }
                };

                entry.status = input.status;
                if entry.status != AttendanceStatus::Absent && entry.check_in.is_none() {
                    entry.check_in = Some(Utc::now());
                }
                if input.check_out.is_some() {
                    entry.check_out = input.check_out;
                }
                Ok(entry.clone())
            })
            .await?;

        tracing::info!(
            miqaat_id = %id,
            member_id = %member_id,
            status = ?entry.status,
            updated_by = %actor.sub,
            "Attendance set"
        );
        Ok(entry)
    }

    /// Stamp the caller's check-out time.
    pub async fn checkout(&self, caller: &Claims, id: &str) -> AppResult<AttendanceEntry> {
        let member_id = caller.sub.clone();
        let (_, entry) = self
            .miqaat_repo
            .modify_attendance(id, move |list| {
                let entry = list
                    .iter_mut()
                    .find(|a| a.member_id == member_id)
                    .ok_or_else(|| {
                        AppError::BadRequest("You are not registered for this miqaat".to_string())
                    })?;
                if entry.check_out.is_some() {
                    return Err(AppError::BadRequest("Already checked out".to_string()));
                }
                entry.check_out = Some(Utc::now());
                Ok(entry.clone())
            })
            .await?;

        tracing::info!(miqaat_id = %id, member_id = %caller.sub, "Checked out");
        Ok(entry)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use khidmat_db::entities::{notification, user::Role};
    use khidmat_db::repositories::NotificationRepository;
    use khidmat_db::test_utils::logged_statements;
    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase, Value};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn service(db: MockDatabase) -> MiqaatService {
        service_with_log(db).0
    }

    fn service_with_log(db: MockDatabase) -> (MiqaatService, Arc<DatabaseConnection>) {
        let conn = Arc::new(db.into_connection());
        let users = UserRepository::new(conn.clone());
        let service = MiqaatService::new(
            MiqaatRepository::new(conn.clone()),
            users.clone(),
            NotificationService::new(NotificationRepository::new(conn.clone()), users),
        );
        (service, conn)
    }

    fn claims(sub: &str, role: Role) -> Claims {
        Claims {
            sub: sub.to_string(),
            role,
            iat: 0,
            exp: i64::MAX,
        }
    }

    fn create_test_miqaat(id: &str, attendance: serde_json::Value) -> miqaat::Model {
        miqaat::Model {
            id: id.to_string(),
            name: "Annual Gathering".to_string(),
            location: "Main Hall".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
            start_time: Some("19:00".to_string()),
            description: None,
            created_by: "admin".to_string(),
            attendance,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    fn present(member_id: &str) -> serde_json::Value {
        json!({"memberId": member_id, "status": "Present", "checkIn": "2026-05-01T19:05:00Z", "checkOut": null})
    }

    #[tokio::test]
    async fn test_create_announces_with_miqaat_id() {
        let announced = notification::Model {
            id: "n1".to_string(),
            message: "New miqaat".to_string(),
            notification_type: NotificationType::Miqaat,
            miqaat_id: Some("e1".to_string()),
            created_by: "admin".to_string(),
            for_users: json!(["u1", "u2"]),
            read_by: json!([]),
            created_at: Utc::now().into(),
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[create_test_miqaat("e1", json!([]))]])
            .append_query_results([vec![
                BTreeMap::from([("id", sea_orm::Value::from("u1".to_string()))]),
                BTreeMap::from([("id", sea_orm::Value::from("u2".to_string()))]),
            ]])
            .append_query_results([[announced]]);
        let (svc, conn) = service_with_log(db);

        let created = svc
            .create(
                &claims("admin", Role::Admin),
                CreateMiqaatInput {
                    name: "Annual Gathering".to_string(),
                    location: "Main Hall".to_string(),
                    date: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
                    start_time: Some("19:00".to_string()),
                    description: None,
                },
            )
            .await
            .unwrap();

        drop(svc);

        assert_eq!(created.miqaat.id, "e1");
        assert!(created.notification_sent);

        let statements = logged_statements(conn);
        assert_eq!(statements.len(), 3);
        let insert = &statements[2];
        assert!(insert.sql.starts_with("INSERT INTO \"notification\""));
        let values = &insert.values.as_ref().unwrap().0;
        assert!(values.contains(&Value::from("miqaat".to_string())));
        assert!(values.contains(&Value::from(Some("e1".to_string()))));
        assert!(values.contains(&Value::from(json!(["u1", "u2"]))));
        assert!(values.contains(&Value::from(json!([]))));
    }

    #[tokio::test]
    async fn test_create_survives_fan_out_failure() {
        // Audience query is not mocked and fails
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[create_test_miqaat("e1", json!([]))]]);

        let created = service(db)
            .create(
                &claims("admin", Role::Admin),
                CreateMiqaatInput {
                    name: "Annual Gathering".to_string(),
                    location: "Main Hall".to_string(),
                    date: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
                    start_time: None,
                    description: None,
                },
            )
            .await
            .unwrap();

        assert!(!created.notification_sent);
    }

    #[tokio::test]
    async fn test_register_attendance_appends_present() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[create_test_miqaat("e1", json!([]))]])
            .append_query_results([[create_test_miqaat("e1", json!([present("m1")]))]]);

        let registration = service(db)
            .register_attendance(&claims("m1", Role::Member), "e1")
            .await
            .unwrap();

        assert!(!registration.already_registered);
        assert_eq!(registration.entry.status, AttendanceStatus::Present);
        assert!(registration.entry.check_in.is_some());
    }

    #[tokio::test]
    async fn test_register_attendance_twice_is_idempotent() {
        // No update result mocked: a second append would fail
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[create_test_miqaat("e1", json!([present("m1")]))]]);

        let registration = service(db)
            .register_attendance(&claims("m1", Role::Member), "e1")
            .await
            .unwrap();

        assert!(registration.already_registered);
        assert_eq!(registration.entry.member_id, "m1");
    }

    #[tokio::test]
    async fn test_checkout_requires_registration() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[create_test_miqaat("e1", json!([present("m2")]))]]);

        let result = service(db)
            .checkout(&claims("m1", Role::Member), "e1")
            .await;

        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_set_attendance_unknown_member() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<khidmat_db::entities::user::Model>::new()]);

        let result = service(db)
            .set_attendance(
                &claims("captain", Role::Captain),
                "e1",
                "ghost",
                SetAttendanceInput {
                    status: AttendanceStatus::Late,
                    check_out: None,
                },
            )
            .await;

        assert!(matches!(result, Err(AppError::UserNotFound(_))));
    }

    #[test]
    fn test_view_decodes_attendance() {
        let view = MiqaatView::try_from(create_test_miqaat("e1", json!([present("m1")]))).unwrap();
        assert_eq!(view.attendance.len(), 1);
        assert_eq!(view.attendance[0].member_id, "m1");
    }
}
