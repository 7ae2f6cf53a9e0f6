//! User repository.

use std::sync::Arc;

use crate::entities::{User, user};
use khidmat_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, SqlErr,
    sea_query::{Expr, Func},
};

/// Optional filters for the member directory.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<user::Role>,
    pub zone: Option<String>,
    pub status: Option<user::UserStatus>,
    /// Case-insensitive match on name, surname, email or external ID.
    pub search: Option<String>,
}

/// User repository for database operations.
#[derive(Clone)]
pub struct UserRepository {
    db: Arc<DatabaseConnection>,
}

impl UserRepository {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a user by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<user::Model>> {
        User::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a user by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<user::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::UserNotFound(id.to_string()))
    }

    /// Find users by IDs.
    pub async fn find_by_ids(&self, ids: &[String]) -> AppResult<Vec<user::Model>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        User::find()
            .filter(user::Column::Id.is_in(ids.to_vec()))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a user by external ID number.
    pub async fn find_by_its_id(&self, its_id: &str) -> AppResult<Option<user::Model>> {
        User::find()
            .filter(user::Column::ItsId.eq(its_id))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a user by email (case-insensitive; emails are stored lowercased).
    pub async fn find_by_email(&self, email: &str) -> AppResult<Option<user::Model>> {
        User::find()
            .filter(user::Column::Email.eq(email.to_lowercase()))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a new user. A duplicate external ID or email is a `BadRequest`.
    pub async fn create(&self, model: user::ActiveModel) -> AppResult<user::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(write_error)
    }

    /// Update a user. A duplicate external ID or email is a `BadRequest`.
    pub async fn update(&self, model: user::ActiveModel) -> AppResult<user::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(write_error)
    }

    /// Delete a user. Returns whether a row was removed.
    pub async fn delete(&self, id: &str) -> AppResult<bool> {
        let result = User::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected > 0)
    }

    /// List users matching a filter, newest first.
    pub async fn list(
        &self,
        filter: &UserFilter,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<user::Model>> {
        let mut condition = Condition::all();

        if let Some(role) = filter.role {
            condition = condition.add(user::Column::Role.eq(role));
        }
        if let Some(zone) = &filter.zone {
            condition = condition.add(user::Column::Zone.eq(zone.as_str()));
        }
        if let Some(status) = filter.status {
            condition = condition.add(user::Column::Status.eq(status));
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search.to_lowercase());
            condition = condition.add(
                Condition::any()
                    .add(
                        Expr::expr(Func::lower(Expr::col(user::Column::Name)))
                            .like(pattern.clone()),
                    )
                    .add(
                        Expr::expr(Func::lower(Expr::col(user::Column::Surname)))
                            .like(pattern.clone()),
                    )
                    .add(user::Column::Email.like(pattern))
                    .add(user::Column::ItsId.contains(search)),
            );
        }

        User::find()
            .filter(condition)
            .order_by_desc(user::Column::CreatedAt)
            .offset(offset)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// All active users, oldest registration first.
    pub async fn find_active(&self) -> AppResult<Vec<user::Model>> {
        User::find()
            .filter(user::Column::Status.eq(user::UserStatus::Active))
            .order_by_asc(user::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// IDs of all active users; the notification audience.
    pub async fn find_active_ids(&self) -> AppResult<Vec<String>> {
        User::find()
            .select_only()
            .column(user::Column::Id)
            .filter(user::Column::Status.eq(user::UserStatus::Active))
            .order_by_asc(user::Column::Id)
            .into_tuple::<String>()
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

/// Unique-index violations lose the race against the service's pre-check;
/// report them the same way the pre-check does.
fn write_error(err: DbErr) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            AppError::BadRequest("User with this ITS ID or email already exists".to_string())
        }
        _ => AppError::Database(err.to_string()),
    }
}

/// Return the subset of `ids` that has no matching user row.
///
/// Runs as one batched query on whatever connection it is given, so callers
/// can place it inside a transaction.
pub(crate) async fn missing_user_ids<C: ConnectionTrait>(
    conn: &C,
    ids: &[String],
) -> AppResult<Vec<String>> {
    if ids.is_empty() {
        return Ok(vec![]);
    }

    let found: Vec<String> = User::find()
        .filter(user::Column::Id.is_in(ids.to_vec()))
        .all(conn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?
        .into_iter()
        .map(|u| u.id)
        .collect();

    let mut missing: Vec<String> = Vec::new();
    for id in ids {
        if !found.contains(id) && !missing.contains(id) {
            missing.push(id.clone());
        }
    }
    Ok(missing)
}
