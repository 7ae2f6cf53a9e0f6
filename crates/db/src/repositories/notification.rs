//! Notification repository.
//!
//! Audiences live in the `for_users` / `read_by` JSONB arrays. Membership
//! queries use `@>` containment so they can use the GIN index.

use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, UpdateMany,
    sea_query::{Expr, SimpleExpr},
};
use serde_json::json;

use crate::entities::{Notification, notification};
use khidmat_common::{AppError, AppResult};

/// `"notification"."<column>" @> '["<user_id>"]'::jsonb`
fn audience_contains(column: &str, user_id: &str) -> SimpleExpr {
    Expr::cust_with_values(
        format!("\"notification\".\"{column}\" @> ?::jsonb"),
        [json!([user_id]).to_string()],
    )
}

/// Notification repository for database operations.
#[derive(Clone)]
pub struct NotificationRepository {
    db: Arc<DatabaseConnection>,
}

impl NotificationRepository {
    /// Create a new notification repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a notification by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<notification::Model>> {
        Notification::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a notification by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<notification::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Notification {id}")))
    }

    /// Create a new notification.
    pub async fn create(&self, model: notification::ActiveModel) -> AppResult<notification::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Notifications currently addressed to a user, newest first.
    pub async fn find_for_user(&self, user_id: &str) -> AppResult<Vec<notification::Model>> {
        Notification::find()
            .filter(audience_contains("for_users", user_id))
            .order_by_desc(notification::Column::CreatedAt)
            .order_by_desc(notification::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count notifications addressed to a user that they have not read.
    pub async fn count_unread(&self, user_id: &str) -> AppResult<u64> {
        Notification::find()
            .filter(audience_contains("for_users", user_id))
            .filter(audience_contains("read_by", user_id).not())
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Add `user_id` to `read_by` if they are a recipient and have not read it.
    ///
    /// One `UPDATE` computes the new array from the stored row, so concurrent
    /// readers of the same broadcast cannot overwrite each other. Returns
    /// whether the row changed.
    pub async fn add_reader(&self, id: &str, user_id: &str) -> AppResult<bool> {
        let result = Notification::update_many()
            .col_expr(notification::Column::ReadBy, append_user("read_by", user_id))
            .filter(notification::Column::Id.eq(id))
            .filter(audience_contains("for_users", user_id))
            .filter(audience_contains("read_by", user_id).not())
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected > 0)
    }

    /// Add `user_id` to `read_by` on every unread notification addressed to
    /// them. Returns how many rows changed.
    pub async fn add_reader_everywhere(&self, user_id: &str) -> AppResult<u64> {
        let result = Notification::update_many()
            .col_expr(notification::Column::ReadBy, append_user("read_by", user_id))
            .filter(audience_contains("for_users", user_id))
            .filter(audience_contains("read_by", user_id).not())
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected)
    }

    /// Remove `user_id` from both `for_users` and `read_by` in one statement,
    /// keeping `read_by` a subset of `for_users`. Returns whether the user
    /// was a recipient.
    pub async fn remove_recipient(&self, id: &str, user_id: &str) -> AppResult<bool> {
        let result = Self::without_user(user_id)
            .filter(notification::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected > 0)
    }

    /// Remove `user_id` from every notification addressed to them. Returns
    /// how many rows changed.
    pub async fn remove_recipient_everywhere(&self, user_id: &str) -> AppResult<u64> {
        let result = Self::without_user(user_id)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected)
    }

    fn without_user(user_id: &str) -> UpdateMany<Notification> {
        Notification::update_many()
            .col_expr(notification::Column::ForUsers, remove_user("for_users", user_id))
            .col_expr(notification::Column::ReadBy, remove_user("read_by", user_id))
            .filter(audience_contains("for_users", user_id))
    }
}

/// `"<column>" || '["<user_id>"]'::jsonb`
fn append_user(column: &str, user_id: &str) -> SimpleExpr {
    Expr::cust_with_values(
        format!("\"{column}\" || ?::jsonb"),
        [json!([user_id]).to_string()],
    )
}

/// `"<column>" - '<user_id>'::text`, dropping every matching array element.
fn remove_user(column: &str, user_id: &str) -> SimpleExpr {
    Expr::cust_with_values(format!("\"{column}\" - ?::text"), [user_id.to_string()])
}
