//! Miqaat repository.

use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, Condition, DatabaseConnection, EntityTrait, IntoActiveModel,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
    sea_query::{Expr, Func},
};

use crate::entities::{Miqaat, miqaat};
use khidmat_common::{AppError, AppResult};

/// Miqaat repository for database operations.
#[derive(Clone)]
pub struct MiqaatRepository {
    db: Arc<DatabaseConnection>,
}

impl MiqaatRepository {
    /// Create a new miqaat repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a miqaat by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<miqaat::Model>> {
        Miqaat::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a miqaat by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<miqaat::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Miqaat {id}")))
    }

    /// List miqaats, latest first, optionally matching `search` against
    /// name or location.
    pub async fn list(&self, search: Option<&str>) -> AppResult<Vec<miqaat::Model>> {
        let mut query = Miqaat::find();

        if let Some(term) = search.map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", term.to_lowercase());
            query = query.filter(
                Condition::any()
                    .add(
                        Expr::expr(Func::lower(Expr::col(miqaat::Column::Name)))
                            .like(pattern.clone()),
                    )
                    .add(
                        Expr::expr(Func::lower(Expr::col(miqaat::Column::Location)))
                            .like(pattern),
                    ),
            );
        }

        query
            .order_by_desc(miqaat::Column::Date)
            .order_by_desc(miqaat::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a new miqaat.
    pub async fn create(&self, model: miqaat::ActiveModel) -> AppResult<miqaat::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Update a miqaat.
    pub async fn update(&self, model: miqaat::ActiveModel) -> AppResult<miqaat::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete a miqaat. Returns whether a row was removed.
    pub async fn delete(&self, id: &str) -> AppResult<bool> {
        let result = Miqaat::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected > 0)
    }

    /// Read-modify-write the attendance list of one miqaat.
    ///
    /// The row is locked for the duration of `apply`, so two concurrent
    /// registrations for the same member cannot both append. The list is
    /// only written back if `apply` changed it.
    pub async fn modify_attendance<T, F>(&self, id: &str, apply: F) -> AppResult<(miqaat::Model, T)>
    where
        F: FnOnce(&mut Vec<miqaat::AttendanceEntry>) -> AppResult<T> + Send,
        T: Send,
    {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let event = Miqaat::find_by_id(id)
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .ok_or_else(|| AppError::NotFound(format!("Miqaat {id}")))?;

        let before = event.attendance_list()?;
        let mut entries = before.clone();
        let outcome = apply(&mut entries)?;

        if entries == before {
            txn.commit()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            return Ok((event, outcome));
        }

        let attendance = serde_json::to_value(&entries)
            .map_err(|e| AppError::Internal(format!("Failed to encode attendance: {e}")))?;

        let mut active = event.into_active_model();
        active.attendance = Set(attendance);
        active.updated_at = Set(Some(chrono::Utc::now().into()));
        let updated = active
            .update(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok((updated, outcome))
    }
}
