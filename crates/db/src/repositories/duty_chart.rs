//! Duty chart repository.

use std::sync::Arc;

use chrono::NaiveDate;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, TransactionTrait,
};

use super::user::missing_user_ids;
use crate::entities::{DutyChart, duty_chart};
use khidmat_common::{AppError, AppResult};

/// Date-range filter for listing duty charts. Both bounds are inclusive.
#[derive(Debug, Clone, Copy, Default)]
pub struct DutyChartFilter {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

/// Duty chart repository for database operations.
#[derive(Clone)]
pub struct DutyChartRepository {
    db: Arc<DatabaseConnection>,
}

impl DutyChartRepository {
    /// Create a new duty chart repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a duty chart by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<duty_chart::Model>> {
        DutyChart::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a duty chart by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<duty_chart::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Duty chart {id}")))
    }

    /// List duty charts in a date range, latest event first.
    pub async fn list(&self, filter: DutyChartFilter) -> AppResult<Vec<duty_chart::Model>> {
        let mut condition = Condition::all();
        if let Some(from) = filter.date_from {
            condition = condition.add(duty_chart::Column::Date.gte(from));
        }
        if let Some(to) = filter.date_to {
            condition = condition.add(duty_chart::Column::Date.lte(to));
        }

        DutyChart::find()
            .filter(condition)
            .order_by_desc(duty_chart::Column::Date)
            .order_by_desc(duty_chart::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Insert a chart after confirming every referenced user exists.
    ///
    /// The existence check and the insert share one transaction; if any id in
    /// `referenced` is missing nothing is written and
    /// [`AppError::MissingReferences`] lists the offenders.
    pub async fn insert_checked(
        &self,
        model: duty_chart::ActiveModel,
        referenced: &[String],
    ) -> AppResult<duty_chart::Model> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let missing = missing_user_ids(&txn, referenced).await?;
        if !missing.is_empty() {
            txn.rollback()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            return Err(AppError::MissingReferences(missing));
        }

        let chart = model
            .insert(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(chart)
    }

    /// Update a chart after confirming every referenced user exists.
    ///
    /// Same all-or-nothing contract as [`Self::insert_checked`].
    pub async fn update_checked(
        &self,
        model: duty_chart::ActiveModel,
        referenced: &[String],
    ) -> AppResult<duty_chart::Model> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let missing = missing_user_ids(&txn, referenced).await?;
        if !missing.is_empty() {
            txn.rollback()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            return Err(AppError::MissingReferences(missing));
        }

        let chart = model
            .update(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(chart)
    }

    /// Delete a chart. Returns whether a row was removed.
    pub async fn delete(&self, id: &str) -> AppResult<bool> {
        let result = DutyChart::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected > 0)
    }
}
