//! Payment repository.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, sea_query::Expr,
};

use crate::entities::{Payment, payment};
use khidmat_common::{AppError, AppResult};

/// Optional filters for listing payments.
#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub member_id: Option<String>,
    pub status: Option<payment::PaymentStatus>,
    pub payment_type: Option<payment::PaymentType>,
    pub subscription_year: Option<String>,
}

/// Payment repository for database operations.
#[derive(Clone)]
pub struct PaymentRepository {
    db: Arc<DatabaseConnection>,
}

impl PaymentRepository {
    /// Create a new payment repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a payment by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<payment::Model>> {
        Payment::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a payment by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<payment::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Payment {id}")))
    }

    /// Create a new payment.
    pub async fn create(&self, model: payment::ActiveModel) -> AppResult<payment::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Update a payment.
    pub async fn update(&self, model: payment::ActiveModel) -> AppResult<payment::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// List payments matching a filter, most recent due date first.
    pub async fn list(&self, filter: &PaymentFilter) -> AppResult<Vec<payment::Model>> {
        let mut condition = Condition::all();

        if let Some(member_id) = &filter.member_id {
            condition = condition.add(payment::Column::MemberId.eq(member_id.as_str()));
        }
        if let Some(status) = filter.status {
            condition = condition.add(payment::Column::Status.eq(status));
        }
        if let Some(payment_type) = filter.payment_type {
            condition = condition.add(payment::Column::PaymentType.eq(payment_type));
        }
        if let Some(year) = &filter.subscription_year {
            condition = condition.add(payment::Column::SubscriptionYear.eq(year.as_str()));
        }

        Payment::find()
            .filter(condition)
            .order_by_desc(payment::Column::DueDate)
            .order_by_desc(payment::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Payment history of one member.
    pub async fn find_by_member(&self, member_id: &str) -> AppResult<Vec<payment::Model>> {
        self.list(&PaymentFilter {
            member_id: Some(member_id.to_string()),
            ..PaymentFilter::default()
        })
        .await
    }

    /// Every payment row; the overview aggregates these in memory.
    pub async fn find_all(&self) -> AppResult<Vec<payment::Model>> {
        self.list(&PaymentFilter::default()).await
    }

    /// Whether a member already has an annual subscription for `year`.
    pub async fn has_annual_subscription(&self, member_id: &str, year: &str) -> AppResult<bool> {
        let count = Payment::find()
            .filter(payment::Column::MemberId.eq(member_id))
            .filter(payment::Column::PaymentType.eq(payment::PaymentType::AnnualSubscription))
            .filter(payment::Column::SubscriptionYear.eq(year))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(count > 0)
    }

    /// Move every pending payment due before `today` to overdue.
    /// Returns the number of rows changed.
    pub async fn mark_overdue(&self, today: NaiveDate) -> AppResult<u64> {
        let result = Payment::update_many()
            .col_expr(
                payment::Column::Status,
                Expr::value(payment::PaymentStatus::Overdue),
            )
            .col_expr(
                payment::Column::UpdatedAt,
                Expr::value(Some(sea_orm::prelude::DateTimeWithTimeZone::from(Utc::now()))),
            )
            .filter(payment::Column::Status.eq(payment::PaymentStatus::Pending))
            .filter(payment::Column::DueDate.lt(today))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn create_test_payment(id: &str, status: payment::PaymentStatus) -> payment::Model {
        payment::Model {
            id: id.to_string(),
            member_id: "m1".to_string(),
            amount: 120_000,
            payment_type: payment::PaymentType::AnnualSubscription,
            status,
            subscription_year: Some("2025-2026".to_string()),
            due_date: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            paid_date: None,
            receipt_number: None,
            payment_method: None,
            notes: None,
            recorded_by: "fin".to_string(),
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_find_by_member() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[
                    create_test_payment("p1", payment::PaymentStatus::Pending),
                    create_test_payment("p2", payment::PaymentStatus::Paid),
                ]])
                .into_connection(),
        );

        let repo = PaymentRepository::new(db);
        let payments = repo.find_by_member("m1").await.unwrap();

        assert_eq!(payments.len(), 2);
        assert!(payments[0].is_outstanding());
        assert!(!payments[1].is_outstanding());
    }

    #[tokio::test]
    async fn test_get_by_id_not_found() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<payment::Model>::new()])
                .into_connection(),
        );

        let repo = PaymentRepository::new(db);
        let result = repo.get_by_id("missing").await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_mark_overdue_reports_rows() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 3,
                }])
                .into_connection(),
        );

        let repo = PaymentRepository::new(db);
        let changed = repo
            .mark_overdue(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap())
            .await
            .unwrap();

        assert_eq!(changed, 3);
    }
}
