//! Payment (dues ledger) entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Payment lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "Pending")]
    Pending,
    #[sea_orm(string_value = "Paid")]
    Paid,
    #[sea_orm(string_value = "Overdue")]
    Overdue,
}

/// What a payment is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "camelCase")]
pub enum PaymentType {
    #[sea_orm(string_value = "annualSubscription")]
    AnnualSubscription,
    #[sea_orm(string_value = "donation")]
    Donation,
    #[sea_orm(string_value = "event")]
    Event,
    #[sea_orm(string_value = "other")]
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payment")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(indexed)]
    pub member_id: String,

    /// Amount in minor currency units
    pub amount: i64,

    pub payment_type: PaymentType,

    pub status: PaymentStatus,

    /// Subscription year label, e.g. "2025-2026"
    #[sea_orm(nullable)]
    pub subscription_year: Option<String>,

    pub due_date: Date,

    #[sea_orm(nullable)]
    pub paid_date: Option<DateTimeWithTimeZone>,

    #[sea_orm(unique, nullable)]
    pub receipt_number: Option<String>,

    #[sea_orm(nullable)]
    pub payment_method: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,

    pub recorded_by: String,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    /// Whether this payment still counts as outstanding.
    #[must_use]
    pub const fn is_outstanding(&self) -> bool {
        matches!(self.status, PaymentStatus::Pending | PaymentStatus::Overdue)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::MemberId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    Member,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Member.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
