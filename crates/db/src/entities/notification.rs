//! Notification entity.
//!
//! One row per broadcast. `for_users` lists everyone who should see it and
//! `read_by` the subset that has read it.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use khidmat_common::{AppError, AppResult};

/// Notification types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    #[sea_orm(string_value = "duty")]
    Duty,
    #[sea_orm(string_value = "miqaat")]
    Miqaat,
    #[sea_orm(string_value = "general")]
    General,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notification")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(column_type = "Text")]
    pub message: String,

    pub notification_type: NotificationType,

    /// Miqaat that triggered this notification
    #[sea_orm(nullable)]
    pub miqaat_id: Option<String>,

    pub created_by: String,

    /// Recipient user ids
    #[sea_orm(column_type = "JsonBinary")]
    pub for_users: Json,

    /// User ids that have read it; always a subset of `for_users`
    #[sea_orm(column_type = "JsonBinary")]
    pub read_by: Json,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// Decode the recipient list.
    pub fn recipients(&self) -> AppResult<Vec<String>> {
        decode_ids(&self.for_users)
    }

    /// Decode the read list.
    pub fn readers(&self) -> AppResult<Vec<String>> {
        decode_ids(&self.read_by)
    }
}

fn decode_ids(value: &Json) -> AppResult<Vec<String>> {
    serde_json::from_value(value.clone())
        .map_err(|e| AppError::Internal(format!("Corrupt notification audience: {e}")))
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::miqaat::Entity",
        from = "Column::MiqaatId",
        to = "super::miqaat::Column::Id",
        on_delete = "SetNull"
    )]
    Miqaat,
}

impl Related<super::miqaat::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Miqaat.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
