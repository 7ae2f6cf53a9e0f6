//! Duty chart entity.
//!
//! A duty chart is the roster for one event. Its assignments are embedded
//! as a JSONB array; every person field inside it is a [`MemberRef`].

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use khidmat_common::{AppError, AppResult};

/// A person field on a roster.
///
/// Validated once when a chart is written: identifier-shaped input that was
/// found in the user table becomes `Resolved`, anything else is kept verbatim
/// as `Unresolved` and never looked up again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum MemberRef {
    /// Free-form text (a name, "TBD", ...).
    Unresolved(String),
    /// A user id that existed when the chart was written.
    Resolved(String),
}

impl MemberRef {
    /// The user id, if this reference points at a user.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Resolved(id) => Some(id),
            Self::Unresolved(_) => None,
        }
    }

    /// The raw text of this reference.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Resolved(s) | Self::Unresolved(s) => s,
        }
    }
}

/// One location/task row of a duty chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub location: String,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub officer: Option<MemberRef>,
    #[serde(default)]
    pub sub_officer: Option<MemberRef>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub members: Vec<MemberRef>,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "duty_chart")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub event_name: String,

    #[sea_orm(nullable)]
    pub title: Option<String>,

    pub date: Date,

    /// Reporting time as entered, e.g. "18:30"
    pub reporting_time: String,

    pub dress_code: String,

    /// Overall in-charge ([`MemberRef`] as JSON)
    #[sea_orm(column_type = "JsonBinary")]
    pub in_charge: Json,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub captain: Option<Json>,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub vice_captain: Option<Json>,

    /// Ordered list of [`Assignment`]
    #[sea_orm(column_type = "JsonBinary")]
    pub assignments: Json,

    #[sea_orm(column_type = "Text", nullable)]
    pub remarks: Option<String>,

    pub created_by: String,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    /// Decode the in-charge reference.
    pub fn in_charge_ref(&self) -> AppResult<MemberRef> {
        decode(&self.in_charge)
    }

    /// Decode the captain reference.
    pub fn captain_ref(&self) -> AppResult<Option<MemberRef>> {
        self.captain.as_ref().map(decode).transpose()
    }

    /// Decode the vice-captain reference.
    pub fn vice_captain_ref(&self) -> AppResult<Option<MemberRef>> {
        self.vice_captain.as_ref().map(decode).transpose()
    }

    /// Decode the assignment list.
    pub fn assignment_list(&self) -> AppResult<Vec<Assignment>> {
        decode(&self.assignments)
    }

    /// Whether the user appears in any assignment's member list.
    #[must_use]
    pub fn has_member(&self, user_id: &str) -> bool {
        self.assignment_list().is_ok_and(|list| {
            list.iter()
                .any(|a| a.members.iter().any(|m| m.user_id() == Some(user_id)))
        })
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: &Json) -> AppResult<T> {
    serde_json::from_value(value.clone())
        .map_err(|e| AppError::Internal(format!("Corrupt duty chart document: {e}")))
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::CreatedBy",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    Creator,
}

impl ActiveModelBehavior for ActiveModel {}
