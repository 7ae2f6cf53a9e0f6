//! User entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Access role carried by every account and every issued token.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum Role {
    #[sea_orm(string_value = "SuperAdmin")]
    SuperAdmin,
    #[sea_orm(string_value = "Admin")]
    Admin,
    #[sea_orm(string_value = "Captain")]
    Captain,
    #[sea_orm(string_value = "Finance")]
    Finance,
    #[sea_orm(string_value = "Member")]
    Member,
}

impl Default for Role {
    fn default() -> Self {
        Self::Member
    }
}

impl Role {
    /// Roles allowed to manage rosters, events and members.
    pub const ADMINS: &'static [Self] = &[Self::SuperAdmin, Self::Admin];

    /// Roles allowed to use the dues ledger.
    pub const FINANCE_STAFF: &'static [Self] = &[Self::SuperAdmin, Self::Admin, Self::Finance];

    /// Roles allowed to record attendance on behalf of others.
    pub const ATTENDANCE_STAFF: &'static [Self] = &[Self::SuperAdmin, Self::Admin, Self::Captain];

    /// Roles allowed to browse the member directory.
    pub const STAFF: &'static [Self] = &[
        Self::SuperAdmin,
        Self::Admin,
        Self::Captain,
        Self::Finance,
    ];

    /// Whether this role appears in an allow-set.
    #[must_use]
    pub fn is_in(self, allowed: &[Self]) -> bool {
        allowed.contains(&self)
    }

    /// Whether this role may grant `target` to another account.
    #[must_use]
    pub const fn can_grant(self, target: Self) -> bool {
        match target {
            Self::SuperAdmin | Self::Admin => matches!(self, Self::SuperAdmin),
            Self::Captain | Self::Finance | Self::Member => {
                matches!(self, Self::SuperAdmin | Self::Admin)
            }
        }
    }

    /// Canonical string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SuperAdmin => "SuperAdmin",
            Self::Admin => "Admin",
            Self::Captain => "Captain",
            Self::Finance => "Finance",
            Self::Member => "Member",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "inactive")]
    Inactive,
}

impl Default for UserStatus {
    fn default() -> Self {
        Self::Active
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Organization-issued member number
    #[sea_orm(unique)]
    pub its_id: String,

    pub name: String,

    #[sea_orm(nullable)]
    pub surname: Option<String>,

    #[sea_orm(unique)]
    pub email: String,

    #[sea_orm(nullable)]
    pub phone: Option<String>,

    /// Argon2 password hash
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub role: Role,

    /// Organizational sub-division
    #[sea_orm(nullable)]
    pub zone: Option<String>,

    #[sea_orm(nullable)]
    pub designation: Option<String>,

    pub status: UserStatus,

    /// Registration date; anchors the member's subscription year
    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    /// Whether the account is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::payment::Entity")]
    Payments,
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_allow_sets() {
        assert!(Role::Admin.is_in(Role::ADMINS));
        assert!(!Role::Captain.is_in(Role::ADMINS));
        assert!(Role::Finance.is_in(Role::FINANCE_STAFF));
        assert!(!Role::Member.is_in(Role::FINANCE_STAFF));
        assert!(Role::Captain.is_in(Role::ATTENDANCE_STAFF));
    }

    #[test]
    fn test_role_grants() {
        assert!(Role::SuperAdmin.can_grant(Role::Admin));
        assert!(!Role::Admin.can_grant(Role::Admin));
        assert!(!Role::Admin.can_grant(Role::SuperAdmin));
        assert!(Role::Admin.can_grant(Role::Captain));
        assert!(!Role::Finance.can_grant(Role::Member));
    }

    #[test]
    fn test_role_serde_names() {
        let json = serde_json::to_string(&Role::SuperAdmin).unwrap_or_default();
        assert_eq!(json, "\"SuperAdmin\"");
        let status = serde_json::to_string(&UserStatus::Inactive).unwrap_or_default();
        assert_eq!(status, "\"inactive\"");
    }
}
