//! User service: registration, login and member administration.

use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use rand::{Rng, distributions::Alphanumeric};
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::auth::{AuthService, Claims};
use super::mail::{Mailer, welcome_email};
use khidmat_common::{AppError, AppResult, IdGenerator};
use khidmat_db::{
    entities::user::{self, Role, UserStatus},
    repositories::{UserFilter, UserRepository},
};

/// Length of generated initial passwords.
const GENERATED_PASSWORD_LEN: usize = 12;

/// The subset of a user shown wherever another record refers to them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub name: String,
    pub surname: Option<String>,
    pub its_id: String,
    pub role: Role,
}

impl From<&user::Model> for UserSummary {
    fn from(user: &user::Model) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            surname: user.surname.clone(),
            its_id: user.its_id.clone(),
            role: user.role,
        }
    }
}

/// Input for self-registration.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInput {
    #[validate(length(min = 1, max = 32))]
    pub its_id: String,

    #[validate(length(min = 1, max = 256))]
    pub name: String,

    #[validate(length(max = 256))]
    pub surname: Option<String>,

    #[validate(email)]
    pub email: String,

    #[validate(length(min = 8, max = 128))]
    pub password: String,

    #[validate(length(max = 32))]
    pub phone: Option<String>,

    #[validate(length(max = 128))]
    pub zone: Option<String>,

    #[validate(length(max = 128))]
    pub designation: Option<String>,
}

/// Input for administrative member creation.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateMemberInput {
    #[validate(length(min = 1, max = 32))]
    pub its_id: String,

    #[validate(length(min = 1, max = 256))]
    pub name: String,

    #[validate(length(max = 256))]
    pub surname: Option<String>,

    #[validate(email)]
    pub email: String,

    /// Generated when absent.
    #[validate(length(min = 8, max = 128))]
    pub password: Option<String>,

    #[validate(length(max = 32))]
    pub phone: Option<String>,

    #[validate(length(max = 128))]
    pub zone: Option<String>,

    #[validate(length(max = 128))]
    pub designation: Option<String>,

    pub role: Option<Role>,
}

/// Login credentials.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginInput {
    #[validate(length(min = 1))]
    pub its_id: String,

    #[validate(length(min = 1))]
    pub password: String,
}

/// Input for an administrative profile edit.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserInput {
    #[validate(length(min = 1, max = 256))]
    pub name: Option<String>,

    #[validate(length(max = 256))]
    pub surname: Option<String>,

    #[validate(email)]
    pub email: Option<String>,

    #[validate(length(max = 32))]
    pub phone: Option<String>,

    #[validate(length(max = 128))]
    pub zone: Option<String>,

    #[validate(length(max = 128))]
    pub designation: Option<String>,

    pub role: Option<Role>,

    pub status: Option<UserStatus>,
}

/// Input for a self-service password change.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordInput {
    #[validate(length(min = 1))]
    pub current_password: String,

    #[validate(length(min = 8, max = 128))]
    pub new_password: String,
}

/// Successful login.
#[derive(Debug, Serialize)]
pub struct LoginOutput {
    pub token: String,
    pub user: user::Model,
}

/// Result of administrative member creation.
#[derive(Debug)]
pub struct CreatedMember {
    pub user: user::Model,
    /// Welcome email failure, if any. The account exists regardless.
    pub email_error: Option<String>,
}

/// User service for business logic.
#[derive(Clone)]
pub struct UserService {
    user_repo: UserRepository,
    auth: AuthService,
    mailer: Arc<dyn Mailer>,
    login_url: Option<String>,
    id_gen: IdGenerator,
}

impl UserService {
    /// Create a new user service.
    #[must_use]
    pub fn new(
        user_repo: UserRepository,
        auth: AuthService,
        mailer: Arc<dyn Mailer>,
        login_url: Option<String>,
    ) -> Self {
        Self {
            user_repo,
            auth,
            mailer,
            login_url,
            id_gen: IdGenerator::new(),
        }
    }

    /// Self-registration. The account always gets the `Member` role.
    pub async fn register(&self, input: RegisterInput) -> AppResult<user::Model> {
        input.validate()?;
        self.ensure_unique(&input.its_id, &input.email).await?;

        let password_hash = hash_password(&input.password)?;
        let model = user::ActiveModel {
            id: Set(self.id_gen.generate()),
            its_id: Set(input.its_id.trim().to_string()),
            name: Set(input.name.trim().to_string()),
            surname: Set(input.surname),
            email: Set(input.email.trim().to_lowercase()),
            phone: Set(input.phone),
            password_hash: Set(password_hash),
            role: Set(Role::Member),
            zone: Set(input.zone),
            designation: Set(input.designation),
            status: Set(UserStatus::Active),
            created_at: Set(chrono::Utc::now().into()),
            updated_at: Set(None),
        };

        let user = self.user_repo.create(model).await?;
        tracing::info!(user_id = %user.id, its_id = %user.its_id, "Member registered");
        Ok(user)
    }

    /// Administrative member creation followed by a best-effort welcome email.
    pub async fn create_member(
        &self,
        actor: &Claims,
        input: CreateMemberInput,
    ) -> AppResult<CreatedMember> {
        input.validate()?;

        let role = input.role.unwrap_or_default();
        if !actor.role.can_grant(role) {
            return Err(AppError::Forbidden(format!(
                "Role {} may not create {role} accounts",
                actor.role
            )));
        }

        self.ensure_unique(&input.its_id, &input.email).await?;

        let password = input.password.unwrap_or_else(generate_password);
        let model = user::ActiveModel {
            id: Set(self.id_gen.generate()),
            its_id: Set(input.its_id.trim().to_string()),
            name: Set(input.name.trim().to_string()),
            surname: Set(input.surname),
            email: Set(input.email.trim().to_lowercase()),
            phone: Set(input.phone),
            password_hash: Set(hash_password(&password)?),
            role: Set(role),
            zone: Set(input.zone),
            designation: Set(input.designation),
            status: Set(UserStatus::Active),
            created_at: Set(chrono::Utc::now().into()),
            updated_at: Set(None),
        };

        let user = self.user_repo.create(model).await?;
        tracing::info!(user_id = %user.id, created_by = %actor.sub, role = %role, "Member created");

        let (subject, text, html) =
            welcome_email(&user.name, &user.its_id, &password, self.login_url.as_deref());
        let email_error = match self.mailer.send(&user.email, &subject, &text, &html).await {
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(user_id = %user.id, error = %e, "Welcome email failed");
                Some(e.to_string())
            }
        };

        Ok(CreatedMember { user, email_error })
    }

    /// Exchange external ID and password for a token.
    pub async fn login(&self, input: LoginInput) -> AppResult<LoginOutput> {
        input.validate()?;

        let user = self
            .user_repo
            .find_by_its_id(input.its_id.trim())
            .await?
            .ok_or(AppError::Unauthorized)?;

        if !verify_password(&input.password, &user.password_hash)? {
            return Err(AppError::Unauthorized);
        }

        if !user.is_active() {
            return Err(AppError::Forbidden("Account is inactive".to_string()));
        }

        let token = self.auth.issue(&user)?;
        tracing::debug!(user_id = %user.id, "Login succeeded");
        Ok(LoginOutput { token, user })
    }

    /// Get a user by ID.
    pub async fn get(&self, id: &str) -> AppResult<user::Model> {
        self.user_repo.get_by_id(id).await
    }

    /// Member directory.
    pub async fn list(
        &self,
        filter: &UserFilter,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<user::Model>> {
        self.user_repo.list(filter, limit, offset).await
    }

    /// Administrative profile edit.
    pub async fn update(
        &self,
        actor: &Claims,
        id: &str,
        input: UpdateUserInput,
    ) -> AppResult<user::Model> {
        input.validate()?;

        let user = self.user_repo.get_by_id(id).await?;
        ensure_may_manage(actor, &user)?;

        if let Some(role) = input
            .role
            .filter(|r| *r != user.role && !actor.role.can_grant(*r))
        {
            return Err(AppError::Forbidden(format!(
                "Role {} may not grant {role}",
                actor.role
            )));
        }

        if let Some(email) = &input.email {
            let email = email.trim().to_lowercase();
            if email != user.email && self.user_repo.find_by_email(&email).await?.is_some() {
                return Err(AppError::BadRequest(
                    "User with this email already exists".to_string(),
                ));
            }
        }

        let mut active: user::ActiveModel = user.into();

        if let Some(name) = input.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(surname) = input.surname {
            active.surname = Set(Some(surname));
        }
        if let Some(email) = input.email {
            active.email = Set(email.trim().to_lowercase());
        }
        if let Some(phone) = input.phone {
            active.phone = Set(Some(phone));
        }
        if let Some(zone) = input.zone {
            active.zone = Set(Some(zone));
        }
        if let Some(designation) = input.designation {
            active.designation = Set(Some(designation));
        }
        if let Some(role) = input.role {
            active.role = Set(role);
        }
        if let Some(status) = input.status {
            active.status = Set(status);
        }

        active.updated_at = Set(Some(chrono::Utc::now().into()));

        self.user_repo.update(active).await
    }

    /// Self-service password change.
    pub async fn change_password(&self, user_id: &str, input: ChangePasswordInput) -> AppResult<()> {
        input.validate()?;

        let user = self.user_repo.get_by_id(user_id).await?;
        if !verify_password(&input.current_password, &user.password_hash)? {
            return Err(AppError::BadRequest(
                "Current password is incorrect".to_string(),
            ));
        }

        let mut active: user::ActiveModel = user.into();
        active.password_hash = Set(hash_password(&input.new_password)?);
        active.updated_at = Set(Some(chrono::Utc::now().into()));
        self.user_repo.update(active).await?;

        tracing::info!(user_id = %user_id, "Password changed");
        Ok(())
    }

    /// Hard delete. References held by charts and events are left in place.
    pub async fn delete(&self, actor: &Claims, id: &str) -> AppResult<()> {
        if actor.sub == id {
            return Err(AppError::BadRequest(
                "You cannot delete your own account".to_string(),
            ));
        }

        let user = self.user_repo.get_by_id(id).await?;
        ensure_may_manage(actor, &user)?;

        self.user_repo.delete(id).await?;
        tracing::info!(user_id = %id, deleted_by = %actor.sub, "User deleted");
        Ok(())
    }

    async fn ensure_unique(&self, its_id: &str, email: &str) -> AppResult<()> {
        if self.user_repo.find_by_its_id(its_id.trim()).await?.is_some() {
            return Err(AppError::BadRequest(
                "User with this ITS ID already exists".to_string(),
            ));
        }
        if self.user_repo.find_by_email(email.trim()).await?.is_some() {
            return Err(AppError::BadRequest(
                "User with this email already exists".to_string(),
            ));
        }
        Ok(())
    }
}

/// Only a SuperAdmin may manage Admin and SuperAdmin accounts.
fn ensure_may_manage(actor: &Claims, target: &user::Model) -> AppResult<()> {
    if actor.role.can_grant(target.role) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "Role {} may not manage {} accounts",
            actor.role, target.role
        )))
    }
}

fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

/// Hash a password using Argon2.
fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {e}")))
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| AppError::Internal(format!("Invalid hash: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::mail::{LogMailer, MessageId, SendError};
    use async_trait::async_trait;
    use chrono::Utc;
    use khidmat_common::config::AuthConfig;
    use sea_orm::{DatabaseBackend, MockDatabase};

    struct FailingMailer;

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send(
            &self,
            _recipient: &str,
            _subject: &str,
            _text_body: &str,
            _html_body: &str,
        ) -> Result<MessageId, SendError> {
            Err(SendError::Transport("connection refused".to_string()))
        }
    }

    fn auth() -> AuthService {
        AuthService::new(&AuthConfig {
            jwt_secret: "test-secret".to_string(),
            token_ttl_days: 7,
        })
    }

    fn service(db: MockDatabase, mailer: Arc<dyn Mailer>) -> UserService {
        let repo = UserRepository::new(Arc::new(db.into_connection()));
        UserService::new(repo, auth(), mailer, None)
    }

    fn create_test_user(id: &str, its_id: &str, role: Role) -> user::Model {
        user::Model {
            id: id.to_string(),
            its_id: its_id.to_string(),
            name: "Test".to_string(),
            surname: None,
            email: "a@example.com".to_string(),
            phone: None,
            password_hash: hash_password("password123").unwrap(),
            role,
            zone: None,
            designation: None,
            status: UserStatus::Active,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    fn claims(sub: &str, role: Role) -> Claims {
        Claims {
            sub: sub.to_string(),
            role,
            iat: 0,
            exp: i64::MAX,
        }
    }

    fn register_input(its_id: &str) -> RegisterInput {
        RegisterInput {
            its_id: its_id.to_string(),
            name: "Test".to_string(),
            surname: None,
            email: "a@example.com".to_string(),
            password: "password123".to_string(),
            phone: None,
            zone: None,
            designation: None,
        }
    }

    #[test]
    fn test_hash_password() {
        let hash = hash_password("test_password_123").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("test_password_123", &hash).unwrap());
        assert!(!verify_password("wrong_password", &hash).unwrap());
    }

    #[test]
    fn test_generate_password() {
        let password = generate_password();
        assert_eq!(password.len(), GENERATED_PASSWORD_LEN);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[tokio::test]
    async fn test_register_defaults_to_member() {
        let stored = create_test_user("u1", "1001", Role::Member);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<user::Model>::new()])
            .append_query_results([Vec::<user::Model>::new()])
            .append_query_results([[stored]]);

        let user = service(db, Arc::new(LogMailer))
            .register(register_input("1001"))
            .await
            .unwrap();

        assert_eq!(user.role, Role::Member);
        assert_eq!(user.status, UserStatus::Active);
    }

    #[tokio::test]
    async fn test_register_duplicate_its_id() {
        let existing = create_test_user("u1", "1001", Role::Member);
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([[existing]]);

        let result = service(db, Arc::new(LogMailer))
            .register(register_input("1001"))
            .await;

        match result {
            Err(AppError::BadRequest(msg)) => assert!(msg.contains("already exists")),
            other => panic!("expected BadRequest, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_login_issues_token() {
        let stored = create_test_user("u1", "1001", Role::Captain);
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([[stored]]);

        let output = service(db, Arc::new(LogMailer))
            .login(LoginInput {
                its_id: "1001".to_string(),
                password: "password123".to_string(),
            })
            .await
            .unwrap();

        let claims = auth().verify(&output.token).unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.role, Role::Captain);
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let stored = create_test_user("u1", "1001", Role::Member);
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([[stored]]);

        let result = service(db, Arc::new(LogMailer))
            .login(LoginInput {
                its_id: "1001".to_string(),
                password: "nope".to_string(),
            })
            .await;

        assert!(matches!(result, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_login_inactive_account() {
        let mut stored = create_test_user("u1", "1001", Role::Member);
        stored.status = UserStatus::Inactive;
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([[stored]]);

        let result = service(db, Arc::new(LogMailer))
            .login(LoginInput {
                its_id: "1001".to_string(),
                password: "password123".to_string(),
            })
            .await;

        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_create_member_reports_email_failure() {
        let stored = create_test_user("u2", "2002", Role::Member);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<user::Model>::new()])
            .append_query_results([Vec::<user::Model>::new()])
            .append_query_results([[stored]]);

        let created = service(db, Arc::new(FailingMailer))
            .create_member(
                &claims("admin", Role::Admin),
                CreateMemberInput {
                    its_id: "2002".to_string(),
                    name: "Test".to_string(),
                    surname: None,
                    email: "b@example.com".to_string(),
                    password: None,
                    phone: None,
                    zone: None,
                    designation: None,
                    role: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(created.user.id, "u2");
        assert!(created.email_error.unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_admin_cannot_create_admin() {
        let db = MockDatabase::new(DatabaseBackend::Postgres);

        let result = service(db, Arc::new(LogMailer))
            .create_member(
                &claims("admin", Role::Admin),
                CreateMemberInput {
                    its_id: "3003".to_string(),
                    name: "Test".to_string(),
                    surname: None,
                    email: "c@example.com".to_string(),
                    password: None,
                    phone: None,
                    zone: None,
                    designation: None,
                    role: Some(Role::Admin),
                },
            )
            .await;

        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_delete_self_rejected() {
        let db = MockDatabase::new(DatabaseBackend::Postgres);

        let result = service(db, Arc::new(LogMailer))
            .delete(&claims("u1", Role::SuperAdmin), "u1")
            .await;

        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }
}
