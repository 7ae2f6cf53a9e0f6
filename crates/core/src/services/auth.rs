//! Bearer token issue and verification.
//!
//! Tokens are stateless HS256 JWTs carrying the subject id and role. There is
//! no revocation list: a token stays valid until it expires, even if the
//! account is deactivated in the meantime.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use khidmat_common::{AppError, AppResult, config::AuthConfig};
use khidmat_db::entities::user::{self, Role};

/// Decoded token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id).
    pub sub: String,
    pub role: Role,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Expiry (unix seconds).
    pub exp: i64,
}

impl Claims {
    /// Whether the caller's role appears in an allow-set.
    #[must_use]
    pub fn has_role(&self, allowed: &[Role]) -> bool {
        self.role.is_in(allowed)
    }

    /// Reject with `Forbidden` unless the caller's role is allowed.
    pub fn require(&self, allowed: &[Role]) -> AppResult<()> {
        if self.has_role(allowed) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "Role {} may not perform this action",
                self.role
            )))
        }
    }

    /// Whether the caller is the given user or an administrator.
    #[must_use]
    pub fn is_self_or_admin(&self, user_id: &str) -> bool {
        self.sub == user_id || self.has_role(Role::ADMINS)
    }
}

/// Token service.
#[derive(Clone)]
pub struct AuthService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl AuthService {
    /// Create a token service from configuration.
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            ttl: Duration::days(config.token_ttl_days),
        }
    }

    /// Issue a token for a user.
    pub fn issue(&self, user: &user::Model) -> AppResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {e}")))
    }

    /// Verify signature and expiry and return the claims.
    pub fn verify(&self, token: &str) -> AppResult<Claims> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Token rejected");
                AppError::Unauthorized
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use khidmat_db::entities::user::UserStatus;

    fn config(secret: &str) -> AuthConfig {
        AuthConfig {
            jwt_secret: secret.to_string(),
            token_ttl_days: 7,
        }
    }

    fn create_test_user(role: Role) -> user::Model {
        user::Model {
            id: "01hv5z8k0000000000000000aa".to_string(),
            its_id: "1001".to_string(),
            name: "Test".to_string(),
            surname: None,
            email: "a@example.com".to_string(),
            phone: None,
            password_hash: "hash".to_string(),
            role,
            zone: None,
            designation: None,
            status: UserStatus::Active,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    #[test]
    fn test_issue_and_verify() {
        let auth = AuthService::new(&config("secret"));
        let token = auth.issue(&create_test_user(Role::Captain)).unwrap();

        let claims = auth.verify(&token).unwrap();
        assert_eq!(claims.sub, "01hv5z8k0000000000000000aa");
        assert_eq!(claims.role, Role::Captain);
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 60 * 60);
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let token = AuthService::new(&config("one"))
            .issue(&create_test_user(Role::Admin))
            .unwrap();

        let result = AuthService::new(&config("two")).verify(&token);
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }

    #[test]
    fn test_verify_rejects_expired() {
        let auth = AuthService::new(&config("secret"));
        let claims = Claims {
            sub: "u1".to_string(),
            role: Role::Member,
            iat: 1_000,
            exp: 2_000,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();

        assert!(matches!(auth.verify(&token), Err(AppError::Unauthorized)));
    }

    #[test]
    fn test_verify_rejects_garbage() {
        let auth = AuthService::new(&config("secret"));
        assert!(matches!(auth.verify("not.a.token"), Err(AppError::Unauthorized)));
    }

    #[test]
    fn test_require_role() {
        let claims = Claims {
            sub: "u1".to_string(),
            role: Role::Finance,
            iat: 0,
            exp: 0,
        };
        assert!(claims.require(Role::FINANCE_STAFF).is_ok());
        assert!(matches!(
            claims.require(Role::ADMINS),
            Err(AppError::Forbidden(_))
        ));
        assert!(claims.is_self_or_admin("u1"));
        assert!(!claims.is_self_or_admin("u2"));
    }
}
