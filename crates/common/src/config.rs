//! Application configuration.

use serde::Deserialize;
use std::path::Path;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Token signing configuration.
    pub auth: AuthConfig,
    /// Outbound mail configuration. Mail is only logged when absent.
    #[serde(default)]
    pub email: Option<EmailConfig>,
    /// Cross-origin request configuration.
    #[serde(default)]
    pub cors: CorsConfig,
    /// Dues ledger configuration.
    #[serde(default)]
    pub finance: FinanceConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Deployment environment (`development` or `production`).
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Log output format (`pretty` or `json`).
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl ServerConfig {
    /// Whether the server runs in production mode.
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Bearer token configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to sign and verify tokens.
    pub jwt_secret: String,
    /// Token lifetime in days.
    #[serde(default = "default_token_ttl_days")]
    pub token_ttl_days: i64,
}

/// SMTP mail configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// SMTP relay host.
    pub smtp_host: String,
    /// SMTP port.
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// SMTP username.
    #[serde(default)]
    pub username: Option<String>,
    /// SMTP password.
    #[serde(default)]
    pub password: Option<String>,
    /// Sender address.
    pub from_address: String,
    /// Sender display name.
    #[serde(default = "default_from_name")]
    pub from_name: String,
    /// Link included in welcome emails.
    #[serde(default)]
    pub login_url: Option<String>,
}

/// Cross-origin configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CorsConfig {
    /// Exact origins allowed to call the API.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// Whether preview-deployment origins are accepted.
    #[serde(default)]
    pub allow_preview_deployments: bool,
    /// Host suffix identifying preview deployments.
    #[serde(default = "default_preview_suffix")]
    pub preview_origin_suffix: String,
}

impl CorsConfig {
    /// Check whether an origin is allowed.
    #[must_use]
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.allowed_origins.iter().any(|o| o == origin) {
            return true;
        }
        self.allow_preview_deployments
            && origin.starts_with("https://")
            && origin.ends_with(&self.preview_origin_suffix)
    }
}

/// Dues ledger configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FinanceConfig {
    /// Amount charged for one subscription year, in minor currency units.
    #[serde(default = "default_annual_amount")]
    pub annual_subscription_amount: i64,
    /// Days between assignment and due date.
    #[serde(default = "default_due_in_days")]
    pub due_in_days: i64,
}

impl Default for FinanceConfig {
    fn default() -> Self {
        Self {
            annual_subscription_amount: default_annual_amount(),
            due_in_days: default_due_in_days(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

const fn default_max_connections() -> u32 {
    20
}

const fn default_min_connections() -> u32 {
    2
}

const fn default_token_ttl_days() -> i64 {
    7
}

const fn default_smtp_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "Khidmat".to_string()
}

fn default_preview_suffix() -> String {
    ".vercel.app".to_string()
}

const fn default_annual_amount() -> i64 {
    120_000
}

const fn default_due_in_days() -> i64 {
    30
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `.env` (if present)
    /// 2. `config/default.toml`
    /// 3. `config/{environment}.toml` (based on `KHIDMAT_ENV`)
    /// 4. Environment variables with `KHIDMAT__` prefix
    /// 5. Plain variables `JWT_SECRET`, `DATABASE_URL`, `ALLOWED_ORIGINS`,
    ///    `ALLOW_PREVIEW_DEPLOYMENTS`
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let env = std::env::var("KHIDMAT_ENV").unwrap_or_else(|_| "development".to_string());

        let builder = config::Config::builder()
            .set_default("server.environment", env.clone())?
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("KHIDMAT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        apply_plain_env(builder)?.build()?.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("KHIDMAT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        apply_plain_env(builder)?.build()?.try_deserialize()
    }
}

type Builder = config::ConfigBuilder<config::builder::DefaultState>;

fn apply_plain_env(builder: Builder) -> Result<Builder, config::ConfigError> {
    let origins = std::env::var("ALLOWED_ORIGINS").ok().map(|raw| split_origins(&raw));
    let preview = std::env::var("ALLOW_PREVIEW_DEPLOYMENTS")
        .ok()
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"));

    builder
        .set_override_option("auth.jwt_secret", std::env::var("JWT_SECRET").ok())?
        .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
        .set_override_option("cors.allowed_origins", origins)?
        .set_override_option("cors.allow_preview_deployments", preview)
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn from_toml(raw: &str) -> Config {
        config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults_applied() {
        let config = from_toml(
            r#"
            [server]
            [database]
            url = "postgres://localhost/khidmat"
            [auth]
            jwt_secret = "secret"
            "#,
        );

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.auth.token_ttl_days, 7);
        assert_eq!(config.finance.due_in_days, 30);
        assert!(config.email.is_none());
        assert!(!config.server.is_production());
    }

    #[test]
    fn test_split_origins() {
        let origins = split_origins("https://a.org, https://b.org,,");
        assert_eq!(origins, vec!["https://a.org", "https://b.org"]);
    }

    #[test]
    fn test_cors_preview_origins() {
        let cors = CorsConfig {
            allowed_origins: vec!["https://khidmat.org".to_string()],
            allow_preview_deployments: true,
            preview_origin_suffix: ".vercel.app".to_string(),
        };

        assert!(cors.is_origin_allowed("https://khidmat.org"));
        assert!(cors.is_origin_allowed("https://khidmat-git-main.vercel.app"));
        assert!(!cors.is_origin_allowed("https://evil.example.com"));

        let strict = CorsConfig {
            allow_preview_deployments: false,
            ..cors
        };
        assert!(!strict.is_origin_allowed("https://khidmat-git-main.vercel.app"));
    }
}
