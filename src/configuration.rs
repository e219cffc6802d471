use crate::error::ConfigError as SettingsError;

/// Minimum HMAC-SHA256 key length in bytes
const MIN_SECRET_LENGTH: usize = 32;

/// Upper TTL bounds; keeps the second counts and expiry timestamps in range
const MAX_ACCESS_TOKEN_EXPIRY_MINUTES: i64 = 24 * 60;
const MAX_REFRESH_TOKEN_EXPIRY_DAYS: i64 = 365;

#[derive(serde::Deserialize, Clone, Debug)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    #[serde(default)]
    pub auth: AuthSettings,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct ApplicationSettings {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// JWT signing settings
///
/// Read once at startup; the signing secret is shared read-only by every worker.
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub secret: String,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_access_token_expiry_minutes")]
    pub access_token_expiry_minutes: i64,
    #[serde(default = "default_refresh_token_expiry_days")]
    pub refresh_token_expiry_days: i64,
}

impl JwtSettings {
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }

    pub fn refresh_token_expiry_seconds(&self) -> i64 {
        self.refresh_token_expiry_days * 24 * 60 * 60
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.secret.is_empty() {
            return Err(SettingsError::MissingRequired("jwt.secret".to_string()));
        }
        if self.secret.len() < MIN_SECRET_LENGTH {
            return Err(SettingsError::InvalidValue(format!(
                "jwt.secret must be at least {} bytes",
                MIN_SECRET_LENGTH
            )));
        }
        if !(1..=MAX_ACCESS_TOKEN_EXPIRY_MINUTES).contains(&self.access_token_expiry_minutes) {
            return Err(SettingsError::InvalidValue(format!(
                "jwt.access_token_expiry_minutes must be between 1 and {}",
                MAX_ACCESS_TOKEN_EXPIRY_MINUTES
            )));
        }
        if !(1..=MAX_REFRESH_TOKEN_EXPIRY_DAYS).contains(&self.refresh_token_expiry_days) {
            return Err(SettingsError::InvalidValue(format!(
                "jwt.refresh_token_expiry_days must be between 1 and {}",
                MAX_REFRESH_TOKEN_EXPIRY_DAYS
            )));
        }
        Ok(())
    }
}

// Keep the secret out of debug output.
impl std::fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSettings")
            .field("secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("access_token_expiry_minutes", &self.access_token_expiry_minutes)
            .field("refresh_token_expiry_days", &self.refresh_token_expiry_days)
            .finish()
    }
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct AuthSettings {
    /// bcrypt cost factor
    #[serde(default = "default_hash_cost")]
    pub hash_cost: u32,
    /// Seconds between expired refresh-token sweeps
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            hash_cost: default_hash_cost(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_issuer() -> String {
    "member-auth".to_string()
}

fn default_access_token_expiry_minutes() -> i64 {
    15
}

fn default_refresh_token_expiry_days() -> i64 {
    14
}

fn default_hash_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

fn default_sweep_interval_seconds() -> u64 {
    3600
}

/// Load settings from `configuration.yaml` (optional) and `APP_...` env vars
///
/// e.g. `APP_JWT__SECRET=...` overrides `jwt.secret`.
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;
    settings.try_deserialize::<Settings>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt_settings(secret: &str) -> JwtSettings {
        JwtSettings {
            secret: secret.to_string(),
            issuer: "test".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 14,
        }
    }

    #[test]
    fn test_expiry_conversions() {
        let settings = jwt_settings("test-secret-key-at-least-32-characters-long");

        assert_eq!(settings.access_token_expiry_seconds(), 900);
        assert_eq!(settings.refresh_token_expiry_seconds(), 14 * 86_400);
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(jwt_settings("too-short").validate().is_err());
        assert!(jwt_settings("").validate().is_err());
        assert!(jwt_settings("test-secret-key-at-least-32-characters-long")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_non_positive_ttl_rejected() {
        let mut settings = jwt_settings("test-secret-key-at-least-32-characters-long");
        settings.access_token_expiry_minutes = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_oversized_ttl_rejected() {
        let mut settings = jwt_settings("test-secret-key-at-least-32-characters-long");
        settings.refresh_token_expiry_days = i64::MAX;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::InvalidValue(_))
        ));

        let mut settings = jwt_settings("test-secret-key-at-least-32-characters-long");
        settings.access_token_expiry_minutes = i64::MAX / 60 + 1;
        assert!(settings.validate().is_err());

        let mut settings = jwt_settings("test-secret-key-at-least-32-characters-long");
        settings.access_token_expiry_minutes = 24 * 60;
        settings.refresh_token_expiry_days = 365;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let settings = jwt_settings("test-secret-key-at-least-32-characters-long");
        let rendered = format!("{:?}", settings);

        assert!(!rendered.contains("test-secret-key"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_defaults_from_yaml() {
        let yaml = r#"
application:
  port: 8080
database:
  username: postgres
  password: password
  port: 5432
  host: localhost
  database_name: members
jwt:
  secret: test-secret-key-at-least-32-characters-long
"#;
        let settings: Settings = config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()
            .and_then(|c| c.try_deserialize())
            .expect("Failed to parse settings");

        assert_eq!(settings.application.host, "127.0.0.1");
        assert_eq!(settings.jwt.access_token_expiry_minutes, 15);
        assert_eq!(settings.jwt.refresh_token_expiry_days, 14);
        assert_eq!(settings.auth.hash_cost, bcrypt::DEFAULT_COST);
        assert_eq!(settings.auth.sweep_interval_seconds, 3600);
    }
}
