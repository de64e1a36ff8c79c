//! Configuration loading and representation.
//!
//! Values come from the process environment, with a `.env` file (if any)
//! loaded first. [`AppConfig::from_lookup`] takes any key lookup so tests do
//! not have to touch the real environment.

use std::net::SocketAddr;
use std::str::FromStr;

use chrono::Duration;
use thiserror::Error;
use tracing::warn;

use churchos_auth::HashCost;

const DEV_ACCESS_SECRET: &str = "dev-access-secret-change-me";
const DEV_REFRESH_SECRET: &str = "dev-refresh-secret-change-me";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read .env file: {0}")]
    EnvFile(#[from] dotenvy::Error),

    #[error("{key} must be set in production")]
    Missing { key: &'static str },

    #[error("{key} has an invalid value '{value}'")]
    Invalid { key: &'static str, value: String },

    #[error("JWT_SECRET and JWT_REFRESH_SECRET must differ")]
    SharedSigningKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }
}

#[derive(Clone)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl core::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub bind_addr: SocketAddr,
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub password_cost: HashCost,
    /// Base for email-verification links.
    pub public_base_url: String,
    /// Base for password-reset links.
    pub client_url: String,
    pub registration_role: String,
    pub default_staff_role: String,
    pub seed_rbac_on_start: bool,
    /// `None` selects log-only delivery.
    pub notify_webhook_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => {}
            Err(dotenvy::Error::Io(_)) => {}
            Err(err) => return Err(err.into()),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let environment = match get("APP_ENV").as_deref() {
            None | Some("development") | Some("dev") | Some("test") => Environment::Development,
            Some("production") | Some("prod") => Environment::Production,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "APP_ENV",
                    value: other.to_string(),
                });
            }
        };

        let access_secret = secret(&get, "JWT_SECRET", DEV_ACCESS_SECRET, environment)?;
        let refresh_secret = secret(&get, "JWT_REFRESH_SECRET", DEV_REFRESH_SECRET, environment)?;
        if access_secret == refresh_secret {
            return Err(ConfigError::SharedSigningKey);
        }

        let defaults = HashCost::default();
        Ok(Self {
            environment,
            bind_addr: parse(&get, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            database_url: get("DATABASE_URL"),
            jwt: JwtConfig {
                access_secret,
                refresh_secret,
                access_ttl: ttl(&get, "JWT_ACCESS_TTL_SECS", 900)?,
                refresh_ttl: ttl(&get, "JWT_REFRESH_TTL_SECS", 604_800)?,
            },
            password_cost: HashCost {
                memory_kib: parse(&get, "ARGON2_MEMORY_KIB", defaults.memory_kib)?,
                iterations: parse(&get, "ARGON2_ITERATIONS", defaults.iterations)?,
                parallelism: parse(&get, "ARGON2_PARALLELISM", defaults.parallelism)?,
            },
            public_base_url: get("PUBLIC_BASE_URL").unwrap_or_else(|| "http://localhost:8080".to_string()),
            client_url: get("CLIENT_URL").unwrap_or_else(|| "http://localhost:3000".to_string()),
            registration_role: get("REGISTRATION_ROLE").unwrap_or_else(|| churchos_auth::SUPER_ADMIN.to_string()),
            default_staff_role: get("DEFAULT_STAFF_ROLE").unwrap_or_else(|| "Staff".to_string()),
            seed_rbac_on_start: parse(&get, "SEED_RBAC_ON_START", true)?,
            notify_webhook_url: get("NOTIFY_WEBHOOK_URL"),
        })
    }
}

fn secret(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    dev_default: &str,
    environment: Environment,
) -> Result<String, ConfigError> {
    match get(key) {
        Some(value) => Ok(value),
        None if environment.is_production() => Err(ConfigError::Missing { key }),
        None => {
            warn!(key, "signing secret not set; using insecure development default");
            Ok(dev_default.to_string())
        }
    }
}

fn parse<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError> {
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

/// Token lifetime in whole seconds; must be positive and fit in `u32`.
fn ttl(get: &impl Fn(&str) -> Option<String>, key: &'static str, default: u32) -> Result<Duration, ConfigError> {
    let secs: u32 = parse(get, key, default)?;
    let invalid = || ConfigError::Invalid {
        key,
        value: secs.to_string(),
    };
    if secs == 0 {
        return Err(invalid());
    }
    Duration::try_seconds(i64::from(secs)).ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn development_defaults() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.environment, Environment::Development);
        assert_eq!(cfg.jwt.access_ttl, Duration::minutes(15));
        assert_eq!(cfg.jwt.refresh_ttl, Duration::days(7));
        assert_eq!(cfg.registration_role, "Super Admin");
        assert!(cfg.seed_rbac_on_start);
        assert!(cfg.database_url.is_none());
    }

    #[test]
    fn production_requires_secrets() {
        let err = load(&[("APP_ENV", "production"), ("JWT_SECRET", "a")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { key: "JWT_REFRESH_SECRET" }));
    }

    #[test]
    fn shared_signing_key_rejected() {
        let err = load(&[("JWT_SECRET", "same"), ("JWT_REFRESH_SECRET", "same")]).unwrap_err();
        assert!(matches!(err, ConfigError::SharedSigningKey));
    }

    #[test]
    fn invalid_numbers_name_the_key() {
        let err = load(&[("JWT_ACCESS_TTL_SECS", "soon")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "JWT_ACCESS_TTL_SECS", .. }));
    }

    #[test]
    fn token_ttls_must_be_positive_and_bounded() {
        for raw in ["0", "-5", "9223372036854775807", "4294967296"] {
            let err = load(&[("JWT_ACCESS_TTL_SECS", raw)]).unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { key: "JWT_ACCESS_TTL_SECS", .. }),
                "{raw} accepted"
            );
        }
        let err = load(&[("JWT_REFRESH_TTL_SECS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "JWT_REFRESH_TTL_SECS", .. }));

        let cfg = load(&[("JWT_ACCESS_TTL_SECS", "60")]).unwrap();
        assert_eq!(cfg.jwt.access_ttl, Duration::minutes(1));
    }

    #[test]
    fn debug_hides_secrets() {
        let cfg = load(&[("JWT_SECRET", "topsecret"), ("JWT_REFRESH_SECRET", "othersecret")]).unwrap();
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("topsecret"));
        assert!(!dbg.contains("othersecret"));
    }
}
