use std::{str::FromStr, time::Duration};

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Deployment mode; anything but production exposes error diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl Environment {
    pub fn exposes_diagnostics(self) -> bool {
        self != Environment::Production
    }
}

impl FromStr for Environment {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            "production" | "prod" => Ok(Self::Production),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Fixed-window limit applied per client address.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(15 * 60),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub host: String,
    pub port: u16,
    pub store: StoreBackend,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub password: PasswordConfig,
    pub rate_limit: RateLimitConfig,
    pub default_page_size: i64,
    pub request_timeout: Duration,
}

/// Thirty days.
const MAX_JWT_TTL_MINUTES: i64 = 30 * 24 * 60;
const MAX_PAGE_SIZE: i64 = 100;
const MAX_REQUEST_TIMEOUT_SECS: i64 = 60 * 60;
const MAX_RATE_LIMIT_REQUESTS: i64 = 1_000_000;
const MAX_RATE_LIMIT_WINDOW_SECS: i64 = 24 * 60 * 60;

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = parsed(&lookup, "APP_ENV")?.unwrap_or(Environment::Development);
        let store = parsed(&lookup, "STORE_BACKEND")?.unwrap_or(StoreBackend::Postgres);

        let database = DatabaseConfig {
            url: lookup("DATABASE_URL").filter(|v| !v.trim().is_empty()),
            max_connections: parsed(&lookup, "DATABASE_MAX_CONNECTIONS")?.unwrap_or(10),
        };
        if store == StoreBackend::Postgres && database.url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let secret = lookup("JWT_SECRET")
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;
        let jwt = JwtConfig {
            secret,
            issuer: lookup("JWT_ISSUER").unwrap_or_else(|| "movie-catalog".into()),
            audience: lookup("JWT_AUDIENCE").unwrap_or_else(|| "movie-catalog-users".into()),
            ttl_minutes: bounded(&lookup, "JWT_TTL_MINUTES", 60, MAX_JWT_TTL_MINUTES)?,
        };

        let defaults = PasswordConfig::default();
        let password = PasswordConfig {
            memory_kib: parsed(&lookup, "PASSWORD_HASH_MEMORY_KIB")?.unwrap_or(defaults.memory_kib),
            iterations: parsed(&lookup, "PASSWORD_HASH_ITERATIONS")?.unwrap_or(defaults.iterations),
            parallelism: parsed(&lookup, "PASSWORD_HASH_PARALLELISM")?
                .unwrap_or(defaults.parallelism),
        };

        let rate_defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            max_requests: bounded(
                &lookup,
                "RATE_LIMIT_MAX",
                i64::from(rate_defaults.max_requests),
                MAX_RATE_LIMIT_REQUESTS,
            )? as u32,
            window: Duration::from_secs(bounded(
                &lookup,
                "RATE_LIMIT_WINDOW_SECS",
                rate_defaults.window.as_secs() as i64,
                MAX_RATE_LIMIT_WINDOW_SECS,
            )? as u64),
        };

        Ok(Self {
            environment,
            host: lookup("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed(&lookup, "APP_PORT")?.unwrap_or(3000),
            store,
            database,
            jwt,
            password,
            rate_limit,
            default_page_size: bounded(&lookup, "DEFAULT_PAGE_SIZE", 10, MAX_PAGE_SIZE)?,
            request_timeout: Duration::from_secs(bounded(
                &lookup,
                "REQUEST_TIMEOUT_SECS",
                30,
                MAX_REQUEST_TIMEOUT_SECS,
            )? as u64),
        })
    }
}

fn parsed<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

/// A positive integer no larger than `max`.
fn bounded<F>(lookup: &F, key: &'static str, default: i64, max: i64) -> Result<i64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parsed::<F, i64>(lookup, key)? {
        None => Ok(default),
        Some(v) if v > 0 && v <= max => Ok(v),
        Some(v) => Err(ConfigError::Invalid {
            key,
            value: v.to_string(),
        }),
    }
}

#[cfg(test)]
impl AppConfig {
    /// Memory-backed config with cheap hashing parameters.
    pub fn for_tests() -> Self {
        Self {
            environment: Environment::Test,
            host: "127.0.0.1".into(),
            port: 0,
            store: StoreBackend::Memory,
            database: DatabaseConfig {
                url: None,
                max_connections: 1,
            },
            jwt: JwtConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
            },
            password: PasswordConfig {
                memory_kib: 64,
                iterations: 1,
                parallelism: 1,
            },
            rate_limit: RateLimitConfig {
                max_requests: 10_000,
                window: Duration::from_secs(15 * 60),
            },
            default_page_size: 10,
            request_timeout: Duration::from_secs(5),
        }
    }
}
