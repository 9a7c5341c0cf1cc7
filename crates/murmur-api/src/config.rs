use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::rate_limit::RateLimitPolicy;

/// Placeholder JWT secrets that MUST NOT be used outside tests.
pub const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

/// Where rate-limit counters live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitBackendKind {
    /// Process-local counters. Correct for a single instance only.
    Memory,
    /// Counters in the shared database, visible to every instance using it.
    Shared,
}

impl FromStr for RateLimitBackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "shared" => Ok(Self::Shared),
            other => bail!("unknown rate limit backend '{}'", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub session_ttl: Duration,
    pub upload_dir: PathBuf,
    pub max_files: usize,
    pub submit_rate: RateLimitPolicy,
    pub login_rate: RateLimitPolicy,
    pub rate_limit_backend: RateLimitBackendKind,
    pub clamd_addr: Option<String>,
    pub clamd_timeout: Duration,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            db_path: "murmur.db".into(),
            jwt_secret: "dev-secret-change-me".into(),
            session_ttl: Duration::from_secs(3600),
            upload_dir: "./uploads".into(),
            max_files: 5,
            submit_rate: RateLimitPolicy::new(5, Duration::from_millis(60_000)),
            login_rate: RateLimitPolicy::new(10, Duration::from_millis(900_000)),
            rate_limit_backend: RateLimitBackendKind::Memory,
            clamd_addr: None,
            clamd_timeout: Duration::from_secs(30),
            admin_email: None,
            admin_password: None,
        }
    }
}

impl Config {
    /// Read configuration from `MURMUR_*` environment variables, falling back
    /// to the defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let submit_rate = RateLimitPolicy::new(
            env_parse("MURMUR_SUBMIT_RATE_LIMIT", defaults.submit_rate.limit)?,
            Duration::from_millis(env_parse(
                "MURMUR_SUBMIT_RATE_WINDOW_MS",
                defaults.submit_rate.window.as_millis() as u64,
            )?),
        );
        let login_rate = RateLimitPolicy::new(
            env_parse("MURMUR_LOGIN_RATE_LIMIT", defaults.login_rate.limit)?,
            Duration::from_millis(env_parse(
                "MURMUR_LOGIN_RATE_WINDOW_MS",
                defaults.login_rate.window.as_millis() as u64,
            )?),
        );
        for (name, policy) in [("submit", submit_rate), ("login", login_rate)] {
            if policy.limit == 0 || policy.window.is_zero() {
                bail!("{} rate limit and window must be greater than zero", name);
            }
        }

        Ok(Self {
            host: env_or("MURMUR_HOST", defaults.host),
            port: env_parse("MURMUR_PORT", defaults.port)?,
            db_path: env_or("MURMUR_DB_PATH", "murmur.db".to_string()).into(),
            jwt_secret: std::env::var("MURMUR_JWT_SECRET").unwrap_or_default(),
            session_ttl: Duration::from_secs(env_parse(
                "MURMUR_SESSION_TTL_SECS",
                defaults.session_ttl.as_secs(),
            )?),
            upload_dir: env_or("MURMUR_UPLOAD_DIR", "./uploads".to_string()).into(),
            max_files: env_parse("MURMUR_MAX_FILES", defaults.max_files)?,
            submit_rate,
            login_rate,
            rate_limit_backend: env_parse("MURMUR_RATE_LIMIT_BACKEND", defaults.rate_limit_backend)?,
            clamd_addr: env_opt("MURMUR_CLAMD_ADDR"),
            clamd_timeout: Duration::from_secs(env_parse(
                "MURMUR_CLAMD_TIMEOUT_SECS",
                defaults.clamd_timeout.as_secs(),
            )?),
            admin_email: env_opt("MURMUR_ADMIN_EMAIL"),
            admin_password: env_opt("MURMUR_ADMIN_PASSWORD"),
        })
    }

    /// True when the JWT secret is unset or a known placeholder.
    pub fn has_placeholder_secret(&self) -> bool {
        self.jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&self.jwt_secret.as_str())
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(key: &str, default: String) -> String {
    env_opt(key).unwrap_or(default)
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_opt(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("invalid value for {key}: '{raw}'")),
        None => Ok(default),
    }
}
