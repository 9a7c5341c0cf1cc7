//! Fixed-window request counters keyed by client identity.
//!
//! Two interchangeable backends sit behind [`RateLimitBackend`]:
//! - [`InMemoryBackend`] keeps counters in this process. It is only correct
//!   when a single instance serves all traffic.
//! - [`SharedCounterBackend`] uses an atomic increment-with-expiry primitive
//!   ([`CounterStore`]) so several instances share one quota.
//!
//! A backend failure fails open: the request is allowed and a warning logged.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use murmur_db::Database;

use crate::error::{AppError, AppResult};

/// Key shared by every client whose address cannot be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub limit: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub const fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window }
    }
}

#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    /// Count one request for `key` and report whether it is within `policy`.
    async fn hit(&self, key: &str, policy: RateLimitPolicy) -> anyhow::Result<bool>;

    /// Drop state for windows that have ended. Returns how many were dropped.
    async fn sweep(&self, policy: RateLimitPolicy) -> anyhow::Result<usize>;
}

// -- In-process backend --

struct Window {
    count: u32,
    started: Instant,
}

#[derive(Default)]
pub struct InMemoryBackend {
    windows: Mutex<HashMap<String, Window>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitBackend for InMemoryBackend {
    async fn hit(&self, key: &str, policy: RateLimitPolicy) -> anyhow::Result<bool> {
        let now = Instant::now();
        let mut windows = self
            .windows
            .lock()
            .map_err(|e| anyhow::anyhow!("rate limit lock poisoned: {}", e))?;

        match windows.get_mut(key) {
            Some(window) if now.duration_since(window.started) <= policy.window => {
                // Saturate at the limit so a flood cannot overflow the counter.
                if window.count >= policy.limit {
                    return Ok(false);
                }
                window.count += 1;
                Ok(true)
            }
            _ => {
                windows.insert(key.to_string(), Window { count: 1, started: now });
                Ok(policy.limit >= 1)
            }
        }
    }

    async fn sweep(&self, policy: RateLimitPolicy) -> anyhow::Result<usize> {
        let now = Instant::now();
        let mut windows = self
            .windows
            .lock()
            .map_err(|e| anyhow::anyhow!("rate limit lock poisoned: {}", e))?;
        let before = windows.len();
        windows.retain(|_, w| now.duration_since(w.started) <= policy.window);
        Ok(before - windows.len())
    }
}

// -- Shared backend --

/// Atomic counter with expiring keys.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key` and return the new count. The key expires `ttl` after
    /// the increment that created it; later increments leave the expiry alone.
    async fn increment(&self, key: &str, ttl: Duration) -> anyhow::Result<u64>;

    async fn purge_expired(&self) -> anyhow::Result<usize>;
}

/// [`CounterStore`] backed by the `rate_limits` table of the shared database.
pub struct SqliteCounterStore {
    db: Arc<Database>,
}

impl SqliteCounterStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CounterStore for SqliteCounterStore {
    async fn increment(&self, key: &str, ttl: Duration) -> anyhow::Result<u64> {
        let db = self.db.clone();
        let key = key.to_string();
        let ttl_ms = ttl.as_millis().min(u128::from(u64::MAX)) as u64;
        let now_ms = chrono::Utc::now().timestamp_millis();
        tokio::task::spawn_blocking(move || db.increment_rate_counter(&key, ttl_ms, now_ms)).await?
    }

    async fn purge_expired(&self) -> anyhow::Result<usize> {
        let db = self.db.clone();
        let now_ms = chrono::Utc::now().timestamp_millis();
        tokio::task::spawn_blocking(move || db.purge_expired_rate_counters(now_ms)).await?
    }
}

pub struct SharedCounterBackend<S> {
    store: S,
}

impl<S: CounterStore> SharedCounterBackend<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: CounterStore> RateLimitBackend for SharedCounterBackend<S> {
    async fn hit(&self, key: &str, policy: RateLimitPolicy) -> anyhow::Result<bool> {
        let count = self.store.increment(key, policy.window).await?;
        Ok(count <= u64::from(policy.limit))
    }

    async fn sweep(&self, _policy: RateLimitPolicy) -> anyhow::Result<usize> {
        self.store.purge_expired().await
    }
}

// -- Limiter --

/// A named policy applied through a backend. Cheap to clone.
#[derive(Clone)]
pub struct RateLimiter {
    name: &'static str,
    policy: RateLimitPolicy,
    backend: Arc<dyn RateLimitBackend>,
}

impl RateLimiter {
    pub fn new(name: &'static str, policy: RateLimitPolicy, backend: Arc<dyn RateLimitBackend>) -> Self {
        Self {
            name,
            policy,
            backend,
        }
    }

    /// Returns `true` if the request identified by `client_key` may proceed.
    pub async fn check(&self, client_key: &str) -> bool {
        let key = format!("{}:{}", self.name, client_key);
        match self.backend.hit(&key, self.policy).await {
            Ok(true) => true,
            Ok(false) => {
                debug!(limiter = self.name, client = client_key, "Rate limit exceeded");
                false
            }
            Err(e) => {
                warn!(limiter = self.name, error = %e, "Rate limit backend failed, allowing request");
                true
            }
        }
    }

    /// Like [`RateLimiter::check`] but yields [`AppError::RateLimited`] on denial.
    pub async fn enforce(&self, client_key: &str) -> AppResult<()> {
        if self.check(client_key).await {
            Ok(())
        } else {
            Err(AppError::RateLimited)
        }
    }

    pub async fn sweep(&self) -> anyhow::Result<usize> {
        self.backend.sweep(self.policy).await
    }
}

/// Client identity for rate limiting: the first `X-Forwarded-For` hop, then
/// `X-Real-IP`, else [`UNKNOWN_CLIENT`].
pub fn client_key(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = move || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}

/// Background task that drops finished windows.
pub async fn run_sweep_loop(limiters: Vec<RateLimiter>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        for limiter in &limiters {
            match limiter.sweep().await {
                Ok(count) if count > 0 => {
                    info!("Rate limit sweep: dropped {} {} windows", count, limiter.name);
                }
                Ok(_) => {}
                Err(e) => warn!("Rate limit sweep error ({}): {}", limiter.name, e),
            }
        }
    }
}
