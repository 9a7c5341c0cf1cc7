use std::sync::Arc;

use murmur_db::Database;

use crate::config::{Config, RateLimitBackendKind};
use crate::error::AppResult;
use crate::fanout::Notifier;
use crate::live::Broker;
use crate::rate_limit::{
    InMemoryBackend, RateLimitBackend, RateLimiter, SharedCounterBackend, SqliteCounterStore,
};
use crate::upload::{FileStore, FileValidator, MalwareScanner};

pub type AppState = Arc<AppStateInner>;

/// Services shared by every handler. Built once at startup and passed in
/// through the router state.
pub struct AppStateInner {
    pub db: Arc<Database>,
    pub config: Config,
    pub store: FileStore,
    pub validator: FileValidator,
    pub submit_limiter: RateLimiter,
    pub login_limiter: RateLimiter,
    pub broker: Broker,
    pub notifier: Notifier,
}

impl AppStateInner {
    pub fn new(db: Arc<Database>, config: Config, scanner: Option<Arc<dyn MalwareScanner>>) -> AppState {
        // One backend per limiter: a sweep only knows its own policy's window.
        let backend = || -> Arc<dyn RateLimitBackend> {
            match config.rate_limit_backend {
                RateLimitBackendKind::Memory => Arc::new(InMemoryBackend::new()),
                RateLimitBackendKind::Shared => {
                    Arc::new(SharedCounterBackend::new(SqliteCounterStore::new(db.clone())))
                }
            }
        };
        let submit_limiter = RateLimiter::new("submit", config.submit_rate, backend());
        let login_limiter = RateLimiter::new("login", config.login_rate, backend());
        let broker = Broker::default();

        Arc::new(Self {
            store: FileStore::new(config.upload_dir.clone()),
            validator: FileValidator::new(scanner),
            submit_limiter,
            login_limiter,
            notifier: Notifier::new(db.clone(), broker.clone()),
            broker,
            db,
            config,
        })
    }

    /// Run a database call on the blocking pool.
    pub async fn run_db<F, T>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        let value = tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(anyhow::Error::from)??;
        Ok(value)
    }

    pub fn limiters(&self) -> Vec<RateLimiter> {
        vec![self.submit_limiter.clone(), self.login_limiter.clone()]
    }
}
