use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::bail;
use tracing::{info, warn};

use murmur_api::upload::{ClamdScanner, MalwareScanner};
use murmur_api::{AppStateInner, Config, auth, rate_limit};

/// Seconds between rate-limit window sweeps.
const SWEEP_INTERVAL_SECS: u64 = 60;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "murmur=debug,murmur_api=debug,murmur_db=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;
    if config.has_placeholder_secret() {
        bail!("MURMUR_JWT_SECRET is unset or a placeholder; refusing to start");
    }

    // Init database
    let db = Arc::new(murmur_db::Database::open(&config.db_path)?);

    match (&config.admin_email, &config.admin_password) {
        (Some(email), Some(password)) => {
            auth::seed_admin(&db, email, password)?;
        }
        (Some(_), None) | (None, Some(_)) => {
            warn!("Set both MURMUR_ADMIN_EMAIL and MURMUR_ADMIN_PASSWORD to seed an administrator");
        }
        (None, None) => {}
    }

    let scanner: Option<Arc<dyn MalwareScanner>> = match &config.clamd_addr {
        Some(addr) => {
            info!("Malware scanning via clamd at {}", addr);
            Some(Arc::new(ClamdScanner::new(addr.clone(), config.clamd_timeout)))
        }
        None => {
            info!("No clamd address configured, malware scanning disabled");
            None
        }
    };

    info!("Upload directory: {}", config.upload_dir.display());
    info!("Rate limit backend: {:?}", config.rate_limit_backend);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let state = AppStateInner::new(db, config, scanner);

    tokio::spawn(rate_limit::run_sweep_loop(state.limiters(), SWEEP_INTERVAL_SECS));

    let app = murmur_api::app(state);

    info!("Murmur server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
