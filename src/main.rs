use anyhow::{Context, Result};
use axum::Router;
use std::{io::ErrorKind, net::SocketAddr};
use tardigradio::{
    config::AppConfig,
    routes,
    services::{
        database::Database, network::NetworkConfig, rate_limit::RateLimiter, session::SessionKey,
    },
    state::AppState,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting tardigradio with config: {:?}", cfg);

    // --- Open SQLite and apply the schema ---
    let db = Database::open(&cfg.database_url)
        .await
        .with_context(|| format!("opening database {}", cfg.database_url))?;

    // --- Handle migration mode ---
    if migrate {
        tracing::info!("Database migration complete.");
        db.close().await;
        return Ok(()); // exit after migration
    }

    // --- Storage network ---
    let store = NetworkConfig::from_env(&cfg.data_dir)
        .connect()
        .context("connecting to the storage network")?;

    // --- Sessions ---
    let sessions = match &cfg.session_secret {
        Some(secret) => SessionKey::new(secret),
        None => {
            tracing::warn!(
                "TARDIGRADIO_SESSION_SECRET is not set; sessions will not survive a restart"
            );
            SessionKey::new(format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple()))
        }
    };

    let state = AppState::new(db, store, sessions, RateLimiter::per_minute(cfg.rate_limit));

    // --- Build router ---
    let app: Router = routes::routes::routes(state, &cfg.assets_dir, cfg.max_upload_bytes);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err).with_context(|| format!("binding {}", addr)),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
