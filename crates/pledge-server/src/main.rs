use std::sync::Arc;

use tracing::info;

use pledge_api::config::Config;
use pledge_api::identity::GoogleVerifier;
use pledge_api::state::AppStateInner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pledge=debug,pledge_api=debug,pledge_gateway=debug,tower_http=debug".into()),
        )
        .init();

    // Config (loads .env if present)
    let config = Config::from_env()?;
    if config.google_client_id.is_empty() {
        info!("PLEDGE_GOOGLE_CLIENT_ID not set, identity-provider sign-in is disabled");
    }

    // Init database and upload storage
    let db = pledge_db::Database::open(&config.db_path)?;
    tokio::fs::create_dir_all(&config.upload_dir).await?;
    info!("Serving uploads from {}", config.upload_dir.display());

    let identity = Arc::new(GoogleVerifier::new(config.google_client_id.clone())?);
    let addr = config.socket_addr()?;
    info!("Allowed origin: {}, public URL: {}", config.allowed_origin, config.public_url);

    let state = AppStateInner::new(db, config, identity);
    let app = pledge_api::build_router(state);

    info!("Pledge server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
