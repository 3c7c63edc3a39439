use anyhow::{Context, Result};
use imgate::config::AppConfig;
use imgate::state::AppState;
use imgate::storage::ensure_dir;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env().context("Failed to load configuration")?;

    ensure_dir(&config.upload_dir)
        .await
        .with_context(|| format!("Failed to create {}", config.upload_dir.display()))?;

    match &config.database_path {
        Some(path) => tracing::info!("Storing users in {}", path.display()),
        None => tracing::info!("Storing users in memory"),
    }

    let port = config.port;
    let state = AppState::from_config(config).context("Failed to open user store")?;
    let app = imgate::build_router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;
    tracing::info!("Server running on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
