use anyhow::anyhow;
use axum::Router;
use tracing::{info, Level};

mod routes;
mod models;
mod utils;
mod client;
mod state;

use crate::utils::conf_helper::{init_config_and_bind, get_cached_config};
use crate::state::app_state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    // === CONFIG + LISTENER ===
    let (listener, settings) = init_config_and_bind()
        .await
        .map_err(|e| anyhow!("init failure: {e}"))?;

    let config = get_cached_config().ok_or_else(|| anyhow!("config not cached"))?;

    info!(
        "{} {} listening on {}:{}",
        config.name,
        config.version,
        config.connection.ip,
        config.connection.port
    );
    match config.post_target() {
        Some(url) => info!("Envelopes are forwarded to {}", url),
        None => info!("No post_url configured, envelopes are only returned"),
    }

    let state = AppState::new(settings);

    let app = Router::new()
        .merge(routes::info_routes::health_routes())
        .merge(routes::ingest_routes::ingest_routes(state));

    axum::serve(listener, app).await?;
    Ok(())
}
