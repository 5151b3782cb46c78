mod bot;
mod config;
mod error;
mod heartbeat;
mod renderer;
mod routes;
mod screenshot;
mod store;
#[cfg(test)]
mod testsupport;
mod types;
mod uploader;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = config::Config::from_env()?;
    let port = config.port;
    let allowed_origin = config.allowed_origin.clone();

    let pool = match &config.database_url {
        Some(url) => Some(PgPoolOptions::new().max_connections(5).connect(url).await?),
        None => {
            warn!("DATABASE_URL not set; thumbnail URLs will not be persisted");
            None
        }
    };

    tokio::spawn(heartbeat::run(
        config.backend_url.clone(),
        Duration::from_secs(config.heartbeat_minutes * 60),
    ));

    let state = Arc::new(routes::AppState::new(config, pool)?);
    let app = routes::router(state, &allowed_origin);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
