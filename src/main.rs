// src/main.rs
use anyhow::Context;
use dotenvy::dotenv;
use odms_backend::{config::Config, database, routes, state::AppState};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing_subscriber::fmt::init as tracing_init;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables before the subscriber reads RUST_LOG
    dotenv().ok();

    // Initialize logging
    tracing_init();

    let config = Config::from_env()?;

    // Create database pool
    let db_pool = database::create_pool(&config)
        .await
        .context("Failed to create database pool")?;

    if config.run_migrations {
        database::run_migrations(&db_pool)
            .await
            .context("Failed to run database migrations")?;
    }

    let app = routes::app(AppState::new(db_pool)).layer(CorsLayer::permissive());

    // Try port..port+20 to avoid crash when address is in use
    let listener = {
        let mut bound = None;
        for offset in 0u16..=20 {
            let port = config.port.saturating_add(offset);
            let addr = SocketAddr::from((config.host, port));
            match TcpListener::bind(addr).await {
                Ok(l) => { bound = Some((l, addr)); break; }
                Err(e) => {
                    if offset == 0 { tracing::warn!(%addr, error=%e, "Port in use, trying next"); }
                }
            }
        }
        match bound {
            Some((l, addr)) => {
                tracing::info!("Server running on {}", addr);
                l
            }
            None => {
                anyhow::bail!("Failed to bind to any port starting at {} on {}", config.port, config.host);
            }
        }
    };

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
