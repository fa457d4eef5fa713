//! describo-api server: ensures the database and tables exist, then serves the entity,
//! OneDrive configuration and health routes.

use describo_api::{app_router, ensure_database_exists, ensure_tables, AppState, PgStore, Rclone, ServerConfig};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("describo_api=info,tower_http=info")),
        )
        .init();

    let config = ServerConfig::from_env()?;
    ensure_database_exists(&config.database_url).await?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;
    ensure_tables(&pool).await?;

    let store = Arc::new(PgStore::new(pool));
    let state = AppState::with_store(store, Rclone::new(&config.rclone_binary));
    let app = app_router(state, config.body_limit_bytes);

    let listener = TcpListener::bind(config.bind_addr()?).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
