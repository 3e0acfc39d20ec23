mod config;

use std::sync::Arc;

use tracing::info;

use huddle_api::{AppState, AppStateInner};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "huddle=debug,huddle_api=debug,huddle_gateway=debug,huddle_db=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = huddle_db::Database::open(&config.db_path)?;

    let state: AppState = Arc::new(AppStateInner::new(
        db,
        &config.jwt_secret,
        config.token_ttl_hours,
        config.history_limit,
    ));
    let app = huddle_api::router(state);

    let addr = config.addr()?;
    info!("Huddle server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
