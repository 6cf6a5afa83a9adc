mod app;
mod auth;
mod config;
mod error;
mod extract;
mod middleware;
mod movies;
mod rate_limit;
mod response;
mod state;
mod store;
mod validation;

use crate::{config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "movie_catalog=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    tracing::info!(environment = ?config.environment, store = ?config.store, "configuration loaded");

    let app_state = AppState::init(config).await?;

    if let Some(db) = &app_state.db {
        sqlx::migrate!("./migrations")
            .run(db)
            .await
            .map_err(|e| anyhow::anyhow!("database migration failed: {e}"))?;
        tracing::info!("migrations applied");
    }

    let app = app::build_app(app_state.clone());
    app::serve(app, &app_state).await
}
