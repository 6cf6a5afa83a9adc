use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

use crate::{
    auth::{
        jwt::JwtKeys,
        password::PasswordHasher,
        repo::{PgUserStore, UserStore},
    },
    config::{AppConfig, StoreBackend},
    movies::repo::{MovieStore, PgMovieStore},
    rate_limit::RateLimiter,
    store::memory::{MemoryMovieStore, MemoryUserStore},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub jwt: JwtKeys,
    pub hasher: PasswordHasher,
    pub users: Arc<dyn UserStore>,
    pub movies: Arc<dyn MovieStore>,
    pub limiter: Arc<RateLimiter>,
    /// Present only for the Postgres backend; closed on shutdown.
    pub db: Option<PgPool>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        match config.store {
            StoreBackend::Memory => {
                info!("using in-memory store");
                Self::in_memory(config)
            }
            StoreBackend::Postgres => {
                let url = config
                    .database
                    .url
                    .clone()
                    .context("DATABASE_URL is required for the postgres store")?;
                let db = PgPoolOptions::new()
                    .max_connections(config.database.max_connections)
                    .connect(&url)
                    .await
                    .context("connect to database")?;
                Self::from_parts(
                    config,
                    Arc::new(PgUserStore::new(db.clone())),
                    Arc::new(PgMovieStore::new(db.clone())),
                    Some(db),
                )
            }
        }
    }

    pub fn in_memory(config: AppConfig) -> anyhow::Result<Self> {
        Self::from_parts(
            config,
            Arc::new(MemoryUserStore::default()),
            Arc::new(MemoryMovieStore::default()),
            None,
        )
    }

    pub fn from_parts(
        config: AppConfig,
        users: Arc<dyn UserStore>,
        movies: Arc<dyn MovieStore>,
        db: Option<PgPool>,
    ) -> anyhow::Result<Self> {
        let jwt = JwtKeys::new(&config.jwt);
        let hasher = PasswordHasher::new(&config.password)?;
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
        Ok(Self {
            config: Arc::new(config),
            jwt,
            hasher,
            users,
            movies,
            limiter,
            db,
        })
    }
}
