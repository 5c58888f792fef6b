pub mod cache;
pub mod config;
pub mod controllers;
pub mod database;
pub mod middleware;
pub mod models;
pub mod movie_client;
pub mod redis_client;
pub mod services;
pub mod store;

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use services::{BookingCoordinator, FavoriteService, LayoutError, SeatLayout};
use store::PgStore;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("catalog client error: {0}")]
    Catalog(#[from] movie_client::CatalogError),

    #[error("seating configuration error: {0}")]
    Layout(#[from] LayoutError),
}

// Shared state for the whole application
pub struct AppState {
    pub db: database::Database,
    pub redis: redis_client::RedisClient,
    pub cache: cache::CacheService,
    pub config: config::Config,
    pub movies: movie_client::MovieClient,
    pub booking: BookingCoordinator<PgStore>,
    pub favorites: FavoriteService<PgStore>,
}

impl AppState {
    pub async fn new(config: config::Config) -> Result<Arc<Self>, AppError> {
        let layout = SeatLayout::new(config.seating.rows, config.seating.cols)?;

        let db = database::Database::new(&config.database).await?;
        info!("Database connected");
        db.run_migrations().await?;

        let redis = redis_client::RedisClient::new(&config.redis.url).await?;
        let cache = cache::CacheService::new(redis.clone());

        if config.tmdb.api_key.is_empty() {
            warn!("TMDB_API_KEY is empty; catalog requests will be rejected upstream");
        }
        let movies = movie_client::MovieClient::new(&config.tmdb, &config.circuit_breaker)?;
        let store = Arc::new(PgStore::new(db.clone()));
        let booking = BookingCoordinator::new(Arc::clone(&store), layout);
        let favorites = FavoriteService::new(store);

        Ok(Arc::new(Self {
            db,
            redis,
            cache,
            config,
            movies,
            booking,
            favorites,
        }))
    }
}
