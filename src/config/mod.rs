use serde::Deserialize;
use thiserror::Error;

// Top-level configuration, one section per concern
#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub tmdb: TmdbConfig,
    pub seating: SeatingConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
    /// `json` for structured output, anything else for human-readable lines.
    pub log_format: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
    pub acquire_timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
}

// Movie metadata service
#[derive(Debug, Clone)]
pub struct TmdbConfig {
    pub api_key: String,
    pub base_url: String,
    pub image_base_url: String,
}

// Grid used when a showtime's seat map is seeded
#[derive(Debug, Clone)]
pub struct SeatingConfig {
    pub rows: u8,
    pub cols: u8,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub catalog_ttl_seconds: u64,
    pub seats_ttl_seconds: u64,
    /// Upper bound on how long a user's checkout blocks another one.
    pub booking_lock_seconds: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("{0} must be set")]
    Missing(&'static str),
}

// Flat view of every key, as read from defaults, cinema.toml and the environment
#[derive(Debug, Deserialize)]
struct Settings {
    host: String,
    port: u16,
    environment: String,
    rust_log: String,
    log_format: String,
    database_url: Option<String>,
    db_pool_size: u32,
    db_acquire_timeout_seconds: u64,
    redis_url: Option<String>,
    jwt_secret: Option<String>,
    tmdb_api_key: String,
    tmdb_base_url: String,
    tmdb_image_base_url: String,
    seat_rows: u8,
    seat_cols: u8,
    circuit_breaker_failure_threshold: u32,
    circuit_breaker_timeout_seconds: u64,
    catalog_cache_ttl_seconds: u64,
    seats_cache_ttl_seconds: u64,
    booking_lock_seconds: u64,
}

impl Config {
    /// Loads defaults, then an optional `cinema.toml`, then environment
    /// variables (`DATABASE_URL`, `SEAT_ROWS`, ...), later sources winning.
    pub fn from_env() -> Result<Self, ConfigError> {
        let settings: Settings = ::config::Config::builder()
            .set_default("host", "0.0.0.0")?
            .set_default("port", 8000_i64)?
            .set_default("environment", "development")?
            .set_default("rust_log", "cinema_booking=debug,tower_http=debug")?
            .set_default("log_format", "text")?
            .set_default("db_pool_size", 20_i64)?
            .set_default("db_acquire_timeout_seconds", 5_i64)?
            .set_default("tmdb_api_key", "")?
            .set_default("tmdb_base_url", "https://api.themoviedb.org/3/")?
            .set_default("tmdb_image_base_url", "https://image.tmdb.org/t/p/w500")?
            .set_default("seat_rows", 10_i64)?
            .set_default("seat_cols", 10_i64)?
            .set_default("circuit_breaker_failure_threshold", 5_i64)?
            .set_default("circuit_breaker_timeout_seconds", 60_i64)?
            .set_default("catalog_cache_ttl_seconds", 3600_i64)?
            .set_default("seats_cache_ttl_seconds", 30_i64)?
            .set_default("booking_lock_seconds", 30_i64)?
            .add_source(::config::File::with_name("cinema").required(false))
            .add_source(::config::Environment::default().try_parsing(true))
            .build()?
            .try_deserialize()?;

        Ok(Config {
            app: AppConfig {
                host: settings.host,
                port: settings.port,
                environment: settings.environment,
                rust_log: settings.rust_log,
                log_format: settings.log_format,
            },
            database: DatabaseConfig {
                url: settings.database_url.ok_or(ConfigError::Missing("DATABASE_URL"))?,
                pool_size: settings.db_pool_size,
                acquire_timeout_seconds: settings.db_acquire_timeout_seconds,
            },
            redis: RedisConfig {
                url: settings.redis_url.ok_or(ConfigError::Missing("REDIS_URL"))?,
            },
            jwt: JwtConfig {
                secret: settings.jwt_secret.ok_or(ConfigError::Missing("JWT_SECRET"))?,
            },
            tmdb: TmdbConfig {
                api_key: settings.tmdb_api_key,
                base_url: settings.tmdb_base_url,
                image_base_url: settings.tmdb_image_base_url,
            },
            seating: SeatingConfig {
                rows: settings.seat_rows,
                cols: settings.seat_cols,
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: settings.circuit_breaker_failure_threshold,
                timeout_seconds: settings.circuit_breaker_timeout_seconds,
            },
            cache: CacheConfig {
                catalog_ttl_seconds: settings.catalog_cache_ttl_seconds,
                seats_ttl_seconds: settings.seats_cache_ttl_seconds,
                booking_lock_seconds: settings.booking_lock_seconds,
            },
        })
    }
}
