use crate::redis_client::RedisClient;

pub mod catalog;
pub mod locks;
pub mod seats;

pub use locks::BookingLock;

/// Redis-backed caches and short-lived locks. Every method degrades to a
/// miss (or a granted lock) when Redis misbehaves; the store stays authoritative.
#[derive(Clone)]
pub struct CacheService {
    redis: RedisClient,
}

impl CacheService {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }
}
