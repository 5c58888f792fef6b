use crate::cache::CacheService;
use redis::AsyncCommands;

impl CacheService {
    /// Cached catalog response body for `key`, if present.
    pub async fn get_cached_catalog(&self, key: &str) -> Result<Option<String>, redis::RedisError> {
        let mut conn = self.redis.conn.clone();
        conn.get(key).await
    }

    /// Stores a catalog response body with a TTL in seconds.
    pub async fn cache_catalog_response(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> Result<(), redis::RedisError> {
        let mut conn = self.redis.conn.clone();
        conn.set_ex(key, value, ttl_seconds).await
    }
}

/// Cache key for one catalog request, e.g. `catalog:now_playing:p=2`.
pub fn catalog_key(endpoint: &str, params: &[(&str, String)]) -> String {
    let mut key = format!("catalog:{}", endpoint);
    for (name, value) in params {
        key.push(':');
        key.push_str(name);
        key.push('=');
        key.push_str(value);
    }
    key
}
