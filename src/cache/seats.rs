use crate::cache::CacheService;
use crate::models::{SeatKey, SeatMapSnapshot};
use redis::{AsyncCommands, Script};
use tracing::{debug, info, warn};

fn seats_key(key: &SeatKey) -> String {
    format!("seats:{}:{}", key.movie_id, key.showtime_id)
}

// KEYS[1] = seat map key, ARGV = snapshot json, version, ttl.
// Leaves a newer cached snapshot in place.
const SAVE_IF_NEWER: &str = r#"
local current = redis.call('GET', KEYS[1])
if current then
    local ok, cached = pcall(cjson.decode, current)
    if ok and type(cached) == 'table' and tonumber(cached.version)
        and tonumber(cached.version) > tonumber(ARGV[2]) then
        return 0
    end
end
redis.call('SET', KEYS[1], ARGV[1], 'EX', ARGV[3])
return 1
"#;

impl CacheService {
    pub async fn get_seat_map(&self, key: &SeatKey) -> Option<SeatMapSnapshot> {
        let mut conn = self.redis.conn.clone();
        let data: Option<String> = match conn.get(seats_key(key)).await {
            Ok(data) => data,
            Err(e) => {
                warn!("Seat map cache read failed for {}: {:?}", key, e);
                return None;
            }
        };
        data.and_then(|d| serde_json::from_str(&d).ok())
    }

    /// Caches `snapshot` unless a newer version is already cached. Returns
    /// whether it was written.
    ///
    /// A reader that loaded its snapshot before a booking committed can finish
    /// after the booking refreshed the cache; the version check keeps the
    /// older map out.
    pub async fn save_seat_map(&self, snapshot: &SeatMapSnapshot, ttl_seconds: u64) -> bool {
        let Ok(data) = serde_json::to_string(snapshot) else {
            return false;
        };
        let mut conn = self.redis.conn.clone();
        let saved: Result<i64, _> = Script::new(SAVE_IF_NEWER)
            .key(seats_key(&snapshot.key))
            .arg(data)
            .arg(snapshot.version)
            .arg(ttl_seconds)
            .invoke_async(&mut conn)
            .await;
        match saved {
            Ok(1) => true,
            Ok(_) => {
                debug!("Kept newer cached seat map for {} over v{}", snapshot.key, snapshot.version);
                false
            }
            Err(e) => {
                warn!("Seat map cache write failed for {}: {:?}", snapshot.key, e);
                false
            }
        }
    }

    pub async fn invalidate_seat_map(&self, key: &SeatKey) {
        let mut conn = self.redis.conn.clone();
        let _: Result<(), _> = conn.del(seats_key(key)).await;
        info!("Invalidated seat map cache for {}", key);
    }
}
