use crate::cache::CacheService;
use redis::Script;
use tracing::warn;
use uuid::Uuid;

fn booking_lock_key(user_id: &str) -> String {
    format!("booking_in_flight:{}", user_id)
}

// Deletes the lock only while it still carries our token.
const RELEASE_IF_OWNER: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// Proof of holding a user's in-flight booking lock.
#[derive(Debug)]
pub struct BookingLock {
    key: String,
    token: String,
}

impl CacheService {
    /// Marks a checkout as in flight for `user_id`. Returns `None` when one is
    /// already running. The TTL frees the lock if it is never released.
    pub async fn try_begin_booking(&self, user_id: &str, ttl_seconds: u64) -> Option<BookingLock> {
        let lock = BookingLock {
            key: booking_lock_key(user_id),
            token: Uuid::new_v4().to_string(),
        };
        let mut conn = self.redis.conn.clone();

        // SET NX EX - atomic, no race between check and set
        let result: Result<Option<String>, _> = redis::cmd("SET")
            .arg(&lock.key)
            .arg(&lock.token)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await;

        match result {
            Ok(reply) => reply.map(|_| lock),
            Err(e) => {
                // Without Redis we cannot tell; the store still prevents double booking.
                warn!("Booking lock unavailable for {}: {:?}", user_id, e);
                Some(lock)
            }
        }
    }

    /// Releases `lock`. A lock that expired and was taken by a later checkout
    /// is left alone. Returns whether a key was deleted.
    pub async fn end_booking(&self, lock: BookingLock) -> bool {
        let mut conn = self.redis.conn.clone();
        let released: Result<i64, _> = Script::new(RELEASE_IF_OWNER)
            .key(&lock.key)
            .arg(&lock.token)
            .invoke_async(&mut conn)
            .await;
        match released {
            Ok(n) => n > 0,
            Err(e) => {
                warn!("Booking lock release failed for {}: {:?}", lock.key, e);
                false
            }
        }
    }
}
