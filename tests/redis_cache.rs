//! Runs against a real Redis. Set `REDIS_URL` and use
//! `cargo test -- --ignored`.

use std::time::Duration;

use uuid::Uuid;

use cinema_booking::cache::CacheService;
use cinema_booking::models::{Seat, SeatKey, SeatMapSnapshot};
use cinema_booking::redis_client::RedisClient;

async fn cache() -> CacheService {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    CacheService::new(RedisClient::new(&url).await.unwrap())
}

fn fresh_user() -> String {
    format!("redis-{}", Uuid::new_v4())
}

fn snapshot(key: &SeatKey, version: u64, booked: bool) -> SeatMapSnapshot {
    let mut seat = Seat::free("A1");
    seat.booked = booked;
    SeatMapSnapshot {
        key: key.clone(),
        version,
        seats: vec![seat],
    }
}

#[tokio::test]
#[ignore]
async fn second_checkout_for_a_user_is_refused() {
    let cache = cache().await;
    let user = fresh_user();

    let first = cache.try_begin_booking(&user, 30).await.unwrap();
    assert!(cache.try_begin_booking(&user, 30).await.is_none());
    assert!(cache.try_begin_booking(&fresh_user(), 30).await.is_some());

    assert!(cache.end_booking(first).await);
    let again = cache.try_begin_booking(&user, 30).await.unwrap();
    cache.end_booking(again).await;
}

#[tokio::test]
#[ignore]
async fn expired_holder_cannot_release_the_next_lock() {
    let cache = cache().await;
    let user = fresh_user();

    let stale = cache.try_begin_booking(&user, 1).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let current = cache.try_begin_booking(&user, 30).await.unwrap();

    assert!(!cache.end_booking(stale).await);
    assert!(cache.try_begin_booking(&user, 30).await.is_none());
    assert!(cache.end_booking(current).await);
}

#[tokio::test]
#[ignore]
async fn older_seat_map_does_not_replace_newer() {
    let cache = cache().await;
    let key = SeatKey::new(42, Uuid::new_v4().to_string());

    assert!(cache.save_seat_map(&snapshot(&key, 2, true), 30).await);
    assert!(!cache.save_seat_map(&snapshot(&key, 1, false), 30).await);

    let cached = cache.get_seat_map(&key).await.unwrap();
    assert_eq!(cached.version, 2);
    assert!(cached.seat("A1").unwrap().booked);

    assert!(cache.save_seat_map(&snapshot(&key, 3, true), 30).await);
    assert_eq!(cache.get_seat_map(&key).await.unwrap().version, 3);
}

#[tokio::test]
#[ignore]
async fn invalidation_clears_the_cached_map() {
    let cache = cache().await;
    let key = SeatKey::new(42, Uuid::new_v4().to_string());

    cache.save_seat_map(&snapshot(&key, 1, false), 30).await;
    assert!(cache.get_seat_map(&key).await.is_some());

    cache.invalidate_seat_map(&key).await;
    assert!(cache.get_seat_map(&key).await.is_none());
}
