//! Runs against a real PostgreSQL. Set `DATABASE_URL` and use
//! `cargo test -- --ignored`.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use uuid::Uuid;

use cinema_booking::config::DatabaseConfig;
use cinema_booking::database::Database;
use cinema_booking::models::{BookingRequest, FavoriteMovie, SeatKey};
use cinema_booking::services::{BookingCoordinator, BookingResult, SeatLayout};
use cinema_booking::store::{FavoriteStore, PgStore, SeatStore, SeedOutcome};

async fn database() -> Database {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let db = Database::new(&DatabaseConfig {
        url,
        pool_size: 10,
        acquire_timeout_seconds: 5,
    })
    .await
    .unwrap();
    db.run_migrations().await.unwrap();
    db
}

async fn coordinator() -> BookingCoordinator<PgStore> {
    BookingCoordinator::new(Arc::new(PgStore::new(database().await)), SeatLayout::new(4, 5).unwrap())
}

// Fresh showtime per test so runs don't interfere.
fn fresh_key() -> SeatKey {
    SeatKey::new(42, Uuid::new_v4().to_string())
}

fn request(key: &SeatKey, user: &str, seats: &[&str]) -> BookingRequest {
    BookingRequest {
        key: key.clone(),
        user_id: Some(user.to_string()),
        seat_ids: seats.iter().map(|s| s.to_string()).collect(),
        movie_title: "Stalker".to_string(),
    }
}

#[tokio::test]
#[ignore]
async fn concurrent_seeding_writes_one_grid() {
    let coordinator = coordinator().await;
    let key = fresh_key();

    let views = (0..6).map(|_| {
        let coordinator = coordinator.clone();
        let key = key.clone();
        tokio::spawn(async move { coordinator.ensure_seats_exist(&key).await.unwrap() })
    });
    let outcomes = futures::future::join_all(views).await;

    let seeded = outcomes
        .iter()
        .filter(|o| matches!(o, Ok(SeedOutcome::Seeded(20))))
        .count();
    assert_eq!(seeded, 1);
    assert_eq!(coordinator.seat_map(&key).await.unwrap().seats.len(), 20);
}

#[tokio::test]
#[ignore]
async fn overlapping_bookings_commit_once() {
    let coordinator = coordinator().await;
    let key = fresh_key();
    coordinator.ensure_seats_exist(&key).await.unwrap();

    let attempts = (0..5).map(|i| {
        let coordinator = coordinator.clone();
        let req = request(&key, &format!("pg-user-{}", i), &["B2", "B3"]);
        tokio::spawn(async move { coordinator.book_seats(req).await })
    });
    let results: Vec<BookingResult> = futures::future::join_all(attempts)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_success()).count(), 1);
    assert_eq!(coordinator.seat_map(&key).await.unwrap().booked_count(), 2);
}

#[tokio::test]
#[ignore]
async fn live_seat_map_follows_bookings() {
    let coordinator = coordinator().await;
    let key = fresh_key();
    coordinator.ensure_seats_exist(&key).await.unwrap();

    let mut live = coordinator.subscribe_seats(&key).await.unwrap();
    let initial = timeout(Duration::from_secs(5), live.next_update())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(initial.booked_count(), 0);

    let user = format!("pg-{}", Uuid::new_v4());
    assert!(coordinator.book_seats(request(&key, &user, &["A1"])).await.is_success());

    let updated = timeout(Duration::from_secs(5), live.next_update())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(updated.seat("A1").unwrap().booked);
    assert!(updated.version > initial.version);

    let tickets = coordinator.list_bookings(&user).await.unwrap();
    assert_eq!(tickets.len(), 1);
    assert_eq!(tickets[0].seat_ids, vec!["A1"]);
}

#[tokio::test]
#[ignore]
async fn same_instant_bookings_list_latest_insert_first() {
    let db = database().await;
    let store = PgStore::new(db.clone());
    let user = format!("pg-{}", Uuid::new_v4());
    let at = chrono::Utc::now();

    let mut inserted = Vec::new();
    for title in ["first", "second", "third"] {
        let booking_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO bookings (booking_id, user_id, movie_id, showtime_id, movie_title, seat_ids, created_at)
             VALUES ($1, $2, 42, 'tie', $3, ARRAY['A1'], $4)",
        )
        .bind(booking_id)
        .bind(&user)
        .bind(title)
        .bind(at)
        .execute(&db.pool)
        .await
        .unwrap();
        inserted.push(booking_id);
    }

    let listed: Vec<Uuid> = store
        .list_bookings(&user)
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.booking_id)
        .collect();
    inserted.reverse();
    assert_eq!(listed, inserted);
}

#[tokio::test]
#[ignore]
async fn favorites_round_trip_newest_first() {
    let store = PgStore::new(database().await);
    let user = format!("pg-{}", Uuid::new_v4());
    let movie = |movie_id: i64, title: &str| FavoriteMovie {
        movie_id,
        title: title.to_string(),
        poster_path: "/poster.jpg".to_string(),
        rating: 7.9,
        release_date: "1982-06-25".to_string(),
        overview: String::new(),
    };

    assert!(!store.is_favorite(&user, 1091).await.unwrap());
    store.add_favorite(&user, &movie(1091, "The Thing")).await.unwrap();
    store.add_favorite(&user, &movie(78, "Blade Runner")).await.unwrap();
    let refreshed = store.add_favorite(&user, &movie(1091, "The Thing")).await.unwrap();

    assert!(store.is_favorite(&user, 1091).await.unwrap());
    let listed = store.list_favorites(&user).await.unwrap();
    assert_eq!(listed.iter().map(|f| f.movie_id).collect::<Vec<_>>(), vec![1091, 78]);
    assert_eq!(listed[0].added_at, refreshed.added_at);

    assert!(store.remove_favorite(&user, 1091).await.unwrap());
    assert!(!store.remove_favorite(&user, 1091).await.unwrap());
    assert_eq!(store.list_favorites(&user).await.unwrap().len(), 1);
}
