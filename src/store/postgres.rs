use sqlx::postgres::PgListener;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::{
    FavoriteStore, Reservation, SeatStore, SeedOutcome, StoreError, Subscription, TransactionError,
};
use crate::database::Database;
use crate::models::seat::compare_seat_ids;
use crate::models::{Booking, Favorite, FavoriteMovie, Seat, SeatKey, SeatMapSnapshot};

const SEAT_CHANNEL: &str = "seat_changes";
const BOOKING_CHANNEL: &str = "booking_changes";

/// PostgreSQL-backed store.
///
/// Reservations lock the requested seat rows with `SELECT ... FOR UPDATE`, so
/// two transactions over overlapping seats are serialized and the later one
/// reads the committed `booked` flag. Each seat map also has a row in
/// `seat_map_seeds` that doubles as the seeding claim and the snapshot
/// revision counter.
#[derive(Clone)]
pub struct PgStore {
    db: Database,
}

#[derive(sqlx::FromRow)]
struct SeatRow {
    seat_id: String,
    booked: bool,
    held_by: String,
    revision: i64,
}

impl PgStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn pool(&self) -> &PgPool {
        &self.db.pool
    }
}

impl SeatStore for PgStore {
    async fn has_seats(&self, key: &SeatKey) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM seats WHERE movie_id = $1 AND showtime_id = $2)",
        )
        .bind(key.movie_id)
        .bind(&key.showtime_id)
        .fetch_one(self.pool())
        .await?;
        Ok(exists)
    }

    async fn seed_seats(&self, key: &SeatKey, seat_ids: &[String]) -> Result<SeedOutcome, StoreError> {
        let mut tx = self.pool().begin().await?;

        // Whoever inserts the claim row seeds; a concurrent seeder blocks on the
        // primary key until we commit and then finds it taken.
        let claimed = sqlx::query(
            "INSERT INTO seat_map_seeds (movie_id, showtime_id)
             VALUES ($1, $2)
             ON CONFLICT DO NOTHING",
        )
        .bind(key.movie_id)
        .bind(&key.showtime_id)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if !claimed {
            tx.rollback().await?;
            return Ok(SeedOutcome::AlreadySeeded);
        }

        let inserted = sqlx::query(
            "INSERT INTO seats (movie_id, showtime_id, seat_id)
             SELECT $1, $2, UNNEST($3::text[])
             ON CONFLICT DO NOTHING",
        )
        .bind(key.movie_id)
        .bind(&key.showtime_id)
        .bind(seat_ids.to_vec())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        info!("Seeded {} seats for {}", inserted, key);
        Ok(SeedOutcome::Seeded(inserted as usize))
    }

    async fn snapshot(&self, key: &SeatKey) -> Result<SeatMapSnapshot, StoreError> {
        Ok(load_snapshot(self.pool(), key).await?)
    }

    async fn reserve_seats(&self, reservation: Reservation<'_>) -> Result<Booking, TransactionError> {
        let key = reservation.key;
        let seat_ids = reservation.seat_ids.to_vec();
        let mut tx = self.pool().begin().await?;

        // Consistent lock order keeps overlapping reservations from deadlocking.
        let rows: Vec<(String, bool)> = sqlx::query_as(
            "SELECT seat_id, booked
             FROM seats
             WHERE movie_id = $1 AND showtime_id = $2 AND seat_id = ANY($3)
             ORDER BY seat_id
             FOR UPDATE",
        )
        .bind(key.movie_id)
        .bind(&key.showtime_id)
        .bind(&seat_ids)
        .fetch_all(&mut *tx)
        .await?;

        let booked: HashMap<&str, bool> = rows.iter().map(|(id, b)| (id.as_str(), *b)).collect();
        for seat_id in &seat_ids {
            match booked.get(seat_id.as_str()) {
                None => {
                    return abort(tx, TransactionError::UnknownSeat { seat_id: seat_id.clone() }).await
                }
                Some(true) => {
                    return abort(tx, TransactionError::Conflict { seat_id: seat_id.clone() }).await
                }
                Some(false) => {}
            }
        }

        sqlx::query(
            "UPDATE seats
             SET booked = TRUE, held_by = $4, updated_at = NOW()
             WHERE movie_id = $1 AND showtime_id = $2 AND seat_id = ANY($3)",
        )
        .bind(key.movie_id)
        .bind(&key.showtime_id)
        .bind(&seat_ids)
        .bind(reservation.user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE seat_map_seeds SET revision = revision + 1
             WHERE movie_id = $1 AND showtime_id = $2",
        )
        .bind(key.movie_id)
        .bind(&key.showtime_id)
        .execute(&mut *tx)
        .await?;

        let booking = sqlx::query_as::<_, Booking>(
            "INSERT INTO bookings (booking_id, user_id, movie_id, showtime_id, movie_title, seat_ids, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, NOW())
             RETURNING booking_id, user_id, movie_id, showtime_id, movie_title, seat_ids, created_at",
        )
        .bind(uuid::Uuid::new_v4())
        .bind(reservation.user_id)
        .bind(key.movie_id)
        .bind(&key.showtime_id)
        .bind(reservation.movie_title)
        .bind(&seat_ids)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(booking)
    }

    async fn watch_seats(&self, key: &SeatKey) -> Result<Subscription<SeatMapSnapshot>, StoreError> {
        let mut listener = PgListener::connect_with(self.pool()).await?;
        listener.listen(SEAT_CHANNEL).await?;

        let pool = self.pool().clone();
        let key = key.clone();
        Ok(Subscription::spawn(move |tx| async move {
            let payload = key.to_string();
            let mut last_version = None;
            loop {
                match load_snapshot(&pool, &key).await {
                    Ok(snapshot) => {
                        // Two notifications can race their reloads; never go back.
                        if last_version.is_some_and(|v| snapshot.version < v) {
                            debug!("Skipping stale snapshot for {}", key);
                        } else {
                            last_version = Some(snapshot.version);
                            if tx.send(Ok(snapshot)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        error!("Seat snapshot reload failed for {}: {:?}", key, e);
                        let _ = tx.send(Err(StoreError::SubscriptionLost(e.to_string()))).await;
                        return;
                    }
                }
                if !wait_for_payload(&mut listener, &payload, &tx).await {
                    return;
                }
            }
        }))
    }

    async fn list_bookings(&self, user_id: &str) -> Result<Vec<Booking>, StoreError> {
        Ok(load_bookings(self.pool(), user_id).await?)
    }

    async fn watch_bookings(&self, user_id: &str) -> Result<Subscription<Vec<Booking>>, StoreError> {
        let mut listener = PgListener::connect_with(self.pool()).await?;
        listener.listen(BOOKING_CHANNEL).await?;

        let pool = self.pool().clone();
        let user_id = user_id.to_string();
        Ok(Subscription::spawn(move |tx| async move {
            loop {
                match load_bookings(&pool, &user_id).await {
                    Ok(bookings) => {
                        if tx.send(Ok(bookings)).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        error!("Booking reload failed for user {}: {:?}", user_id, e);
                        let _ = tx.send(Err(StoreError::SubscriptionLost(e.to_string()))).await;
                        return;
                    }
                }
                if !wait_for_payload(&mut listener, &user_id, &tx).await {
                    return;
                }
            }
        }))
    }
}

const FAVORITE_COLUMNS: &str =
    "user_id, movie_id, title, poster_path, rating, release_date, overview, added_at";

impl FavoriteStore for PgStore {
    async fn is_favorite(&self, user_id: &str, movie_id: i64) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM favorites WHERE user_id = $1 AND movie_id = $2)",
        )
        .bind(user_id)
        .bind(movie_id)
        .fetch_one(self.pool())
        .await?;
        Ok(exists)
    }

    async fn add_favorite(&self, user_id: &str, movie: &FavoriteMovie) -> Result<Favorite, StoreError> {
        let favorite = sqlx::query_as::<_, Favorite>(&format!(
            "INSERT INTO favorites (user_id, movie_id, title, poster_path, rating, release_date, overview)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (user_id, movie_id) DO UPDATE
             SET title = EXCLUDED.title,
                 poster_path = EXCLUDED.poster_path,
                 rating = EXCLUDED.rating,
                 release_date = EXCLUDED.release_date,
                 overview = EXCLUDED.overview,
                 added_at = NOW(),
                 seq = DEFAULT
             RETURNING {}",
            FAVORITE_COLUMNS
        ))
        .bind(user_id)
        .bind(movie.movie_id)
        .bind(&movie.title)
        .bind(&movie.poster_path)
        .bind(movie.rating)
        .bind(&movie.release_date)
        .bind(&movie.overview)
        .fetch_one(self.pool())
        .await?;

        debug!("User {} favorited movie {}", user_id, movie.movie_id);
        Ok(favorite)
    }

    async fn remove_favorite(&self, user_id: &str, movie_id: i64) -> Result<bool, StoreError> {
        let removed = sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND movie_id = $2")
            .bind(user_id)
            .bind(movie_id)
            .execute(self.pool())
            .await?
            .rows_affected();
        Ok(removed > 0)
    }

    async fn list_favorites(&self, user_id: &str) -> Result<Vec<Favorite>, StoreError> {
        let favorites = sqlx::query_as::<_, Favorite>(&format!(
            "SELECT {} FROM favorites WHERE user_id = $1 ORDER BY added_at DESC, seq DESC",
            FAVORITE_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(favorites)
    }
}

async fn abort(
    tx: Transaction<'_, Postgres>,
    err: TransactionError,
) -> Result<Booking, TransactionError> {
    if let Err(e) = tx.rollback().await {
        error!("Rollback after aborted reservation failed: {:?}", e);
    }
    Err(err)
}

/// Blocks until a notification with `payload` arrives. Returns false when the
/// subscriber left or the listener connection died (after reporting it).
async fn wait_for_payload<T>(
    listener: &mut PgListener,
    payload: &str,
    tx: &mpsc::Sender<Result<T, StoreError>>,
) -> bool {
    loop {
        tokio::select! {
            notification = listener.try_recv() => match notification {
                Ok(Some(n)) if n.payload() == payload => return true,
                Ok(Some(_)) => continue,
                Ok(None) => {
                    let _ = tx
                        .send(Err(StoreError::SubscriptionLost("listener connection closed".to_string())))
                        .await;
                    return false;
                }
                Err(e) => {
                    let _ = tx.send(Err(StoreError::SubscriptionLost(e.to_string()))).await;
                    return false;
                }
            },
            _ = tx.closed() => return false,
        }
    }
}

async fn load_snapshot(pool: &PgPool, key: &SeatKey) -> Result<SeatMapSnapshot, sqlx::Error> {
    // One statement, so seats and revision come from the same snapshot.
    let rows = sqlx::query_as::<_, SeatRow>(
        "SELECT s.seat_id, s.booked, s.held_by, m.revision
         FROM seats s
         JOIN seat_map_seeds m USING (movie_id, showtime_id)
         WHERE s.movie_id = $1 AND s.showtime_id = $2",
    )
    .bind(key.movie_id)
    .bind(&key.showtime_id)
    .fetch_all(pool)
    .await?;

    let version = rows.first().map_or(0, |r| r.revision.max(0) as u64);
    let mut seats: Vec<Seat> = rows
        .into_iter()
        .map(|r| Seat::from_stored(r.seat_id, r.booked, r.held_by))
        .collect();
    seats.sort_by(|a, b| compare_seat_ids(&a.seat_id, &b.seat_id));

    Ok(SeatMapSnapshot {
        key: key.clone(),
        version,
        seats,
    })
}

async fn load_bookings(pool: &PgPool, user_id: &str) -> Result<Vec<Booking>, sqlx::Error> {
    sqlx::query_as::<_, Booking>(
        "SELECT booking_id, user_id, movie_id, showtime_id, movie_title, seat_ids, created_at
         FROM bookings
         WHERE user_id = $1
         ORDER BY created_at DESC, seq DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}
