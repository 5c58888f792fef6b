use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    FavoriteStore, Reservation, SeatStore, SeedOutcome, StoreError, Subscription, TransactionError,
};
use crate::models::seat::compare_seat_ids;
use crate::models::{Booking, Favorite, FavoriteMovie, Seat, SeatKey, SeatMapSnapshot, UserId};

/// In-process store. Each operation runs under one critical section, which is
/// what gives reservations their serializable isolation here.
///
/// Clones share the same state, so one instance can stand in for the hosted
/// store seen by several clients.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Shared>,
}

struct Shared {
    state: Mutex<State>,
    outage: watch::Sender<Option<String>>,
}

#[derive(Default)]
struct State {
    seat_maps: HashMap<SeatKey, SeatMap>,
    bookings: HashMap<UserId, UserBookings>,
    // Newest first.
    favorites: HashMap<UserId, Vec<Favorite>>,
    failing_commits: Vec<String>,
}

struct SeatMap {
    seats: HashMap<String, Seat>,
    version: u64,
    changes: watch::Sender<SeatMapSnapshot>,
}

impl SeatMap {
    fn new(key: &SeatKey) -> Self {
        let (changes, _) = watch::channel(SeatMapSnapshot::empty(key.clone()));
        Self {
            seats: HashMap::new(),
            version: 0,
            changes,
        }
    }

    fn snapshot(&self, key: &SeatKey) -> SeatMapSnapshot {
        let mut seats: Vec<Seat> = self.seats.values().cloned().collect();
        seats.sort_by(|a, b| compare_seat_ids(&a.seat_id, &b.seat_id));
        SeatMapSnapshot {
            key: key.clone(),
            version: self.version,
            seats,
        }
    }

    fn publish(&mut self, key: &SeatKey) {
        self.version += 1;
        let snapshot = self.snapshot(key);
        self.changes.send_replace(snapshot);
    }
}

struct UserBookings {
    // Newest first.
    items: Vec<Booking>,
    changes: watch::Sender<Vec<Booking>>,
}

impl Default for UserBookings {
    fn default() -> Self {
        let (changes, _) = watch::channel(Vec::new());
        Self {
            items: Vec::new(),
            changes,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (outage, _) = watch::channel(None);
        Self {
            inner: Arc::new(Shared {
                state: Mutex::new(State::default()),
                outage,
            }),
        }
    }

    /// Simulates losing the backend: live subscriptions end with an error and
    /// every operation fails until [`MemoryStore::restore`].
    pub fn go_offline(&self, cause: impl Into<String>) {
        let cause = cause.into();
        warn!("memory store going offline: {}", cause);
        self.inner.outage.send_replace(Some(cause));
    }

    pub fn restore(&self) {
        self.inner.outage.send_replace(None);
    }

    /// Makes the next reservation commit fail with `cause` after its reads.
    pub fn fail_next_commit(&self, cause: impl Into<String>) {
        if let Ok(mut state) = self.inner.state.lock() {
            state.failing_commits.push(cause.into());
        }
    }

    /// Number of stored seats for `key`.
    pub fn seat_count(&self, key: &SeatKey) -> usize {
        self.inner
            .state
            .lock()
            .map(|state| state.seat_maps.get(key).map_or(0, |m| m.seats.len()))
            .unwrap_or(0)
    }

    /// Number of stored bookings across all users.
    pub fn booking_count(&self) -> usize {
        self.inner
            .state
            .lock()
            .map(|state| state.bookings.values().map(|b| b.items.len()).sum())
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        if let Some(cause) = self.inner.outage.borrow().clone() {
            return Err(StoreError::Unavailable(cause));
        }
        self.inner
            .state
            .lock()
            .map_err(|_| StoreError::Unavailable("store state poisoned".to_string()))
    }
}

impl SeatStore for MemoryStore {
    async fn has_seats(&self, key: &SeatKey) -> Result<bool, StoreError> {
        let state = self.lock()?;
        Ok(state.seat_maps.get(key).is_some_and(|m| !m.seats.is_empty()))
    }

    async fn seed_seats(&self, key: &SeatKey, seat_ids: &[String]) -> Result<SeedOutcome, StoreError> {
        let mut state = self.lock()?;
        let map = state
            .seat_maps
            .entry(key.clone())
            .or_insert_with(|| SeatMap::new(key));
        if !map.seats.is_empty() {
            return Ok(SeedOutcome::AlreadySeeded);
        }

        for seat_id in seat_ids {
            map.seats.insert(seat_id.clone(), Seat::free(seat_id.clone()));
        }
        map.publish(key);
        debug!("seeded {} seats for {}", map.seats.len(), key);
        Ok(SeedOutcome::Seeded(map.seats.len()))
    }

    async fn snapshot(&self, key: &SeatKey) -> Result<SeatMapSnapshot, StoreError> {
        let state = self.lock()?;
        Ok(state
            .seat_maps
            .get(key)
            .map_or_else(|| SeatMapSnapshot::empty(key.clone()), |m| m.snapshot(key)))
    }

    async fn reserve_seats(&self, reservation: Reservation<'_>) -> Result<Booking, TransactionError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;

        // Reads
        let Some(map) = state.seat_maps.get_mut(reservation.key) else {
            let seat_id = reservation.seat_ids.first().cloned().unwrap_or_default();
            return Err(TransactionError::UnknownSeat { seat_id });
        };
        for seat_id in reservation.seat_ids {
            match map.seats.get(seat_id) {
                None => {
                    return Err(TransactionError::UnknownSeat {
                        seat_id: seat_id.clone(),
                    })
                }
                Some(seat) if seat.booked => {
                    return Err(TransactionError::Conflict {
                        seat_id: seat_id.clone(),
                    })
                }
                Some(_) => {}
            }
        }

        if !state.failing_commits.is_empty() {
            let cause = state.failing_commits.remove(0);
            return Err(StoreError::Unavailable(cause).into());
        }

        // Writes
        for seat_id in reservation.seat_ids {
            if let Some(seat) = map.seats.get_mut(seat_id) {
                seat.booked = true;
                seat.held_by = Some(reservation.user_id.to_string());
            }
        }
        map.publish(reservation.key);

        let booking = Booking {
            booking_id: Uuid::new_v4(),
            user_id: reservation.user_id.to_string(),
            movie_id: reservation.key.movie_id,
            showtime_id: reservation.key.showtime_id.clone(),
            movie_title: reservation.movie_title.to_string(),
            seat_ids: reservation.seat_ids.to_vec(),
            created_at: Utc::now(),
        };
        let user = state
            .bookings
            .entry(reservation.user_id.to_string())
            .or_default();
        user.items.insert(0, booking.clone());
        user.changes.send_replace(user.items.clone());

        Ok(booking)
    }

    async fn watch_seats(&self, key: &SeatKey) -> Result<Subscription<SeatMapSnapshot>, StoreError> {
        let changes = {
            let mut state = self.lock()?;
            state
                .seat_maps
                .entry(key.clone())
                .or_insert_with(|| SeatMap::new(key))
                .changes
                .subscribe()
        };
        let outage = self.inner.outage.subscribe();
        Ok(Subscription::spawn(move |tx| relay(changes, outage, tx)))
    }

    async fn list_bookings(&self, user_id: &str) -> Result<Vec<Booking>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .bookings
            .get(user_id)
            .map(|b| b.items.clone())
            .unwrap_or_default())
    }

    async fn watch_bookings(&self, user_id: &str) -> Result<Subscription<Vec<Booking>>, StoreError> {
        let changes = {
            let mut state = self.lock()?;
            state
                .bookings
                .entry(user_id.to_string())
                .or_default()
                .changes
                .subscribe()
        };
        let outage = self.inner.outage.subscribe();
        Ok(Subscription::spawn(move |tx| relay(changes, outage, tx)))
    }
}

impl FavoriteStore for MemoryStore {
    async fn is_favorite(&self, user_id: &str, movie_id: i64) -> Result<bool, StoreError> {
        let state = self.lock()?;
        Ok(state
            .favorites
            .get(user_id)
            .is_some_and(|list| list.iter().any(|f| f.movie_id == movie_id)))
    }

    async fn add_favorite(&self, user_id: &str, movie: &FavoriteMovie) -> Result<Favorite, StoreError> {
        let mut state = self.lock()?;
        let list = state.favorites.entry(user_id.to_string()).or_default();
        list.retain(|f| f.movie_id != movie.movie_id);

        let favorite = Favorite::new(user_id, movie.clone(), Utc::now());
        list.insert(0, favorite.clone());
        Ok(favorite)
    }

    async fn remove_favorite(&self, user_id: &str, movie_id: i64) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        let Some(list) = state.favorites.get_mut(user_id) else {
            return Ok(false);
        };
        let before = list.len();
        list.retain(|f| f.movie_id != movie_id);
        Ok(list.len() < before)
    }

    async fn list_favorites(&self, user_id: &str) -> Result<Vec<Favorite>, StoreError> {
        let state = self.lock()?;
        Ok(state.favorites.get(user_id).cloned().unwrap_or_default())
    }
}

/// Forwards every published value to the subscriber, starting with the
/// current one, until the subscriber leaves or the store goes offline.
async fn relay<T: Clone + Send + Sync + 'static>(
    mut changes: watch::Receiver<T>,
    mut outage: watch::Receiver<Option<String>>,
    tx: mpsc::Sender<Result<T, StoreError>>,
) {
    let current = changes.borrow_and_update().clone();
    if tx.send(Ok(current)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    let lost = StoreError::SubscriptionLost("store dropped".to_string());
                    let _ = tx.send(Err(lost)).await;
                    return;
                }
                let value = changes.borrow_and_update().clone();
                if tx.send(Ok(value)).await.is_err() {
                    return;
                }
            }
            cause = went_offline(&mut outage) => {
                let _ = tx.send(Err(StoreError::SubscriptionLost(cause))).await;
                return;
            }
            _ = tx.closed() => return,
        }
    }
}

async fn went_offline(outage: &mut watch::Receiver<Option<String>>) -> String {
    match outage.wait_for(Option::is_some).await {
        Ok(cause) => cause.clone().unwrap_or_default(),
        Err(_) => "store dropped".to_string(),
    }
}
