//! Transactional seat/booking store, plus per-user favorites.
//!
//! Every write to a seat map goes through [`SeatStore::seed_seats`] or
//! [`SeatStore::reserve_seats`]; nothing else in the crate touches seats.
//! Two backends exist: [`memory::MemoryStore`] keeps everything in-process,
//! [`postgres::PgStore`] persists to PostgreSQL and relays changes with
//! `LISTEN/NOTIFY`.

pub mod memory;
pub mod postgres;

use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::models::{Booking, Favorite, FavoriteMovie, SeatKey, SeatMapSnapshot};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Buffered items per subscription before the producer waits on the consumer.
pub(crate) const SUBSCRIPTION_BUFFER: usize = 16;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("subscription lost: {0}")]
    SubscriptionLost(String),
}

/// Why a reservation transaction did not commit.
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("seat {seat_id} is already booked")]
    Conflict { seat_id: String },

    #[error("seat {seat_id} does not exist for this showtime")]
    UnknownSeat { seat_id: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<sqlx::Error> for TransactionError {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(StoreError::Database(err))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    Seeded(usize),
    AlreadySeeded,
}

/// Everything a reservation transaction needs. `seat_ids` is already
/// de-duplicated and in the order conflicts must be reported.
#[derive(Debug, Clone)]
pub struct Reservation<'a> {
    pub key: &'a SeatKey,
    pub user_id: &'a str,
    pub seat_ids: &'a [String],
    pub movie_title: &'a str,
}

pub trait SeatStore: Send + Sync + 'static {
    /// True when at least one seat exists for `key`.
    fn has_seats(&self, key: &SeatKey) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Writes the given free seats as one atomic batch unless the map is
    /// already seeded.
    fn seed_seats(
        &self,
        key: &SeatKey,
        seat_ids: &[String],
    ) -> impl Future<Output = Result<SeedOutcome, StoreError>> + Send;

    fn snapshot(
        &self,
        key: &SeatKey,
    ) -> impl Future<Output = Result<SeatMapSnapshot, StoreError>> + Send;

    /// Reads every named seat, aborts on the first booked one, otherwise marks
    /// them all booked and inserts the booking, all in one transaction.
    fn reserve_seats(
        &self,
        reservation: Reservation<'_>,
    ) -> impl Future<Output = Result<Booking, TransactionError>> + Send;

    fn watch_seats(
        &self,
        key: &SeatKey,
    ) -> impl Future<Output = Result<Subscription<SeatMapSnapshot>, StoreError>> + Send;

    fn list_bookings(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Vec<Booking>, StoreError>> + Send;

    fn watch_bookings(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Subscription<Vec<Booking>>, StoreError>> + Send;
}

/// Per-user favorite movies. At most one entry per `(user_id, movie_id)`.
pub trait FavoriteStore: Send + Sync + 'static {
    fn is_favorite(
        &self,
        user_id: &str,
        movie_id: i64,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Inserts or refreshes the favorite; the store stamps `added_at`.
    fn add_favorite(
        &self,
        user_id: &str,
        movie: &FavoriteMovie,
    ) -> impl Future<Output = Result<Favorite, StoreError>> + Send;

    /// Returns false when there was nothing to remove.
    fn remove_favorite(
        &self,
        user_id: &str,
        movie_id: i64,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Newest first; among equal timestamps the later insert comes first.
    fn list_favorites(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Vec<Favorite>, StoreError>> + Send;
}

/// Live, push-driven sequence of values from the store.
///
/// Yields `Ok` items in the order the store produced them. A failure arrives as
/// a single `Err` item, after which the stream ends. Dropping the handle (or
/// calling [`Subscription::unsubscribe`]) stops the producer; anything it had in
/// flight is discarded.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::Receiver<Result<T, StoreError>>,
    producer: JoinHandle<()>,
}

impl<T: Send + 'static> Subscription<T> {
    /// Spawns `produce` with the sending half of a fresh channel.
    pub(crate) fn spawn<F, Fut>(produce: F) -> Self
    where
        F: FnOnce(mpsc::Sender<Result<T, StoreError>>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let producer = tokio::spawn(produce(tx));
        Self { rx, producer }
    }
}

impl<T> Subscription<T> {
    /// Next value, or `None` once the subscription has ended.
    pub async fn next_update(&mut self) -> Option<Result<T, StoreError>> {
        self.rx.recv().await
    }

    pub fn unsubscribe(self) {
        drop(self);
    }

    pub fn is_active(&self) -> bool {
        !self.producer.is_finished()
    }
}

impl<T> Stream for Subscription<T> {
    type Item = Result<T, StoreError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.producer.abort();
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio::time::{sleep, timeout};

    // The producer never looks at its channel, like a listener parked on the
    // database. Only tearing down the handle can stop it.
    #[tokio::test]
    async fn unsubscribe_stops_a_producer_that_ignores_its_channel() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let (stopped_tx, stopped_rx) = oneshot::channel::<()>();
        let counter = Arc::clone(&ticks);

        let mut live = Subscription::<usize>::spawn(move |tx| async move {
            let _running = stopped_tx;
            loop {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let _ = tx.send(Ok(n)).await;
                sleep(Duration::from_millis(5)).await;
            }
        });

        assert_eq!(live.next_update().await.unwrap().unwrap(), 0);
        assert!(live.is_active());
        live.unsubscribe();

        let finished = timeout(Duration::from_secs(1), stopped_rx).await;
        assert!(finished.is_ok(), "producer kept running after unsubscribe");

        let after_teardown = ticks.load(Ordering::SeqCst);
        sleep(Duration::from_millis(30)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), after_teardown);
    }

    #[tokio::test]
    async fn failure_ends_the_stream() {
        let mut live = Subscription::<usize>::spawn(|tx| async move {
            let _ = tx.send(Ok(1)).await;
            let _ = tx.send(Err(StoreError::SubscriptionLost("gone".into()))).await;
        });

        assert_eq!(live.next_update().await.unwrap().unwrap(), 1);
        assert!(matches!(live.next_update().await, Some(Err(StoreError::SubscriptionLost(_)))));
        assert!(live.next_update().await.is_none());
    }
}

