//! Booking coordinator: seeding, live seat maps and the checkout transaction.

use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use super::seat_map::SeatLayout;
use crate::models::{Booking, BookingRequest, SeatKey, SeatMapSnapshot};
use crate::store::{Reservation, SeatStore, SeedOutcome, StoreError, Subscription, TransactionError};

/// Outcome of one checkout attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingResult {
    /// All seats were booked and the booking record committed with them.
    Success(Booking),
    /// Someone else booked `seat_id` first. Nothing was written.
    Conflict { seat_id: String },
    /// The request never reached the store.
    Rejected(PreconditionError),
    /// The store failed; nothing was written.
    Failure { cause: String },
}

impl BookingResult {
    pub fn is_success(&self) -> bool {
        matches!(self, BookingResult::Success(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("sign in to book seats")]
    NotSignedIn,
    #[error("no seats selected")]
    EmptySelection,
    #[error("a booking is already in progress")]
    BookingInFlight,
}

pub struct BookingCoordinator<S> {
    store: Arc<S>,
    layout: SeatLayout,
}

impl<S> Clone for BookingCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            layout: self.layout,
        }
    }
}

impl<S: SeatStore> BookingCoordinator<S> {
    pub fn new(store: Arc<S>, layout: SeatLayout) -> Self {
        Self { store, layout }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn layout(&self) -> SeatLayout {
        self.layout
    }

    /// Seeds the showtime's seat grid unless some seat already exists.
    ///
    /// Two callers racing past the existence check both attempt the batch;
    /// the store keeps exactly one seed.
    pub async fn ensure_seats_exist(&self, key: &SeatKey) -> Result<SeedOutcome, StoreError> {
        if self.store.has_seats(key).await? {
            return Ok(SeedOutcome::AlreadySeeded);
        }

        info!("Seeding {}x{} seats for {}", self.layout.rows(), self.layout.cols(), key);
        let outcome = self.store.seed_seats(key, &self.layout.seat_ids()).await?;
        if outcome == SeedOutcome::AlreadySeeded {
            info!("Seat map {} was seeded concurrently", key);
        }
        Ok(outcome)
    }

    pub async fn seat_map(&self, key: &SeatKey) -> Result<SeatMapSnapshot, StoreError> {
        self.store.snapshot(key).await
    }

    pub async fn subscribe_seats(&self, key: &SeatKey) -> Result<Subscription<SeatMapSnapshot>, StoreError> {
        self.store.watch_seats(key).await
    }

    /// Books every requested seat for the user in one transaction, or none.
    ///
    /// Duplicate seat ids collapse onto their first occurrence; a conflict
    /// names the first booked seat in request order.
    pub async fn book_seats(&self, request: BookingRequest) -> BookingResult {
        let Some(user_id) = request.user_id.as_deref().filter(|u| !u.is_empty()) else {
            return BookingResult::Rejected(PreconditionError::NotSignedIn);
        };
        let seat_ids = dedup_in_order(request.seat_ids);
        if seat_ids.is_empty() {
            return BookingResult::Rejected(PreconditionError::EmptySelection);
        }

        info!(
            "Booking {:?} for user {} on {}",
            seat_ids, user_id, request.key
        );
        let reservation = Reservation {
            key: &request.key,
            user_id,
            seat_ids: &seat_ids,
            movie_title: &request.movie_title,
        };

        match self.store.reserve_seats(reservation).await {
            Ok(booking) => {
                info!(
                    "Booking {} committed: {} seats on {}",
                    booking.booking_id,
                    booking.seat_ids.len(),
                    request.key
                );
                BookingResult::Success(booking)
            }
            Err(TransactionError::Conflict { seat_id }) => {
                warn!("Seat {} on {} already booked", seat_id, request.key);
                BookingResult::Conflict { seat_id }
            }
            Err(e @ TransactionError::UnknownSeat { .. }) => {
                warn!("Booking on {} rejected by store: {}", request.key, e);
                BookingResult::Failure { cause: e.to_string() }
            }
            Err(TransactionError::Store(e)) => {
                error!("Booking transaction on {} failed: {:?}", request.key, e);
                BookingResult::Failure { cause: e.to_string() }
            }
        }
    }

    pub async fn list_bookings(&self, user_id: &str) -> Result<Vec<Booking>, StoreError> {
        self.store.list_bookings(user_id).await
    }

    /// The user's bookings, newest first, re-sent whenever one is added.
    pub async fn subscribe_bookings(&self, user_id: &str) -> Result<Subscription<Vec<Booking>>, StoreError> {
        self.store.watch_bookings(user_id).await
    }
}

fn dedup_in_order(seat_ids: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    seat_ids
        .into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect()
}
