//! Client-side projection of one showtime: the live seat map plus the user's
//! local selection.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::booking::{BookingCoordinator, BookingResult, PreconditionError};
use crate::models::{BookingRequest, Seat, SeatKey, SeatMapSnapshot};
use crate::store::{SeatStore, StoreError, Subscription};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectionState {
    pub seats: Vec<Seat>,
    /// Set semantics, kept in the order seats were picked.
    pub selected_seat_ids: Vec<String>,
    pub is_loading: bool,
    pub is_booking: bool,
    pub error: Option<String>,
    /// Seats of the last successful booking.
    pub booked_seats: Vec<String>,
    /// Version of the last applied snapshot.
    pub version: u64,
}

impl Default for SelectionState {
    fn default() -> Self {
        Self {
            seats: Vec::new(),
            selected_seat_ids: Vec::new(),
            is_loading: true,
            is_booking: false,
            error: None,
            booked_seats: Vec::new(),
            version: 0,
        }
    }
}

impl SelectionState {
    /// Replaces the seat list unless `snapshot` is older than what we have.
    pub fn apply_snapshot(&mut self, snapshot: SeatMapSnapshot) -> bool {
        if !self.is_loading && snapshot.version < self.version {
            return false;
        }
        self.seats = snapshot.seats;
        self.version = snapshot.version;
        self.is_loading = false;
        true
    }

    /// Flips `seat_id` in the selection. Unknown and booked seats are ignored.
    pub fn toggle_seat(&mut self, seat_id: &str) -> bool {
        match self.seats.iter().find(|s| s.seat_id == seat_id) {
            Some(seat) if !seat.booked => {}
            _ => return false,
        }
        if let Some(pos) = self.selected_seat_ids.iter().position(|id| id == seat_id) {
            self.selected_seat_ids.remove(pos);
        } else {
            self.selected_seat_ids.push(seat_id.to_string());
        }
        true
    }

    pub fn is_selected(&self, seat_id: &str) -> bool {
        self.selected_seat_ids.iter().any(|id| id == seat_id)
    }

    fn begin_booking(&mut self) -> Result<Vec<String>, PreconditionError> {
        if self.selected_seat_ids.is_empty() {
            return Err(PreconditionError::EmptySelection);
        }
        if self.is_booking {
            return Err(PreconditionError::BookingInFlight);
        }
        self.is_booking = true;
        self.error = None;
        Ok(self.selected_seat_ids.clone())
    }

    fn finish_booking(&mut self, result: &BookingResult) {
        self.is_booking = false;
        match result {
            BookingResult::Success(booking) => {
                self.booked_seats = booking.seat_ids.clone();
                self.selected_seat_ids.clear();
            }
            BookingResult::Conflict { seat_id } => {
                self.error = Some(format!("seat {} is already booked", seat_id));
            }
            BookingResult::Failure { cause } => self.error = Some(cause.clone()),
            BookingResult::Rejected(reason) => self.error = Some(reason.to_string()),
        }
    }
}

/// One user's view of one showtime.
///
/// Opening a session seeds the seat map if needed and subscribes to it; every
/// snapshot is folded into the [`SelectionState`] observable through
/// [`BookingSession::watch`]. A failed subscription leaves `error` set and is
/// not retried; call [`BookingSession::resubscribe`] to try again.
pub struct BookingSession<S: SeatStore> {
    coordinator: BookingCoordinator<S>,
    key: SeatKey,
    state: Arc<watch::Sender<SelectionState>>,
    projection: JoinHandle<()>,
}

impl<S: SeatStore> BookingSession<S> {
    pub async fn open(coordinator: BookingCoordinator<S>, key: SeatKey) -> Result<Self, StoreError> {
        coordinator.ensure_seats_exist(&key).await?;
        let subscription = coordinator.subscribe_seats(&key).await?;

        let (state, _) = watch::channel(SelectionState::default());
        let state = Arc::new(state);
        let projection = tokio::spawn(project(subscription, Arc::clone(&state)));

        Ok(Self {
            coordinator,
            key,
            state,
            projection,
        })
    }

    pub fn key(&self) -> &SeatKey {
        &self.key
    }

    pub fn current(&self) -> SelectionState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SelectionState> {
        self.state.subscribe()
    }

    pub fn toggle_seat(&self, seat_id: &str) -> bool {
        self.state.send_if_modified(|s| s.toggle_seat(seat_id))
    }

    /// Drops the current live subscription (if still running) and starts a
    /// new one from the store's current state.
    pub async fn resubscribe(&mut self) -> Result<(), StoreError> {
        self.projection.abort();
        let subscription = self.coordinator.subscribe_seats(&self.key).await?;
        self.state.send_modify(|s| {
            s.error = None;
            s.is_loading = true;
        });
        self.projection = tokio::spawn(project(subscription, Arc::clone(&self.state)));
        Ok(())
    }

    /// Submits the current selection for `user_id`.
    ///
    /// Once the transaction starts it runs to completion on its own task, even
    /// if the caller stops waiting; the session state is updated either way.
    pub async fn book(&self, user_id: Option<&str>, movie_title: &str) -> BookingResult {
        let Some(user_id) = user_id.filter(|u| !u.is_empty()) else {
            return BookingResult::Rejected(PreconditionError::NotSignedIn);
        };

        let mut started = Err(PreconditionError::EmptySelection);
        self.state.send_if_modified(|s| {
            started = s.begin_booking();
            started.is_ok()
        });
        let seat_ids = match started {
            Ok(seat_ids) => seat_ids,
            Err(reason) => return BookingResult::Rejected(reason),
        };

        let request = BookingRequest {
            key: self.key.clone(),
            user_id: Some(user_id.to_string()),
            seat_ids,
            movie_title: movie_title.to_string(),
        };
        let coordinator = self.coordinator.clone();
        let state = Arc::clone(&self.state);
        let task = tokio::spawn(async move {
            let result = coordinator.book_seats(request).await;
            state.send_modify(|s| s.finish_booking(&result));
            result
        });

        match task.await {
            Ok(result) => result,
            Err(e) => {
                let result = BookingResult::Failure {
                    cause: format!("booking task failed: {}", e),
                };
                self.state.send_modify(|s| s.finish_booking(&result));
                result
            }
        }
    }

    pub fn close(self) {
        drop(self);
    }
}

impl<S: SeatStore> Drop for BookingSession<S> {
    fn drop(&mut self) {
        self.projection.abort();
    }
}

async fn project(mut subscription: Subscription<SeatMapSnapshot>, state: Arc<watch::Sender<SelectionState>>) {
    while let Some(update) = subscription.next_update().await {
        match update {
            Ok(snapshot) => {
                debug!("Seat snapshot v{} for {}", snapshot.version, snapshot.key);
                state.send_if_modified(|s| s.apply_snapshot(snapshot));
            }
            Err(e) => {
                warn!("Seat subscription ended: {}", e);
                state.send_modify(|s| {
                    s.is_loading = false;
                    s.error = Some(e.to_string());
                });
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(seats: &[(&str, bool)]) -> SelectionState {
        let mut state = SelectionState::default();
        state.apply_snapshot(SeatMapSnapshot {
            key: SeatKey::new(1, "s"),
            version: 1,
            seats: seats
                .iter()
                .map(|(id, booked)| Seat {
                    seat_id: id.to_string(),
                    booked: *booked,
                    held_by: booked.then(|| "someone".to_string()),
                })
                .collect(),
        });
        state
    }

    #[test]
    fn toggle_flips_membership() {
        let mut state = state_with(&[("A1", false), ("A2", false)]);

        assert!(state.toggle_seat("A2"));
        assert!(state.toggle_seat("A1"));
        assert_eq!(state.selected_seat_ids, vec!["A2", "A1"]);

        assert!(state.toggle_seat("A2"));
        assert_eq!(state.selected_seat_ids, vec!["A1"]);
    }

    #[test]
    fn toggle_ignores_booked_and_unknown_seats() {
        let mut state = state_with(&[("A1", true)]);

        assert!(!state.toggle_seat("A1"));
        assert!(!state.toggle_seat("Q9"));
        assert!(state.selected_seat_ids.is_empty());
    }

    #[test]
    fn stale_snapshot_is_ignored() {
        let mut state = state_with(&[("A1", false)]);
        state.apply_snapshot(SeatMapSnapshot {
            key: SeatKey::new(1, "s"),
            version: 3,
            seats: vec![Seat::free("A1"), Seat::free("A2")],
        });

        let applied = state.apply_snapshot(SeatMapSnapshot {
            key: SeatKey::new(1, "s"),
            version: 2,
            seats: vec![],
        });

        assert!(!applied);
        assert_eq!(state.seats.len(), 2);
        assert_eq!(state.version, 3);
    }

    #[test]
    fn second_booking_is_rejected_while_in_flight() {
        let mut state = state_with(&[("A1", false)]);
        state.toggle_seat("A1");

        assert_eq!(state.begin_booking(), Ok(vec!["A1".to_string()]));
        assert_eq!(state.begin_booking(), Err(PreconditionError::BookingInFlight));
    }

    #[test]
    fn conflict_keeps_selection_for_correction() {
        let mut state = state_with(&[("A1", false), ("A2", false)]);
        state.toggle_seat("A1");
        state.toggle_seat("A2");
        state.begin_booking().unwrap();

        state.finish_booking(&BookingResult::Conflict {
            seat_id: "A1".to_string(),
        });

        assert!(!state.is_booking);
        assert_eq!(state.selected_seat_ids, vec!["A1", "A2"]);
        assert_eq!(state.error.as_deref(), Some("seat A1 is already booked"));
    }
}
