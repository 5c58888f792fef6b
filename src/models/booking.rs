use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SeatKey;

/// Stable id of a signed-in principal, as issued by the authentication provider.
pub type UserId = String;

/// Seats bought together by one user in one transaction. Never mutated after commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Booking {
    pub booking_id: Uuid,
    pub user_id: UserId,
    pub movie_id: i64,
    pub showtime_id: String,
    pub movie_title: String,
    pub seat_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn key(&self) -> SeatKey {
        SeatKey::new(self.movie_id, self.showtime_id.clone())
    }
}

/// A checkout attempt as submitted by the caller.
///
/// `user_id` is optional on purpose: a missing principal is reported as a
/// rejected precondition rather than failing earlier at the type level.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub key: SeatKey,
    pub user_id: Option<UserId>,
    pub seat_ids: Vec<String>,
    pub movie_title: String,
}
