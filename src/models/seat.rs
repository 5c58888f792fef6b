use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Identifies one seat map: a showtime scoped under a movie.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeatKey {
    pub movie_id: i64,
    pub showtime_id: String,
}

impl SeatKey {
    pub fn new(movie_id: i64, showtime_id: impl Into<String>) -> Self {
        Self {
            movie_id,
            showtime_id: showtime_id.into(),
        }
    }
}

impl fmt::Display for SeatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.movie_id, self.showtime_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub seat_id: String,
    pub booked: bool,
    pub held_by: Option<String>,
}

impl Seat {
    pub fn free(seat_id: impl Into<String>) -> Self {
        Self {
            seat_id: seat_id.into(),
            booked: false,
            held_by: None,
        }
    }

    /// Builds a seat from its stored form, where an unheld seat carries an empty holder.
    pub fn from_stored(seat_id: String, booked: bool, held_by: String) -> Self {
        Self {
            seat_id,
            booked,
            held_by: (!held_by.is_empty()).then_some(held_by),
        }
    }
}

/// Full point-in-time view of one seat map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatMapSnapshot {
    pub key: SeatKey,
    /// Monotonic per key; a subscriber never sees it go backwards.
    pub version: u64,
    pub seats: Vec<Seat>,
}

impl SeatMapSnapshot {
    pub fn empty(key: SeatKey) -> Self {
        Self {
            key,
            version: 0,
            seats: Vec::new(),
        }
    }

    pub fn seat(&self, seat_id: &str) -> Option<&Seat> {
        self.seats.iter().find(|s| s.seat_id == seat_id)
    }

    pub fn booked_count(&self) -> usize {
        self.seats.iter().filter(|s| s.booked).count()
    }
}

/// Orders seat labels by row letter, then numerically by column ("A2" < "A10").
pub fn compare_seat_ids(a: &str, b: &str) -> Ordering {
    split_label(a).cmp(&split_label(b))
}

fn split_label(label: &str) -> (&str, u32, &str) {
    let digits_at = label
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(label.len());
    let (row, col) = label.split_at(digits_at);
    // Unparseable columns sort after every numeric one, then by raw text.
    (row, col.parse().unwrap_or(u32::MAX), col)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seat_labels_sort_by_row_then_numeric_column() {
        let mut ids = vec!["B1", "A10", "A2", "A1", "J10"];
        ids.sort_by(|a, b| compare_seat_ids(a, b));
        assert_eq!(ids, vec!["A1", "A2", "A10", "B1", "J10"]);
    }

    #[test]
    fn empty_holder_is_unheld() {
        let seat = Seat::from_stored("C3".into(), false, String::new());
        assert_eq!(seat.held_by, None);
        let seat = Seat::from_stored("C3".into(), true, "u1".into());
        assert_eq!(seat.held_by.as_deref(), Some("u1"));
    }
}
